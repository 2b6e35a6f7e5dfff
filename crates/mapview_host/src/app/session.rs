use std::sync::Arc;

use mapview::{
    area_for_room, LoadMode, RoomRegistry, SceneCaptureOrchestrator, SceneHost, TickStatus,
    TraversalReport,
};
use tracing::{info, warn};

use super::commands::{CommandRegistry, HostCommand};
use super::sim_world::SimWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    Continue,
    Quit,
}

/// The simulated world, the capture orchestrator and the operator surface.
pub(crate) struct HostSession {
    world: SimWorld,
    orchestrator: SceneCaptureOrchestrator,
    registry: Arc<RoomRegistry>,
    commands: CommandRegistry,
    ticks: u64,
}

impl HostSession {
    pub(crate) fn new(
        world: SimWorld,
        orchestrator: SceneCaptureOrchestrator,
        registry: Arc<RoomRegistry>,
    ) -> Self {
        Self {
            world,
            orchestrator,
            registry,
            commands: CommandRegistry::with_host_builtins(),
            ticks: 0,
        }
    }

    pub(crate) fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.registry)
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    pub(crate) fn handle_line(&mut self, raw_line: &str) -> (Vec<String>, LineOutcome) {
        match self.commands.parse_line(raw_line) {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => (Vec::new(), LineOutcome::Continue),
            Err(message) => (vec![format!("error: {message}")], LineOutcome::Continue),
        }
    }

    fn execute(&mut self, command: HostCommand) -> (Vec<String>, LineOutcome) {
        let lines = match command {
            HostCommand::GrandTour { area } => self.start_grand_tour(area.as_deref()),
            HostCommand::Snap => match self.orchestrator.begin_snapshot(&self.world) {
                Ok(()) => vec![format!(
                    "snapshot started: {}",
                    self.orchestrator.current_scene().unwrap_or("?")
                )],
                Err(error) => vec![format!("error: {error}")],
            },
            HostCommand::Goto { scene } => self.goto(&scene),
            HostCommand::Cancel => {
                if self.orchestrator.is_busy() {
                    self.orchestrator.cancel_token().cancel();
                    vec!["cancel requested; stopping at the next scene boundary".to_string()]
                } else {
                    vec!["nothing to cancel".to_string()]
                }
            }
            HostCommand::Status => self.status_lines(),
            HostCommand::Rooms { area } => self.room_lines(area.as_deref()),
            HostCommand::Help => self.commands.help_lines(),
            HostCommand::Quit => return (self.shutdown(), LineOutcome::Quit),
        };
        (lines, LineOutcome::Continue)
    }

    fn start_grand_tour(&mut self, area: Option<&str>) -> Vec<String> {
        let roster = self
            .world
            .scene_ids()
            .iter()
            .filter(|id| area.is_none_or(|area| area_for_room(id) == area))
            .cloned()
            .collect::<Vec<_>>();
        if roster.is_empty() {
            return vec![format!("error: no scenes in area '{}'", area.unwrap_or(""))];
        }
        match self.orchestrator.begin_traversal(&roster) {
            Ok(()) => vec![format!(
                "grand tour started: {} of {} scenes pending",
                self.orchestrator.pending_scenes(),
                roster.len()
            )],
            Err(error) => vec![format!("error: {error}")],
        }
    }

    fn goto(&mut self, scene: &str) -> Vec<String> {
        if self.orchestrator.is_busy() {
            return vec!["error: a capture is running; cancel it first".to_string()];
        }
        if !self.world.has_scene(scene) {
            return vec![format!("error: unknown scene '{scene}'")];
        }
        self.world.request_load(scene, LoadMode::Single);
        vec![format!("loading {scene}")]
    }

    fn status_lines(&self) -> Vec<String> {
        vec![
            format!("tick: {}", self.ticks),
            format!(
                "active scene: {}",
                self.world.active_scene().as_deref().unwrap_or("-")
            ),
            format!("phase: {:?}", self.orchestrator.phase()),
            format!(
                "capturing: {}",
                self.orchestrator.current_scene().unwrap_or("-")
            ),
            format!("pending scenes: {}", self.orchestrator.pending_scenes()),
            format!("player collision: {}", self.world.player_collision()),
            format!("registry rooms: {}", self.registry.len()),
            format!(
                "output: {}",
                self.orchestrator.exporter().output_root().display()
            ),
        ]
    }

    fn room_lines(&self, area: Option<&str>) -> Vec<String> {
        let rooms = match area {
            Some(area) => self.registry.rooms_in_area(area).collect::<Vec<_>>(),
            None => self
                .registry
                .ids()
                .iter()
                .filter_map(|id| self.registry.get(id))
                .collect(),
        };
        if rooms.is_empty() {
            return vec!["no rooms".to_string()];
        }
        rooms
            .into_iter()
            .map(|room| {
                format!(
                    "{} area={} transitions={} locations={}",
                    room.id,
                    room.area(),
                    room.transitions.len(),
                    room.locations.len()
                )
            })
            .collect()
    }

    /// One host tick: the world advances first, then the orchestrator.
    pub(crate) fn tick(&mut self) -> Vec<String> {
        self.ticks += 1;
        self.world.advance();
        match self.orchestrator.tick(&mut self.world) {
            TickStatus::Idle | TickStatus::Working => Vec::new(),
            TickStatus::Finished(report) => {
                self.reload_registry(&report);
                describe_report("finished", &report)
            }
            TickStatus::Aborted(report) => describe_report("aborted", &report),
        }
    }

    fn reload_registry(&mut self, report: &TraversalReport) {
        let Some(summary) = &report.consolidated else {
            return;
        };
        let registry = RoomRegistry::load_file_or_empty(&summary.dataset_path);
        if registry.len() != summary.room_count {
            warn!(
                expected = summary.room_count,
                loaded = registry.len(),
                "room_registry_reload_mismatch"
            );
        }
        self.registry = Arc::new(registry);
        info!(rooms = self.registry.len(), "room_registry_reloaded");
    }

    pub(crate) fn shutdown(&mut self) -> Vec<String> {
        match self.orchestrator.shutdown(&mut self.world) {
            Some(report) => describe_report("interrupted", &report),
            None => Vec::new(),
        }
    }
}

fn describe_report(outcome: &str, report: &TraversalReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{:?} {outcome}: captured={} already_exported={} skipped={}{}",
        report.mode,
        report.captured.len(),
        report.already_exported.len(),
        report.skipped_degenerate.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    )];
    if !report.skipped_degenerate.is_empty() {
        lines.push(format!(
            "  skipped: {}",
            report.skipped_degenerate.join(", ")
        ));
    }
    if let Some(summary) = &report.consolidated {
        lines.push(format!(
            "  dataset: {} rooms -> {} (sha256 {})",
            summary.room_count,
            summary.dataset_path.display(),
            summary.dataset_sha256_hex
        ));
    }
    if let Some(error) = &report.error {
        lines.push(format!("  error: {error}"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use mapview::{
        CaptureConfig, PlacementIndex, RoomGraphBuilder, SceneChangeBus, TileExporter,
        TransitionIndex,
    };
    use std::path::Path;
    use tempfile::TempDir;

    use super::*;

    const DEMO_WORLD: &str = include_str!("../../assets/demo/world.json");
    const DEMO_ITEMS: &str = include_str!("../../assets/demo/items.xml");
    const DEMO_TRANSITIONS: &str = include_str!("../../assets/demo/transitions.xml");
    const TICK_LIMIT: u32 = 2_000;

    fn demo_session(output: &Path) -> HostSession {
        let bus = SceneChangeBus::new();
        let world = SimWorld::from_json(DEMO_WORLD, bus.clone()).expect("demo world");
        let placements =
            PlacementIndex::parse_xml(Path::new("items.xml"), DEMO_ITEMS).expect("items");
        let transitions = TransitionIndex::parse_xml(Path::new("transitions.xml"), DEMO_TRANSITIONS)
            .expect("transitions");
        let config = CaptureConfig {
            settle_ticks: 1,
            pacing_ticks: 1,
            ..CaptureConfig::default()
        };
        let mut orchestrator = SceneCaptureOrchestrator::new(
            config,
            RoomGraphBuilder::new(placements, transitions),
            TileExporter::new(output),
        );
        orchestrator.attach(&bus);
        HostSession::new(world, orchestrator, Arc::new(RoomRegistry::bundled()))
    }

    fn run_until_idle(session: &mut HostSession) -> Vec<String> {
        let mut output = Vec::new();
        for _ in 0..TICK_LIMIT {
            output.extend(session.tick());
            if !session.is_busy() {
                return output;
            }
        }
        panic!("session still busy after {TICK_LIMIT} ticks: {output:?}");
    }

    #[test]
    fn grand_tour_captures_demo_world_and_reloads_registry() {
        let temp = TempDir::new().expect("temp");
        let mut session = demo_session(temp.path());

        let (lines, outcome) = session.handle_line("grand_tour");
        assert_eq!(outcome, LineOutcome::Continue);
        assert_eq!(
            lines,
            vec!["grand tour started: 5 of 6 scenes pending".to_string()]
        );
        assert!(session.tick().is_empty());
        assert!(!session.world.player_collision());

        let output = run_until_idle(&mut session);
        assert_eq!(
            output[0],
            "GrandTour finished: captured=4 already_exported=0 skipped=1"
        );
        assert_eq!(output[1], "  skipped: Cinematic_Stag_travel");
        assert!(session.world.player_collision());

        let exporter = TileExporter::new(temp.path());
        for id in ["Town", "Crossroads_01", "Crossroads_02", "Ridge1"] {
            assert!(exporter.is_exported(id), "{id} should be exported");
        }
        assert!(!exporter.is_exported("Ridge1_boss"));
        assert!(!exporter.is_exported("Cinematic_Stag_travel"));

        let registry = session.registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.ids(),
            ["Crossroads_01", "Crossroads_02", "Ridge1", "Town"]
        );
        let crossroads = registry.get("Crossroads_01").expect("crossroads room");
        assert_eq!(crossroads.transitions.len(), 2);
        assert_eq!(crossroads.locations.len(), 1);
    }

    #[test]
    fn second_grand_tour_recaptures_nothing() {
        let temp = TempDir::new().expect("temp");
        let mut session = demo_session(temp.path());
        session.handle_line("grand_tour");
        run_until_idle(&mut session);
        let first = std::fs::read(temp.path().join("Town.json")).expect("town metadata");

        let (lines, _) = session.handle_line("grand_tour");
        assert_eq!(
            lines,
            vec!["grand tour started: 1 of 6 scenes pending".to_string()]
        );
        let output = run_until_idle(&mut session);
        assert_eq!(
            output[0],
            "GrandTour finished: captured=0 already_exported=4 skipped=1"
        );
        let second = std::fs::read(temp.path().join("Town.json")).expect("town metadata");
        assert_eq!(first, second);
    }

    #[test]
    fn area_tour_only_visits_matching_scenes() {
        let temp = TempDir::new().expect("temp");
        let mut session = demo_session(temp.path());

        let (lines, _) = session.handle_line("grand_tour Crossroads");
        assert_eq!(
            lines,
            vec!["grand tour started: 2 of 2 scenes pending".to_string()]
        );
        run_until_idle(&mut session);
        let rooms = session.handle_line("rooms").0;
        assert_eq!(
            rooms,
            vec![
                "Crossroads_01 area=Crossroads transitions=2 locations=1".to_string(),
                "Crossroads_02 area=Crossroads transitions=2 locations=1".to_string(),
            ]
        );

        let (lines, _) = session.handle_line("grand_tour Greenpath");
        assert_eq!(lines, vec!["error: no scenes in area 'Greenpath'".to_string()]);
    }

    #[test]
    fn goto_snapshots_the_new_scene() {
        let temp = TempDir::new().expect("temp");
        let mut session = demo_session(temp.path());

        let (lines, _) = session.handle_line("goto Crossroads_02");
        assert_eq!(lines, vec!["loading Crossroads_02".to_string()]);

        let mut output = Vec::new();
        for _ in 0..TICK_LIMIT {
            output.extend(session.tick());
            if !output.is_empty() {
                break;
            }
        }
        assert_eq!(
            output[0],
            "Snapshot finished: captured=1 already_exported=0 skipped=0"
        );
        let exporter = TileExporter::new(temp.path());
        assert!(exporter.is_exported("Crossroads_02"));
        assert!(!exporter.is_exported("Town"));
        assert_eq!(session.registry().len(), 4);
    }

    #[test]
    fn busy_session_rejects_goto_and_quit_interrupts() {
        let temp = TempDir::new().expect("temp");
        let mut session = demo_session(temp.path());
        session.handle_line("grand_tour");
        session.tick();

        let (lines, _) = session.handle_line("goto Ridge1");
        assert_eq!(
            lines,
            vec!["error: a capture is running; cancel it first".to_string()]
        );
        let (lines, _) = session.handle_line("snap");
        assert_eq!(
            lines,
            vec!["error: a GrandTour capture is already running".to_string()]
        );

        let (lines, outcome) = session.handle_line("quit");
        assert_eq!(outcome, LineOutcome::Quit);
        assert!(lines[0].starts_with("GrandTour interrupted:"));
        assert!(!session.is_busy());
        assert!(session.world.player_collision());
    }

    #[test]
    fn cancel_stops_tour_without_consolidating() {
        let temp = TempDir::new().expect("temp");
        let mut session = demo_session(temp.path());
        session.handle_line("grand_tour");
        session.tick();

        let (lines, _) = session.handle_line("cancel");
        assert_eq!(
            lines,
            vec!["cancel requested; stopping at the next scene boundary".to_string()]
        );
        let output = run_until_idle(&mut session);
        assert!(output[0].ends_with("(cancelled)"), "{output:?}");
        assert_eq!(session.handle_line("cancel").0, vec!["nothing to cancel".to_string()]);
    }

    #[test]
    fn unknown_commands_and_scenes_are_reported() {
        let temp = TempDir::new().expect("temp");
        let mut session = demo_session(temp.path());

        let (lines, outcome) = session.handle_line("fly Town");
        assert_eq!(outcome, LineOutcome::Continue);
        assert_eq!(lines, vec!["error: unknown command 'fly'. try: help".to_string()]);
        assert_eq!(
            session.handle_line("goto Abyss_01").0,
            vec!["error: unknown scene 'Abyss_01'".to_string()]
        );
        let status = session.handle_line("status").0;
        assert_eq!(status[1], "active scene: Town");
        assert_eq!(status[2], "phase: Idle");
    }
}
