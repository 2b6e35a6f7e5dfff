use std::collections::{HashSet, VecDeque};
use std::mem;

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::builder::{BuildError, RoomGraphBuilder};
use super::cleanup::{run_cleanup, CleanupTable};
use super::config::CaptureConfig;
use super::events::{CancelToken, SceneChangeBus, SceneChangeSubscription};
use super::host::{LoadMode, SceneHost};
use super::renderer::{CaptureError, RenderError, ViewRenderer, Viewport};
use crate::export::{DatasetSummary, ExportError, TileExporter};
use crate::world::{companion_base, companion_scene_id, validate_scene_id, Room, SceneIdError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    GrandTour,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    SceneBoundary,
    Loading,
    WaitingStable,
    Cleaning,
    Settling,
    Capturing,
    Exporting,
    Pacing,
}

/// One scene to load and capture, with the companion loaded alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneVisit {
    pub scene_id: String,
    pub companion: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalPlan {
    pub pending: Vec<SceneVisit>,
    pub already_exported: Vec<String>,
}

/// Splits a roster into scenes still to capture and scenes with complete
/// artifacts on disk. Companions of rostered bases are folded into their base.
pub fn plan_traversal(roster: &[String], exporter: &TileExporter) -> TraversalPlan {
    let known = roster.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    let mut plan = TraversalPlan::default();

    for scene_id in roster {
        if !seen.insert(scene_id.as_str()) {
            continue;
        }
        if companion_base(scene_id).is_some_and(|base| known.contains(base)) {
            continue;
        }
        if exporter.is_exported(scene_id) {
            plan.already_exported.push(scene_id.clone());
            continue;
        }
        let companion = companion_scene_id(scene_id);
        plan.pending.push(SceneVisit {
            scene_id: scene_id.clone(),
            companion: known.contains(companion.as_str()).then_some(companion),
        });
    }
    plan
}

#[derive(Debug, Error)]
pub enum BeginError {
    #[error("a {running:?} capture is already running")]
    Busy { running: TraversalMode },
    #[error("no scene is active to snapshot")]
    NoActiveScene,
    #[error("scene id '{id}' is invalid: {source}")]
    InvalidSceneId {
        id: String,
        #[source]
        source: SceneIdError,
    },
}

#[derive(Debug, Error)]
pub enum CaptureStepError {
    #[error("scene '{scene_id}' was still loading after {waited_ticks} ticks")]
    StallTimeout { scene_id: String, waited_ticks: u32 },
    #[error("failed to render scene '{scene_id}': {source}")]
    Render {
        scene_id: String,
        #[source]
        source: RenderError,
    },
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug)]
pub struct TraversalReport {
    pub mode: TraversalMode,
    pub captured: Vec<String>,
    pub already_exported: Vec<String>,
    /// Scenes whose bounds could not produce a usable image.
    pub skipped_degenerate: Vec<String>,
    pub cancelled: bool,
    pub consolidated: Option<DatasetSummary>,
    pub error: Option<CaptureStepError>,
}

impl TraversalReport {
    fn new(mode: TraversalMode) -> Self {
        Self {
            mode,
            captured: Vec::new(),
            already_exported: Vec::new(),
            skipped_degenerate: Vec::new(),
            cancelled: false,
            consolidated: None,
            error: None,
        }
    }
}

#[derive(Debug)]
pub enum TickStatus {
    Idle,
    Working,
    Finished(TraversalReport),
    Aborted(TraversalReport),
}

enum Phase {
    SceneBoundary,
    Loading,
    WaitingStable { waited: u32 },
    Cleaning,
    Settling { remaining: u32 },
    Capturing,
    Exporting { room: Room, image: RgbaImage },
    Pacing { remaining: u32 },
}

impl Phase {
    fn kind(&self) -> CapturePhase {
        match self {
            Self::SceneBoundary => CapturePhase::SceneBoundary,
            Self::Loading => CapturePhase::Loading,
            Self::WaitingStable { .. } => CapturePhase::WaitingStable,
            Self::Cleaning => CapturePhase::Cleaning,
            Self::Settling { .. } => CapturePhase::Settling,
            Self::Capturing => CapturePhase::Capturing,
            Self::Exporting { .. } => CapturePhase::Exporting,
            Self::Pacing { .. } => CapturePhase::Pacing,
        }
    }
}

enum Step {
    Continue(Phase),
    Done,
}

struct ActiveRun {
    mode: TraversalMode,
    queue: VecDeque<SceneVisit>,
    /// Valid in every phase after a scene boundary.
    current: SceneVisit,
    phase: Phase,
    report: TraversalReport,
    collision_disabled: bool,
}

impl ActiveRun {
    fn release<H: SceneHost + ?Sized>(&mut self, host: &mut H) {
        if self.collision_disabled {
            host.set_player_collision(true);
            self.collision_disabled = false;
        }
    }
}

/// Drives scene loading, overlay cleanup, capture and export one step per tick.
pub struct SceneCaptureOrchestrator {
    config: CaptureConfig,
    renderer: ViewRenderer,
    cleanup: CleanupTable,
    builder: RoomGraphBuilder,
    exporter: TileExporter,
    cancel: CancelToken,
    scene_changes: Option<SceneChangeSubscription>,
    run: Option<ActiveRun>,
}

impl SceneCaptureOrchestrator {
    pub fn new(config: CaptureConfig, builder: RoomGraphBuilder, exporter: TileExporter) -> Self {
        Self {
            renderer: ViewRenderer::new(config.tile_scale),
            config,
            cleanup: CleanupTable::standard(),
            builder,
            exporter,
            cancel: CancelToken::new(),
            scene_changes: None,
            run: None,
        }
    }

    pub fn with_cleanup_table(mut self, table: CleanupTable) -> Self {
        self.cleanup = table;
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn exporter(&self) -> &TileExporter {
        &self.exporter
    }

    /// Shared handle; cancelling takes effect at the next scene boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn attach(&mut self, bus: &SceneChangeBus) {
        self.scene_changes = Some(bus.subscribe());
    }

    pub fn is_busy(&self) -> bool {
        self.run.is_some()
    }

    pub fn phase(&self) -> CapturePhase {
        self.run
            .as_ref()
            .map_or(CapturePhase::Idle, |run| run.phase.kind())
    }

    pub fn current_scene(&self) -> Option<&str> {
        let run = self.run.as_ref()?;
        if matches!(run.phase, Phase::SceneBoundary) || run.current.scene_id.is_empty() {
            return None;
        }
        Some(&run.current.scene_id)
    }

    pub fn pending_scenes(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.queue.len())
    }

    pub fn begin_traversal(&mut self, roster: &[String]) -> Result<(), BeginError> {
        self.ensure_idle()?;
        for id in roster {
            validate_scene_id(id).map_err(|source| BeginError::InvalidSceneId {
                id: id.clone(),
                source,
            })?;
        }

        self.cancel.reset();
        let plan = plan_traversal(roster, &self.exporter);
        info!(
            roster = roster.len(),
            pending = plan.pending.len(),
            already_exported = plan.already_exported.len(),
            "traversal_planned"
        );

        let mut report = TraversalReport::new(TraversalMode::GrandTour);
        report.already_exported = plan.already_exported;
        self.run = Some(ActiveRun {
            mode: TraversalMode::GrandTour,
            queue: plan.pending.into(),
            current: SceneVisit::default(),
            phase: Phase::SceneBoundary,
            report,
            collision_disabled: false,
        });
        Ok(())
    }

    /// Captures whatever scene the host has active, without loading anything.
    pub fn begin_snapshot<H: SceneHost + ?Sized>(&mut self, host: &H) -> Result<(), BeginError> {
        self.ensure_idle()?;
        let scene_id = host.active_scene().ok_or(BeginError::NoActiveScene)?;
        self.start_snapshot(scene_id)
    }

    fn ensure_idle(&self) -> Result<(), BeginError> {
        match &self.run {
            Some(run) => Err(BeginError::Busy { running: run.mode }),
            None => Ok(()),
        }
    }

    fn start_snapshot(&mut self, scene_id: String) -> Result<(), BeginError> {
        self.ensure_idle()?;
        validate_scene_id(&scene_id).map_err(|source| BeginError::InvalidSceneId {
            id: scene_id.clone(),
            source,
        })?;
        info!(scene = %scene_id, "snapshot_started");
        self.run = Some(ActiveRun {
            mode: TraversalMode::Snapshot,
            queue: VecDeque::new(),
            current: SceneVisit {
                scene_id,
                companion: None,
            },
            phase: Phase::WaitingStable { waited: 0 },
            report: TraversalReport::new(TraversalMode::Snapshot),
            collision_disabled: false,
        });
        Ok(())
    }

    /// Advances the active run by at most one phase.
    pub fn tick<H>(&mut self, host: &mut H) -> TickStatus
    where
        H: SceneHost + Viewport + ?Sized,
    {
        self.poll_scene_changes();

        let Some(mut run) = self.run.take() else {
            return TickStatus::Idle;
        };
        if run.mode == TraversalMode::GrandTour && !run.collision_disabled {
            host.set_player_collision(false);
            run.collision_disabled = true;
            info!(pending = run.queue.len(), "traversal_started");
        }

        let phase = mem::replace(&mut run.phase, Phase::SceneBoundary);
        match self.step(host, &mut run, phase) {
            Ok(Step::Continue(next)) => {
                run.phase = next;
                self.run = Some(run);
                TickStatus::Working
            }
            Ok(Step::Done) => self.finish(host, run),
            Err(error) => TickStatus::Aborted(self.abort(host, run, error)),
        }
    }

    /// Drops the scene change subscription and stops any run without consolidating.
    pub fn shutdown<H: SceneHost + ?Sized>(&mut self, host: &mut H) -> Option<TraversalReport> {
        self.scene_changes = None;
        let mut run = self.run.take()?;
        run.release(host);
        run.report.cancelled = true;
        info!(
            mode = ?run.mode,
            captured = run.report.captured.len(),
            "traversal_interrupted"
        );
        Some(run.report)
    }

    fn poll_scene_changes(&mut self) {
        let Some(subscription) = &self.scene_changes else {
            return;
        };
        let changes = subscription.drain();
        let Some(latest) = changes.last() else {
            return;
        };
        if self.run.is_some() || !self.config.snapshot_on_scene_change {
            debug!(
                count = changes.len(),
                scene = %latest.current,
                "scene_change_ignored"
            );
            return;
        }
        if let Err(error) = self.start_snapshot(latest.current.clone()) {
            warn!(scene = %latest.current, error = %error, "scene_change_snapshot_rejected");
        }
    }

    fn step<H>(
        &self,
        host: &mut H,
        run: &mut ActiveRun,
        phase: Phase,
    ) -> Result<Step, CaptureStepError>
    where
        H: SceneHost + Viewport + ?Sized,
    {
        let scene_id = run.current.scene_id.clone();
        let next = match phase {
            Phase::SceneBoundary => {
                if self.cancel.is_cancelled() {
                    run.report.cancelled = true;
                    info!(remaining = run.queue.len(), "traversal_cancelled");
                    return Ok(Step::Done);
                }
                let Some(visit) = run.queue.pop_front() else {
                    return Ok(Step::Done);
                };
                run.current = visit;
                Phase::Loading
            }
            Phase::Loading => {
                host.request_load(&scene_id, LoadMode::Single);
                if let Some(companion) = &run.current.companion {
                    host.request_load(companion, LoadMode::Additive);
                }
                info!(
                    scene = %scene_id,
                    companion = ?run.current.companion,
                    "scene_load_requested"
                );
                Phase::WaitingStable { waited: 0 }
            }
            Phase::WaitingStable { waited } => {
                let ready = !host.is_loading()
                    && host.active_scene().as_deref() == Some(scene_id.as_str());
                if ready {
                    debug!(scene = %scene_id, waited_ticks = waited, "scene_ready");
                    Phase::Cleaning
                } else if self
                    .config
                    .max_ready_wait_ticks
                    .is_some_and(|limit| waited >= limit)
                {
                    return Err(CaptureStepError::StallTimeout {
                        scene_id,
                        waited_ticks: waited,
                    });
                } else {
                    Phase::WaitingStable { waited: waited + 1 }
                }
            }
            Phase::Cleaning => {
                let summary = run_cleanup(host, &self.cleanup);
                info!(scene = %scene_id, hidden = summary.hidden, "overlays_hidden");
                Phase::Settling {
                    remaining: self.config.settle_ticks,
                }
            }
            Phase::Settling { remaining } if remaining > 0 => Phase::Settling {
                remaining: remaining - 1,
            },
            Phase::Settling { .. } => Phase::Capturing,
            Phase::Capturing => match self.capture(host, &scene_id)? {
                Some((room, image)) => Phase::Exporting { room, image },
                None => {
                    run.report.skipped_degenerate.push(scene_id);
                    return Ok(self.after_scene(run));
                }
            },
            Phase::Exporting { room, image } => {
                self.exporter.export(&room, &image)?;
                run.report.captured.push(room.id);
                return Ok(self.after_scene(run));
            }
            Phase::Pacing { remaining } if remaining > 0 => Phase::Pacing {
                remaining: remaining - 1,
            },
            Phase::Pacing { .. } => Phase::SceneBoundary,
        };
        Ok(Step::Continue(next))
    }

    fn capture<H>(
        &self,
        host: &mut H,
        scene_id: &str,
    ) -> Result<Option<(Room, RgbaImage)>, CaptureStepError>
    where
        H: SceneHost + Viewport + ?Sized,
    {
        let bounds = host.scene_bounds();
        let image = match self.renderer.capture(host, bounds) {
            Ok(image) => image,
            Err(CaptureError::Render(source)) => {
                return Err(CaptureStepError::Render {
                    scene_id: scene_id.to_string(),
                    source,
                })
            }
            Err(error) => {
                warn!(scene = scene_id, error = %error, "scene_capture_skipped");
                return Ok(None);
            }
        };
        let room = self.builder.build(scene_id, bounds, &host.connectors())?;
        Ok(Some((room, image)))
    }

    fn after_scene(&self, run: &ActiveRun) -> Step {
        match run.mode {
            TraversalMode::Snapshot => Step::Done,
            TraversalMode::GrandTour => Step::Continue(Phase::Pacing {
                remaining: self.config.pacing_ticks,
            }),
        }
    }

    fn finish<H: SceneHost + ?Sized>(&self, host: &mut H, mut run: ActiveRun) -> TickStatus {
        run.release(host);
        if run.mode == TraversalMode::GrandTour {
            match self.exporter.export_data() {
                Ok(summary) => run.report.consolidated = Some(summary),
                Err(error) => return TickStatus::Aborted(self.abort(host, run, error.into())),
            }
        }
        info!(
            mode = ?run.mode,
            captured = run.report.captured.len(),
            already_exported = run.report.already_exported.len(),
            skipped = run.report.skipped_degenerate.len(),
            cancelled = run.report.cancelled,
            "traversal_finished"
        );
        TickStatus::Finished(run.report)
    }

    fn abort<H: SceneHost + ?Sized>(
        &self,
        host: &mut H,
        mut run: ActiveRun,
        failure: CaptureStepError,
    ) -> TraversalReport {
        run.release(host);
        error!(
            mode = ?run.mode,
            scene = %run.current.scene_id,
            captured = run.report.captured.len(),
            error = %failure,
            "traversal_aborted"
        );
        run.report.error = Some(failure);
        run.report
    }
}
