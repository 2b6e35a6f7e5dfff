use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mapview::{
    resolve_capture_paths, CaptureConfig, IndexLoadError, PlacementIndex, RoomGraphBuilder,
    RoomRegistry, SceneCaptureOrchestrator, SceneChangeBus, StartupError, TileExporter,
    TransitionIndex, DATASET_FILE_NAME,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::session::HostSession;
use super::sim_world::{SimWorld, SimWorldError};

const READY_TIMEOUT_ENV_VAR: &str = "MAPVIEW_READY_TIMEOUT_TICKS";
const TPS_ENV_VAR: &str = "MAPVIEW_TPS";
const DEFAULT_TICKS_PER_SECOND: u32 = 60;
const WORLD_FILE_NAME: &str = "world.json";
const PLACEMENTS_FILE_NAME: &str = "items.xml";
const TRANSITIONS_FILE_NAME: &str = "transitions.xml";

#[derive(Debug, Error)]
pub(crate) enum HostError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    World(#[from] SimWorldError),
    #[error(transparent)]
    Index(#[from] IndexLoadError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostOptions {
    pub(crate) world_dir: Option<PathBuf>,
    pub(crate) ticks_per_second: Option<u32>,
    pub(crate) read_stdin: bool,
    /// Command lines run before stdin is read.
    pub(crate) commands: Vec<String>,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            world_dir: None,
            ticks_per_second: None,
            read_stdin: true,
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CliAction {
    Help,
    Run(HostOptions),
}

pub(crate) struct HostWiring {
    pub(crate) session: HostSession,
    /// `None` runs ticks back to back.
    pub(crate) tick_interval: Option<Duration>,
    pub(crate) startup_commands: Vec<String>,
    pub(crate) read_stdin: bool,
}

pub(crate) fn parse_args(args: &[String]) -> Result<CliAction, String> {
    let mut options = HostOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "--world" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --world".to_string())?;
                options.world_dir = Some(PathBuf::from(value));
                index += 2;
            }
            "--tps" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --tps".to_string())?;
                options.ticks_per_second = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| format!("invalid --tps value '{value}' (expected u32)"))?,
                );
                index += 2;
            }
            "--no-stdin" => {
                options.read_stdin = false;
                index += 1;
            }
            "--" => {
                index += 1;
                break;
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown option '{other}'"));
            }
            _ => break,
        }
    }

    options.commands = split_command_lines(&args[index..]);
    Ok(CliAction::Run(options))
}

/// Trailing arguments form command lines separated by standalone `;`.
fn split_command_lines(args: &[String]) -> Vec<String> {
    args.split(|arg| arg == ";")
        .filter(|group| !group.is_empty())
        .map(|group| group.join(" "))
        .collect()
}

pub(crate) fn usage_text() -> String {
    [
        "mapview_host - headless scene capture host",
        "",
        "Usage:",
        "  mapview_host [--world <dir>] [--tps <u32>] [--no-stdin] [command [args...]] [; command ...]",
        "",
        "Commands: grand_tour [area], snap, goto <scene_id>, cancel, status, rooms [area], help, quit",
        "",
        "Environment:",
        "  MAPVIEW_ROOT                 project root (default: detected from the executable)",
        "  MAPVIEW_OUT_DIR              capture output directory (default: <root>/captures)",
        "  MAPVIEW_READY_TIMEOUT_TICKS  scene load wait bound in ticks, or 'none' (default: 1800)",
        "  MAPVIEW_TPS                  ticks per second, 0 for unthrottled (default: 60)",
    ]
    .join("\n")
}

pub(crate) fn build_app(options: HostOptions) -> Result<HostWiring, HostError> {
    init_tracing();
    info!("=== MapView Host Startup ===");

    let paths = resolve_capture_paths()?;
    let world_dir = options.world_dir.unwrap_or_else(|| {
        paths
            .root
            .join("crates")
            .join("mapview_host")
            .join("assets")
            .join("demo")
    });
    info!(
        root = %paths.root.display(),
        output_dir = %paths.output_dir.display(),
        world_dir = %world_dir.display(),
        "paths_resolved"
    );

    let bus = SceneChangeBus::new();
    let world = SimWorld::load(&world_dir.join(WORLD_FILE_NAME), bus.clone())?;
    let placements = PlacementIndex::load_xml(&world_dir.join(PLACEMENTS_FILE_NAME))?;
    let transitions = TransitionIndex::load_xml(&world_dir.join(TRANSITIONS_FILE_NAME))?;
    info!(
        placements = placements.len(),
        transitions = transitions.len(),
        "world_indexes_loaded"
    );

    let config = CaptureConfig {
        max_ready_wait_ticks: resolve_ready_timeout(CaptureConfig::default().max_ready_wait_ticks),
        ..CaptureConfig::default()
    };
    let mut orchestrator = SceneCaptureOrchestrator::new(
        config,
        RoomGraphBuilder::new(placements, transitions),
        TileExporter::new(&paths.output_dir),
    );
    orchestrator.attach(&bus);

    let captured_dataset = paths.output_dir.join(DATASET_FILE_NAME);
    let registry = if captured_dataset.is_file() {
        RoomRegistry::load_file_or_empty(&captured_dataset)
    } else {
        RoomRegistry::bundled()
    };

    let ticks_per_second = options
        .ticks_per_second
        .unwrap_or_else(|| resolve_ticks_per_second(DEFAULT_TICKS_PER_SECOND));
    let tick_interval = tick_interval_for(ticks_per_second);
    info!(ticks_per_second, "tick_rate_resolved");

    Ok(HostWiring {
        session: HostSession::new(world, orchestrator, Arc::new(registry)),
        tick_interval,
        startup_commands: options.commands,
        read_stdin: options.read_stdin,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn resolve_ready_timeout(default: Option<u32>) -> Option<u32> {
    match env::var(READY_TIMEOUT_ENV_VAR) {
        Ok(value) => parse_ready_timeout(&value).unwrap_or_else(|| {
            warn!(
                env_var = READY_TIMEOUT_ENV_VAR,
                value = value.as_str(),
                "invalid ready-timeout env var value; falling back to default"
            );
            default
        }),
        Err(env::VarError::NotPresent) => default,
        Err(err) => {
            warn!(
                env_var = READY_TIMEOUT_ENV_VAR,
                error = %err,
                "unable to read ready-timeout env var; falling back to default"
            );
            default
        }
    }
}

/// `Some(None)` disables the bound; `None` means the value is invalid.
fn parse_ready_timeout(value: &str) -> Option<Option<u32>> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed.eq_ignore_ascii_case("off") {
        return Some(None);
    }
    trimmed.parse::<u32>().ok().map(Some)
}

fn resolve_ticks_per_second(default: u32) -> u32 {
    match env::var(TPS_ENV_VAR) {
        Ok(value) => match value.trim().parse::<u32>() {
            Ok(tps) => tps,
            Err(_) => {
                warn!(
                    env_var = TPS_ENV_VAR,
                    value = value.as_str(),
                    "invalid tick-rate env var value; falling back to default"
                );
                default
            }
        },
        Err(env::VarError::NotPresent) => default,
        Err(err) => {
            warn!(
                env_var = TPS_ENV_VAR,
                error = %err,
                "unable to read tick-rate env var; falling back to default"
            );
            default
        }
    }
}

fn tick_interval_for(ticks_per_second: u32) -> Option<Duration> {
    (ticks_per_second > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(ticks_per_second)))
}
