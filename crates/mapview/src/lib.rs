use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod capture;
pub mod export;
pub mod world;

pub use capture::{
    plan_traversal, run_cleanup, BeginError, BuildError, CancelToken, CaptureConfig, CaptureError,
    CapturePhase, CaptureStepError, CleanupAction, CleanupRule, CleanupTable, ColliderBounds,
    ConnectorObject, ElementId, ElementMatcher, LoadMode, OverlayCategory, RenderError,
    RoomGraphBuilder, SceneCaptureOrchestrator, SceneChange, SceneChangeBus,
    SceneChangeSubscription, SceneHost, TickStatus, TraversalMode, TraversalReport, ViewRect,
    ViewRenderer, Viewport, ViewportConfig, VisualElement, MAP_TILE_SCALE,
};
pub use export::{
    DatasetManifestV1, DatasetSummary, ExportError, TileExporter, DATASET_FILE_NAME,
};
pub use world::{
    area_for_room, DatasetDocument, IndexLoadError, PlacementIndex, Room, RoomLocation,
    RoomRegistry, RoomTransition, TileProjection, TransitionIndex, Vec2, Vec3, WorldBounds,
};

pub const ROOT_ENV_VAR: &str = "MAPVIEW_ROOT";
pub const OUT_DIR_ENV_VAR: &str = "MAPVIEW_OUT_DIR";

#[derive(Debug, Clone)]
pub struct CapturePaths {
    pub root: PathBuf,
    /// Where tiles, room metadata and the consolidated dataset are written.
    pub output_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create output directory at {path}: {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{var} points at {path}, which has no crates/mapview/Cargo.toml under a workspace Cargo.toml")]
    InvalidEnvRoot { var: &'static str, path: PathBuf },
    #[error("no mapview workspace above {start_dir}; set {var} to the checkout that holds crates/mapview")]
    RootNotFound {
        start_dir: PathBuf,
        var: &'static str,
    },
}

/// Resolves the project root and the capture output directory, creating the latter.
pub fn resolve_capture_paths() -> Result<CapturePaths, StartupError> {
    let root = resolve_root()?;
    let output_dir = match env::var(OUT_DIR_ENV_VAR) {
        Ok(value) => PathBuf::from(value),
        Err(env::VarError::NotPresent) => root.join("captures"),
        Err(source) => {
            return Err(StartupError::EnvVar {
                var: OUT_DIR_ENV_VAR,
                source,
            })
        }
    };

    fs::create_dir_all(&output_dir).map_err(|source| StartupError::CreateOutputDir {
        path: output_dir.clone(),
        source,
    })?;

    Ok(CapturePaths {
        root,
        output_dir: normalize_path(&output_dir),
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    let env_root = match env::var(ROOT_ENV_VAR) {
        Ok(value) => Some(normalize_path(Path::new(&value))),
        Err(env::VarError::NotPresent) => None,
        Err(source) => {
            return Err(StartupError::EnvVar {
                var: ROOT_ENV_VAR,
                source,
            })
        }
    };
    if let Some(root) = env_root {
        return if is_workspace_root(&root) {
            Ok(root)
        } else {
            Err(StartupError::InvalidEnvRoot {
                var: ROOT_ENV_VAR,
                path: root,
            })
        };
    }

    let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
    let start_dir = exe
        .parent()
        .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
    start_dir
        .ancestors()
        .find(|candidate| is_workspace_root(candidate))
        .map(normalize_path)
        .ok_or_else(|| StartupError::RootNotFound {
            start_dir: normalize_path(start_dir),
            var: ROOT_ENV_VAR,
        })
}

/// A checkout root: the workspace manifest plus the capture library crate.
fn is_workspace_root(path: &Path) -> bool {
    path.join("Cargo.toml").is_file()
        && path.join("crates").join("mapview").join("Cargo.toml").is_file()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
