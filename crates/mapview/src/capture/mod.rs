mod builder;
mod cleanup;
mod config;
mod events;
mod host;
mod orchestrator;
mod renderer;

pub use builder::{BuildError, ConnectorListing, DiscoveredConnector, RoomGraphBuilder};
pub use cleanup::{
    run_cleanup, CleanupAction, CleanupRule, CleanupSummary, CleanupTable, ElementMatcher,
    OverlayCategory, CLEANUP_TABLE_VERSION,
};
pub use config::CaptureConfig;
pub use events::{CancelToken, SceneChange, SceneChangeBus, SceneChangeSubscription};
pub use host::{ColliderBounds, ConnectorObject, ElementId, LoadMode, SceneHost, VisualElement};
pub use orchestrator::{
    plan_traversal, BeginError, CaptureStepError, CapturePhase, SceneCaptureOrchestrator,
    SceneVisit, TickStatus, TraversalMode, TraversalPlan, TraversalReport,
};
pub use renderer::{
    capture_resolution, encode_png, CaptureError, RenderError, ViewRect, ViewRenderer, Viewport,
    ViewportConfig, LIVE_VIEW_ZOOM, MAP_TILE_SCALE, MAX_CAPTURE_DIMENSION_PX,
};
