use super::renderer::MAP_TILE_SCALE;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Texels per world unit.
    pub tile_scale: f32,
    /// Ticks between hiding overlays and capturing.
    pub settle_ticks: u32,
    /// Ticks between finishing one scene and loading the next.
    pub pacing_ticks: u32,
    /// Ticks to wait for a scene to finish loading; `None` waits forever.
    pub max_ready_wait_ticks: Option<u32>,
    /// Snapshot the new scene whenever the host changes scene while idle.
    pub snapshot_on_scene_change: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tile_scale: MAP_TILE_SCALE,
            settle_ticks: 3,
            pacing_ticks: 6,
            max_ready_wait_ticks: Some(1800),
            snapshot_on_scene_change: true,
        }
    }
}
