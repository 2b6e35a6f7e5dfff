use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError, RgbaImage};
use thiserror::Error;
use tracing::debug;

use crate::world::{Vec2, WorldBounds};

/// Texels per world unit in exported tiles. Bigger numbers give higher resolution tiles.
pub const MAP_TILE_SCALE: f32 = 20.0;
/// Orthographic half-height of the live picture-in-picture view.
pub const LIVE_VIEW_ZOOM: f32 = 100.0;
pub const MAX_CAPTURE_DIMENSION_PX: u32 = 16_384;

/// Normalized screen rectangle a view draws into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewRect {
    pub const FULL: ViewRect = ViewRect {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };
    pub const LIVE_CORNER: ViewRect = ViewRect {
        x: 0.8,
        y: 0.8,
        width: 0.15,
        height: 0.15,
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportConfig {
    pub center: Vec2,
    /// Half the height of the visible world volume.
    pub ortho_half_height: f32,
    pub rect: ViewRect,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            center: Vec2::default(),
            ortho_half_height: LIVE_VIEW_ZOOM,
            rect: ViewRect::LIVE_CORNER,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer backend failed: {message}")]
    Backend { message: String },
    #[error("renderer returned {actual_width}x{actual_height}, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(
        "capture bounds {world_width}x{world_height} give degenerate resolution {width_px}x{height_px}"
    )]
    DegenerateBounds {
        world_width: f32,
        world_height: f32,
        width_px: i64,
        height_px: i64,
    },
    #[error("capture resolution {width_px}x{height_px} exceeds the {max}px limit")]
    TooLarge { width_px: u32, height_px: u32, max: u32 },
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Live camera the capture borrows for one frame.
pub trait Viewport {
    fn viewport_config(&self) -> ViewportConfig;
    fn apply_viewport_config(&mut self, config: ViewportConfig);
    fn render_to_buffer(&mut self, width: u32, height: u32) -> Result<RgbaImage, RenderError>;
}

/// Pixel size of a capture: `round(extent * scale)` on each axis.
pub fn capture_resolution(bounds: WorldBounds, scale: f32) -> Result<(u32, u32), CaptureError> {
    let world_width = bounds.width();
    let world_height = bounds.height();
    let width = (world_width * scale).round();
    let height = (world_height * scale).round();

    if !width.is_finite() || !height.is_finite() || width < 1.0 || height < 1.0 {
        return Err(CaptureError::DegenerateBounds {
            world_width,
            world_height,
            width_px: if width.is_finite() { width as i64 } else { 0 },
            height_px: if height.is_finite() { height as i64 } else { 0 },
        });
    }
    if width > MAX_CAPTURE_DIMENSION_PX as f32 || height > MAX_CAPTURE_DIMENSION_PX as f32 {
        return Err(CaptureError::TooLarge {
            width_px: width as u32,
            height_px: height as u32,
            max: MAX_CAPTURE_DIMENSION_PX,
        });
    }
    Ok((width as u32, height as u32))
}

/// Restores the saved viewport configuration when dropped.
struct ViewportOverride<'a, V: Viewport + ?Sized> {
    viewport: &'a mut V,
    saved: ViewportConfig,
}

impl<'a, V: Viewport + ?Sized> ViewportOverride<'a, V> {
    fn apply(viewport: &'a mut V, config: ViewportConfig) -> Self {
        let saved = viewport.viewport_config();
        viewport.apply_viewport_config(config);
        Self { viewport, saved }
    }

    fn render(&mut self, width: u32, height: u32) -> Result<RgbaImage, RenderError> {
        self.viewport.render_to_buffer(width, height)
    }
}

impl<V: Viewport + ?Sized> Drop for ViewportOverride<'_, V> {
    fn drop(&mut self) {
        self.viewport.apply_viewport_config(self.saved);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ViewRenderer {
    scale: f32,
}

impl Default for ViewRenderer {
    fn default() -> Self {
        Self::new(MAP_TILE_SCALE)
    }
}

impl ViewRenderer {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Frames `bounds` exactly, renders one buffer, then puts the viewport back.
    pub fn capture<V: Viewport + ?Sized>(
        &self,
        viewport: &mut V,
        bounds: WorldBounds,
    ) -> Result<RgbaImage, CaptureError> {
        let (width, height) = capture_resolution(bounds, self.scale)?;
        let capture_config = ViewportConfig {
            center: bounds.center(),
            ortho_half_height: bounds.height() * 0.5,
            rect: ViewRect::FULL,
        };

        let mut view = ViewportOverride::apply(viewport, capture_config);
        let buffer = view.render(width, height)?;
        if buffer.width() != width || buffer.height() != height {
            return Err(RenderError::SizeMismatch {
                width,
                height,
                actual_width: buffer.width(),
                actual_height: buffer.height(),
            }
            .into());
        }
        debug!(width, height, "viewport_captured");
        Ok(buffer)
    }
}

pub fn encode_png(buffer: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(
        buffer.as_raw(),
        buffer.width(),
        buffer.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    struct RecordingViewport {
        config: ViewportConfig,
        applied: Vec<ViewportConfig>,
        render_calls: u32,
        fail_render: bool,
        wrong_size: bool,
    }

    impl RecordingViewport {
        fn new() -> Self {
            Self {
                config: ViewportConfig::default(),
                applied: Vec::new(),
                render_calls: 0,
                fail_render: false,
                wrong_size: false,
            }
        }
    }

    impl Viewport for RecordingViewport {
        fn viewport_config(&self) -> ViewportConfig {
            self.config
        }

        fn apply_viewport_config(&mut self, config: ViewportConfig) {
            self.config = config;
            self.applied.push(config);
        }

        fn render_to_buffer(&mut self, width: u32, height: u32) -> Result<RgbaImage, RenderError> {
            self.render_calls += 1;
            if self.fail_render {
                return Err(RenderError::Backend {
                    message: "device lost".to_string(),
                });
            }
            if self.wrong_size {
                return Ok(RgbaImage::new(width + 1, height));
            }
            Ok(RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255])))
        }
    }

    #[test]
    fn resolution_scales_and_rounds_bounds() {
        let bounds = WorldBounds::new(0.0, 0.0, 10.0, 5.0);
        assert_eq!(capture_resolution(bounds, 20.0).expect("res"), (200, 100));

        let bounds = WorldBounds::new(0.0, 0.0, 10.03, 4.98);
        assert_eq!(capture_resolution(bounds, 20.0).expect("res"), (201, 100));
    }

    #[test]
    fn zero_width_bounds_fail_before_rendering() {
        let mut viewport = RecordingViewport::new();
        let bounds = WorldBounds::new(0.0, 0.0, 0.0, 5.0);
        let error = ViewRenderer::new(20.0)
            .capture(&mut viewport, bounds)
            .expect_err("degenerate");
        assert!(matches!(error, CaptureError::DegenerateBounds { .. }));
        assert_eq!(viewport.render_calls, 0);
        assert!(viewport.applied.is_empty());
    }

    #[test]
    fn tiny_bounds_that_round_to_zero_are_degenerate() {
        let bounds = WorldBounds::new(0.0, 0.0, 0.02, 5.0);
        assert!(matches!(
            capture_resolution(bounds, 20.0),
            Err(CaptureError::DegenerateBounds { width_px: 0, .. })
        ));
    }

    #[test]
    fn oversized_bounds_are_rejected() {
        let bounds = WorldBounds::new(0.0, 0.0, 5_000.0, 5.0);
        assert!(matches!(
            capture_resolution(bounds, 20.0),
            Err(CaptureError::TooLarge { .. })
        ));
    }

    #[test]
    fn capture_frames_bounds_and_restores_viewport() {
        let mut viewport = RecordingViewport::new();
        let original = viewport.config;
        let bounds = WorldBounds::new(-4.0, 2.0, 6.0, 7.0);

        let buffer = ViewRenderer::new(20.0)
            .capture(&mut viewport, bounds)
            .expect("capture");
        assert_eq!(buffer.dimensions(), (200, 100));
        assert_eq!(viewport.config, original);
        assert_eq!(viewport.applied.len(), 2);
        let framing = viewport.applied[0];
        assert_eq!(framing.center, Vec2 { x: 1.0, y: 4.5 });
        assert_eq!(framing.ortho_half_height, 2.5);
        assert_eq!(framing.rect, ViewRect::FULL);
    }

    #[test]
    fn viewport_is_restored_when_render_fails() {
        let mut viewport = RecordingViewport::new();
        viewport.fail_render = true;
        let original = viewport.config;

        let error = ViewRenderer::default()
            .capture(&mut viewport, WorldBounds::new(0.0, 0.0, 1.0, 1.0))
            .expect_err("render failure");
        assert!(matches!(error, CaptureError::Render(RenderError::Backend { .. })));
        assert_eq!(viewport.config, original);
    }

    #[test]
    fn wrong_buffer_size_is_an_error_and_still_restores() {
        let mut viewport = RecordingViewport::new();
        viewport.wrong_size = true;
        let original = viewport.config;

        let error = ViewRenderer::default()
            .capture(&mut viewport, WorldBounds::new(0.0, 0.0, 1.0, 1.0))
            .expect_err("size mismatch");
        assert!(matches!(
            error,
            CaptureError::Render(RenderError::SizeMismatch { .. })
        ));
        assert_eq!(viewport.config, original);
    }

    #[test]
    fn png_encoding_is_deterministic_and_lossless() {
        let mut buffer = RgbaImage::new(4, 3);
        buffer.put_pixel(1, 2, Rgba([255, 0, 128, 200]));
        let first = encode_png(&buffer).expect("encode");
        let second = encode_png(&buffer).expect("encode");
        assert_eq!(first, second);

        let decoded = image::load_from_memory(&first).expect("decode").to_rgba8();
        assert_eq!(decoded, buffer);
    }
}
