use super::room::{Vec2, WorldBounds};

/// Maps between tile pixels and world space for one exported tile.
///
/// Pixel (0, 0) is the top-left corner of the image and sits at world (x1, y2).
/// The last pixel column/row is inclusive of the right/bottom world edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileProjection {
    bounds: WorldBounds,
    width_px: u32,
    height_px: u32,
}

impl TileProjection {
    pub fn new(bounds: WorldBounds, width_px: u32, height_px: u32) -> Self {
        Self {
            bounds,
            width_px,
            height_px,
        }
    }

    pub fn image_size(&self) -> (u32, u32) {
        (self.width_px, self.height_px)
    }

    pub fn pixel_to_world(&self, x: f32, y: f32) -> Vec2 {
        let last_x = self.width_px.saturating_sub(1) as f32;
        let last_y = self.height_px.saturating_sub(1) as f32;
        Vec2 {
            x: lerp(x, 0.0, last_x, self.bounds.min.x, self.bounds.max.x),
            y: lerp(y, 0.0, last_y, self.bounds.max.y, self.bounds.min.y),
        }
    }

    pub fn world_to_pixel(&self, world: Vec2) -> (i32, i32) {
        let last_x = self.width_px.saturating_sub(1) as f32;
        let last_y = self.height_px.saturating_sub(1) as f32;
        let x = lerp(world.x, self.bounds.min.x, self.bounds.max.x, 0.0, last_x);
        let y = lerp(world.y, self.bounds.max.y, self.bounds.min.y, 0.0, last_y);
        (x.round() as i32, y.round() as i32)
    }
}

fn lerp(value: f32, a_min: f32, a_max: f32, b_min: f32, b_max: f32) -> f32 {
    let span = a_max - a_min;
    if span == 0.0 {
        return b_min;
    }
    ((b_max - b_min) * value + a_max * b_min - a_min * b_max) / span
}
