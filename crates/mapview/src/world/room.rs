use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Axis-aligned world rectangle framing one scene.
///
/// `min`/`max` are kept exactly as given; nothing here rounds or clamps them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorldBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl WorldBounds {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            min: Vec2 {
                x: x1.min(x2),
                y: y1.min(y2),
            },
            max: Vec2 {
                x: x1.max(x2),
                y: y1.max(y2),
            },
        }
    }

    /// Smallest bounds containing every point. No points yields the zero bounds.
    pub fn encapsulating<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec2>,
    {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::default();
        };
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for point in points {
            bounds.min.x = bounds.min.x.min(point.x);
            bounds.min.y = bounds.min.y.min(point.y);
            bounds.max.x = bounds.max.x.max(point.x);
            bounds.max.y = bounds.max.y.max(point.y);
        }
        bounds
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Vec2 {
        Vec2 {
            x: (self.min.x + self.max.x) * 0.5,
            y: (self.min.y + self.max.y) * 0.5,
        }
    }
}

/// Something located in a room, usually an item check, named by what is normally there.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomLocation {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Bounding box extents; all zero when unknown.
    pub w: f32,
    pub h: f32,
    pub d: f32,
}

impl RoomLocation {
    pub fn new(id: impl Into<String>, position: Vec3, size: Vec3) -> Self {
        Self {
            id: id.into(),
            x: position.x,
            y: position.y,
            z: position.z,
            w: size.x,
            h: size.y,
            d: size.z,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn size(&self) -> Vec3 {
        Vec3::new(self.w, self.h, self.d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionSide {
    Top,
    Bottom,
    Left,
    Right,
}

/// An exit leaving a room through an in-scene connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomTransition {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    pub h: f32,
    pub d: f32,
    #[serde(rename = "srcDoor")]
    pub src_door: String,
    #[serde(rename = "destDoor")]
    pub dest_door: String,
}

impl RoomTransition {
    pub fn new(
        id: impl Into<String>,
        src_door: impl Into<String>,
        position: Vec3,
        size: Vec3,
        dest_door: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            x: position.x,
            y: position.y,
            z: position.z,
            w: size.x,
            h: size.y,
            d: size.z,
            src_door: src_door.into(),
            dest_door: dest_door.into(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn size(&self) -> Vec3 {
        Vec3::new(self.w, self.h, self.d)
    }

    /// Edge of the room this gate sits on, read from ids like `Crossroads_10[left1]`.
    /// Doors and other non-edge gates return `None`.
    pub fn side(&self) -> Option<TransitionSide> {
        let start = self.id.find('[')?;
        let inner = self.id[start + 1..].strip_suffix(']')?;
        match inner.trim_end_matches(|ch: char| ch.is_ascii_digit()) {
            "top" => Some(TransitionSide::Top),
            "bot" | "bottom" => Some(TransitionSide::Bottom),
            "left" => Some(TransitionSide::Left),
            "right" => Some(TransitionSide::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    /// Items or checks in this room, in placement index order.
    pub locations: Vec<RoomLocation>,
    /// Transitions leaving this room, in transition index order.
    pub transitions: Vec<RoomTransition>,
    /// World-space corners of the room's tile image.
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Room {
    pub fn new(id: impl Into<String>, bounds: WorldBounds) -> Self {
        Self {
            id: id.into(),
            locations: Vec::new(),
            transitions: Vec::new(),
            x1: bounds.min.x,
            y1: bounds.min.y,
            x2: bounds.max.x,
            y2: bounds.max.y,
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        WorldBounds {
            min: Vec2 {
                x: self.x1,
                y: self.y1,
            },
            max: Vec2 {
                x: self.x2,
                y: self.y2,
            },
        }
    }

    pub fn area(&self) -> &str {
        area_for_room(&self.id)
    }
}

/// World area a room id belongs to: usually the text before the first underscore.
pub fn area_for_room(room_id: &str) -> &str {
    if room_id.starts_with("White_Palace") {
        return "White_Palace";
    }
    if room_id.starts_with("Deepnest_East") {
        return "Deepnest_East";
    }
    match room_id.split_once('_') {
        Some((area, _)) => area,
        None => room_id,
    }
}
