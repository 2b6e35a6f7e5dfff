use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::{Pixel, Rgba, RgbaImage};
use mapview::{
    ColliderBounds, ConnectorObject, ElementId, LoadMode, RenderError, SceneChange,
    SceneChangeBus, SceneHost, TileProjection, Vec2, Vec3, Viewport, ViewportConfig,
    VisualElement, WorldBounds,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub(crate) const WORLD_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum SimWorldError {
    #[error("failed to read world fixture {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse world fixture at {json_path}: {source}")]
    Parse {
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("world fixture format_version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("world fixture declares scene '{id}' more than once")]
    DuplicateScene { id: String },
    #[error("start scene '{id}' is not declared in the world fixture")]
    UnknownStartScene { id: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorldFixture {
    format_version: u32,
    #[serde(default)]
    start_scene: Option<String>,
    #[serde(default)]
    load_ticks: u32,
    scenes: Vec<SceneFixture>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SceneFixture {
    id: String,
    bounds: [f32; 4],
    #[serde(default)]
    background: [u8; 3],
    #[serde(default)]
    connectors: Vec<ConnectorFixture>,
    #[serde(default)]
    elements: Vec<ElementFixture>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConnectorFixture {
    name: String,
    position: [f32; 2],
    #[serde(default)]
    collider: Option<ColliderFixture>,
    target_scene: String,
    entry_point: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct ColliderFixture {
    center: [f32; 2],
    size: [f32; 2],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElementFixture {
    name: String,
    #[serde(default)]
    controller: Option<String>,
    rect: [f32; 4],
    color: [u8; 4],
}

impl SceneFixture {
    fn bounds(&self) -> WorldBounds {
        let [x1, y1, x2, y2] = self.bounds;
        WorldBounds::new(x1, y1, x2, y2)
    }

    fn connector_objects(&self) -> impl Iterator<Item = ConnectorObject> + '_ {
        self.connectors.iter().map(|connector| ConnectorObject {
            name: connector.name.clone(),
            position: Vec3::new(connector.position[0], connector.position[1], 0.0),
            collider: connector.collider.map(|collider| ColliderBounds {
                center: Vec3::new(collider.center[0], collider.center[1], 0.0),
                size: Vec3::new(collider.size[0], collider.size[1], 0.0),
            }),
            target_scene: connector.target_scene.clone(),
            entry_point: connector.entry_point.clone(),
        })
    }
}

struct PendingLoad {
    scene_id: String,
    remaining_ticks: u32,
}

struct LiveElement {
    element: VisualElement,
    rect: WorldBounds,
    color: Rgba<u8>,
}

/// Headless stand-in for a game world: scene loading with latency, overlay
/// elements, connectors and a software rasterizer behind the live viewport.
pub(crate) struct SimWorld {
    scenes: HashMap<String, SceneFixture>,
    scene_order: Vec<String>,
    load_ticks: u32,
    active: Option<String>,
    additive: Vec<String>,
    pending: Option<PendingLoad>,
    pending_additive: Vec<String>,
    elements: Vec<LiveElement>,
    next_element_id: u64,
    viewport: ViewportConfig,
    player_collision: bool,
    bus: SceneChangeBus,
}

impl SimWorld {
    pub(crate) fn load(path: &Path, bus: SceneChangeBus) -> Result<Self, SimWorldError> {
        let raw = fs::read_to_string(path).map_err(|source| SimWorldError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw, bus)
    }

    pub(crate) fn from_json(raw: &str, bus: SceneChangeBus) -> Result<Self, SimWorldError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let fixture = serde_path_to_error::deserialize::<_, WorldFixture>(&mut deserializer)
            .map_err(|error| {
                let json_path = error.path().to_string();
                SimWorldError::Parse {
                    json_path,
                    source: error.into_inner(),
                }
            })?;
        if fixture.format_version != WORLD_FORMAT_VERSION {
            return Err(SimWorldError::VersionMismatch {
                expected: WORLD_FORMAT_VERSION,
                actual: fixture.format_version,
            });
        }

        let mut scenes = HashMap::with_capacity(fixture.scenes.len());
        let mut scene_order = Vec::with_capacity(fixture.scenes.len());
        for scene in fixture.scenes {
            if scenes.contains_key(&scene.id) {
                return Err(SimWorldError::DuplicateScene { id: scene.id });
            }
            scene_order.push(scene.id.clone());
            scenes.insert(scene.id.clone(), scene);
        }

        let mut world = Self {
            scenes,
            scene_order,
            load_ticks: fixture.load_ticks,
            active: None,
            additive: Vec::new(),
            pending: None,
            pending_additive: Vec::new(),
            elements: Vec::new(),
            next_element_id: 1,
            viewport: ViewportConfig::default(),
            player_collision: true,
            bus,
        };
        if let Some(start) = fixture.start_scene {
            if !world.scenes.contains_key(&start) {
                return Err(SimWorldError::UnknownStartScene { id: start });
            }
            world.spawn_scene_elements(&start);
            world.active = Some(start);
        }
        info!(
            scenes = world.scene_order.len(),
            start = ?world.active,
            "sim_world_loaded"
        );
        Ok(world)
    }

    /// Every declared scene in fixture order.
    pub(crate) fn scene_ids(&self) -> &[String] {
        &self.scene_order
    }

    pub(crate) fn has_scene(&self, scene_id: &str) -> bool {
        self.scenes.contains_key(scene_id)
    }

    pub(crate) fn player_collision(&self) -> bool {
        self.player_collision
    }

    /// One host tick: counts down an in-flight load and activates it when done.
    pub(crate) fn advance(&mut self) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if pending.remaining_ticks > 0 {
            pending.remaining_ticks -= 1;
            return;
        }
        if let Some(pending) = self.pending.take() {
            self.activate(pending.scene_id);
        }
    }

    fn activate(&mut self, scene_id: String) {
        self.elements.clear();
        self.additive.clear();
        self.spawn_scene_elements(&scene_id);
        for companion in std::mem::take(&mut self.pending_additive) {
            self.attach_additive(companion);
        }

        let previous = self.active.replace(scene_id.clone());
        info!(scene = %scene_id, additive = self.additive.len(), "scene_activated");
        self.bus.publish(SceneChange {
            previous,
            current: scene_id,
        });
    }

    fn attach_additive(&mut self, scene_id: String) {
        if !self.scenes.contains_key(&scene_id) {
            warn!(scene = %scene_id, "additive_scene_unknown");
            return;
        }
        self.spawn_scene_elements(&scene_id);
        self.additive.push(scene_id);
    }

    fn spawn_scene_elements(&mut self, scene_id: &str) {
        let Some(scene) = self.scenes.get(scene_id) else {
            return;
        };
        for fixture in &scene.elements {
            let [x1, y1, x2, y2] = fixture.rect;
            self.elements.push(LiveElement {
                element: VisualElement {
                    id: ElementId(self.next_element_id),
                    name: fixture.name.clone(),
                    controller: fixture.controller.clone(),
                    visible: true,
                },
                rect: WorldBounds::new(x1, y1, x2, y2),
                color: Rgba(fixture.color),
            });
            self.next_element_id += 1;
        }
    }

    fn loaded_scenes(&self) -> impl Iterator<Item = &SceneFixture> {
        self.active
            .iter()
            .chain(self.additive.iter())
            .filter_map(|id| self.scenes.get(id))
    }
}

impl SceneHost for SimWorld {
    fn active_scene(&self) -> Option<String> {
        self.active.clone()
    }

    fn request_load(&mut self, scene_id: &str, mode: LoadMode) {
        if !self.scenes.contains_key(scene_id) {
            warn!(scene = scene_id, mode = ?mode, "scene_load_unknown");
            return;
        }
        match mode {
            LoadMode::Single => {
                self.pending_additive.clear();
                self.pending = Some(PendingLoad {
                    scene_id: scene_id.to_string(),
                    remaining_ticks: self.load_ticks,
                });
            }
            LoadMode::Additive if self.pending.is_some() => {
                self.pending_additive.push(scene_id.to_string());
            }
            LoadMode::Additive => self.attach_additive(scene_id.to_string()),
        }
        debug!(scene = scene_id, mode = ?mode, "scene_load_started");
    }

    fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    fn scene_bounds(&self) -> WorldBounds {
        self.active
            .as_ref()
            .and_then(|id| self.scenes.get(id))
            .map(SceneFixture::bounds)
            .unwrap_or_default()
    }

    fn connectors(&self) -> Vec<ConnectorObject> {
        self.loaded_scenes()
            .flat_map(SceneFixture::connector_objects)
            .collect()
    }

    fn visual_elements(&self) -> Vec<VisualElement> {
        self.elements
            .iter()
            .map(|live| live.element.clone())
            .collect()
    }

    fn set_element_visible(&mut self, id: ElementId, visible: bool) {
        if let Some(live) = self.elements.iter_mut().find(|live| live.element.id == id) {
            live.element.visible = visible;
        }
    }

    fn set_player_collision(&mut self, enabled: bool) {
        self.player_collision = enabled;
        debug!(enabled, "player_collision_set");
    }
}

impl Viewport for SimWorld {
    fn viewport_config(&self) -> ViewportConfig {
        self.viewport
    }

    fn apply_viewport_config(&mut self, config: ViewportConfig) {
        self.viewport = config;
    }

    fn render_to_buffer(&mut self, width: u32, height: u32) -> Result<RgbaImage, RenderError> {
        let Some(scene) = self.active.as_ref().and_then(|id| self.scenes.get(id)) else {
            return Err(RenderError::Backend {
                message: "no active scene to render".to_string(),
            });
        };
        if width == 0 || height == 0 {
            return Err(RenderError::Backend {
                message: format!("cannot render a {width}x{height} target"),
            });
        }

        let half_height = self.viewport.ortho_half_height;
        let half_width = half_height * width as f32 / height as f32;
        let center = self.viewport.center;
        let view = WorldBounds::new(
            center.x - half_width,
            center.y - half_height,
            center.x + half_width,
            center.y + half_height,
        );
        let projection = TileProjection::new(view, width, height);

        let [r, g, b] = scene.background;
        let mut image = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));
        for live in self.elements.iter().filter(|live| live.element.visible) {
            fill_rect(&mut image, &projection, live.rect, live.color);
        }
        Ok(image)
    }
}

fn fill_rect(image: &mut RgbaImage, projection: &TileProjection, rect: WorldBounds, color: Rgba<u8>) {
    let (left, top) = projection.world_to_pixel(Vec2 {
        x: rect.min.x,
        y: rect.max.y,
    });
    let (right, bottom) = projection.world_to_pixel(Vec2 {
        x: rect.max.x,
        y: rect.min.y,
    });
    let last_x = image.width() as i32 - 1;
    let last_y = image.height() as i32 - 1;
    if right < 0 || bottom < 0 || left > last_x || top > last_y {
        return;
    }
    for y in top.max(0)..=bottom.min(last_y) {
        for x in left.max(0)..=right.min(last_x) {
            image.get_pixel_mut(x as u32, y as u32).blend(&color);
        }
    }
}

#[cfg(test)]
mod tests {
    use mapview::{run_cleanup, CleanupTable, ViewRenderer};

    use super::*;

    const DEMO_WORLD: &str = include_str!("../../assets/demo/world.json");

    fn demo_world() -> (SimWorld, SceneChangeBus) {
        let bus = SceneChangeBus::new();
        let world = SimWorld::from_json(DEMO_WORLD, bus.clone()).expect("demo world");
        (world, bus)
    }

    #[test]
    fn demo_world_starts_in_town() {
        let (world, _bus) = demo_world();
        assert_eq!(world.active_scene().as_deref(), Some("Town"));
        assert_eq!(world.scene_ids().len(), 6);
        assert!(!world.is_loading());
        assert_eq!(world.visual_elements().len(), 4);
    }

    #[test]
    fn single_load_takes_load_ticks_and_publishes_change() {
        let (mut world, bus) = demo_world();
        let subscription = bus.subscribe();

        world.request_load("Ridge1", LoadMode::Single);
        world.request_load("Ridge1_boss", LoadMode::Additive);
        for _ in 0..4 {
            world.advance();
            assert!(world.is_loading());
        }
        world.advance();
        assert!(!world.is_loading());
        assert_eq!(world.active_scene().as_deref(), Some("Ridge1"));

        let names = world
            .visual_elements()
            .into_iter()
            .map(|element| element.name)
            .collect::<Vec<_>>();
        assert_eq!(names, ["cliff", "arena_gate"]);
        assert_eq!(
            subscription.drain(),
            vec![SceneChange {
                previous: Some("Town".to_string()),
                current: "Ridge1".to_string(),
            }]
        );
    }

    #[test]
    fn unknown_scene_load_is_ignored() {
        let (mut world, _bus) = demo_world();
        world.request_load("Abyss_01", LoadMode::Single);
        assert!(!world.is_loading());
        assert_eq!(world.active_scene().as_deref(), Some("Town"));
    }

    #[test]
    fn connectors_map_colliders() {
        let (mut world, _bus) = demo_world();
        world.request_load("Crossroads_01", LoadMode::Single);
        for _ in 0..5 {
            world.advance();
        }
        let connectors = world.connectors();
        let top = connectors
            .iter()
            .find(|connector| connector.name == "top1")
            .expect("top1");
        assert_eq!(
            top.collider.map(|collider| collider.center),
            Some(Vec3::new(24.0, 31.5, 0.0))
        );
        assert_eq!(top.target_reference(), "Town[bot1]");
    }

    #[test]
    fn cleanup_removes_masks_from_rendered_tile() {
        let (mut world, _bus) = demo_world();
        let bounds = world.scene_bounds();
        let renderer = ViewRenderer::new(2.0);
        let before = renderer.capture(&mut world, bounds).expect("capture");

        let summary = run_cleanup(&mut world, &CleanupTable::standard());
        assert_eq!(summary.hidden, 3);
        let after = renderer.capture(&mut world, bounds).expect("capture");

        assert_eq!(after.dimensions(), (160, 60));
        let well_pixel = (72, 50);
        assert_eq!(before.get_pixel(well_pixel.0, well_pixel.1), &Rgba([0, 0, 0, 255]));
        assert_eq!(after.get_pixel(well_pixel.0, well_pixel.1), &Rgba([70, 90, 120, 255]));
        assert_eq!(world.viewport_config(), ViewportConfig::default());
    }

    #[test]
    fn parse_errors_report_json_path() {
        let raw = r#"{"format_version": 1, "scenes": [{"id": "Town", "bounds": [0, 0, 1]}]}"#;
        let Err(SimWorldError::Parse { json_path, .. }) =
            SimWorld::from_json(raw, SceneChangeBus::new())
        else {
            panic!("expected parse error");
        };
        assert_eq!(json_path, "scenes[0].bounds");
    }

    #[test]
    fn unknown_start_scene_is_rejected() {
        let raw = r#"{"format_version": 1, "start_scene": "Nowhere", "scenes": []}"#;
        assert!(matches!(
            SimWorld::from_json(raw, SceneChangeBus::new()),
            Err(SimWorldError::UnknownStartScene { .. })
        ));
    }
}
