use crate::world::{Vec3, WorldBounds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Replace every loaded scene.
    Single,
    /// Load alongside what is already loaded.
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// A renderable element in the loaded scenes that cleanup may hide.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualElement {
    pub id: ElementId,
    pub name: String,
    /// Name of the state machine driving this element or one of its ancestors.
    pub controller: Option<String>,
    pub visible: bool,
}

/// World-space collision box of a connector: center and full extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderBounds {
    pub center: Vec3,
    pub size: Vec3,
}

/// A transition gate object physically present in the loaded scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorObject {
    pub name: String,
    pub position: Vec3,
    pub collider: Option<ColliderBounds>,
    pub target_scene: String,
    pub entry_point: String,
}

impl ConnectorObject {
    /// Where the object itself says it leads, as `Scene[entry]`.
    pub fn target_reference(&self) -> String {
        format!("{}[{}]", self.target_scene, self.entry_point)
    }
}

/// Scene-side capabilities the capture orchestrator drives.
///
/// Implemented by whatever owns the live game world. Every call happens on the
/// host's own tick; nothing here is expected to block.
pub trait SceneHost {
    fn active_scene(&self) -> Option<String>;
    fn request_load(&mut self, scene_id: &str, mode: LoadMode);
    /// True while a scene load or transition is in flight.
    fn is_loading(&self) -> bool;
    /// Camera border extents of the active scene.
    fn scene_bounds(&self) -> WorldBounds;
    fn connectors(&self) -> Vec<ConnectorObject>;
    fn visual_elements(&self) -> Vec<VisualElement>;
    fn set_element_visible(&mut self, id: ElementId, visible: bool);
    fn set_player_collision(&mut self, _enabled: bool) {}
}
