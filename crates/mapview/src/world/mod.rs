mod dataset;
mod index;
mod projection;
mod registry;
mod room;
mod scene_ids;

pub use dataset::{DatasetDocument, DATASET_FORMAT_VERSION};
pub use index::{
    IndexErrorCode, IndexLoadError, PlacementIndex, PlacementRecord, SourceLocation,
    TransitionIndex, TransitionRecord,
};
pub use projection::TileProjection;
pub use registry::{RegistryLoadError, RoomRegistry};
pub use room::{
    area_for_room, Room, RoomLocation, RoomTransition, TransitionSide, Vec2, Vec3, WorldBounds,
};
pub use scene_ids::{
    companion_base, companion_scene_id, validate_scene_id, SceneIdError, COMPANION_SUFFIX,
    RESERVED_SCENE_IDS,
};
