use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use super::dataset::{DatasetDocument, DATASET_FORMAT_VERSION};
use super::room::Room;

const BUNDLED_DATASET_JSON: &str = include_str!("../../assets/map_data.json");

#[derive(Debug, Error)]
pub enum RegistryLoadError {
    #[error("failed to read dataset file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse dataset at {json_path}: {source}")]
    Parse {
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("dataset format_version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
    #[error("dataset contains room id '{id}' more than once")]
    DuplicateRoom { id: String },
}

/// Read-only room lookup built once from a pre-baked dataset.
///
/// Construction never fails: any load problem is logged and yields an empty
/// registry. Share it as `Arc<RoomRegistry>`; there is no write path.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    ids_in_order: Vec<String>,
}

impl RoomRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry over the dataset compiled into this crate.
    pub fn bundled() -> Self {
        Self::from_json_or_empty("bundled", BUNDLED_DATASET_JSON)
    }

    pub fn load_file_or_empty(path: &Path) -> Self {
        let result = fs::read_to_string(path)
            .map_err(|source| RegistryLoadError::Read {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|raw| Self::try_from_json(&raw));
        Self::or_empty(&path.display().to_string(), result)
    }

    pub fn from_json_or_empty(source_name: &str, raw: &str) -> Self {
        Self::or_empty(source_name, Self::try_from_json(raw))
    }

    pub fn try_from_json(raw: &str) -> Result<Self, RegistryLoadError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let document =
            serde_path_to_error::deserialize::<_, DatasetDocument>(&mut deserializer).map_err(
                |error| {
                    let json_path = error.path().to_string();
                    RegistryLoadError::Parse {
                        json_path,
                        source: error.into_inner(),
                    }
                },
            )?;

        if document.format_version != DATASET_FORMAT_VERSION {
            return Err(RegistryLoadError::VersionMismatch {
                expected: DATASET_FORMAT_VERSION,
                actual: document.format_version,
            });
        }

        let mut rooms = HashMap::with_capacity(document.rooms.len());
        let mut ids_in_order = Vec::with_capacity(document.rooms.len());
        for room in document.rooms {
            if rooms.contains_key(&room.id) {
                return Err(RegistryLoadError::DuplicateRoom { id: room.id });
            }
            ids_in_order.push(room.id.clone());
            rooms.insert(room.id.clone(), room);
        }

        Ok(Self {
            rooms,
            ids_in_order,
        })
    }

    fn or_empty(source_name: &str, result: Result<Self, RegistryLoadError>) -> Self {
        match result {
            Ok(registry) => {
                info!(
                    source = source_name,
                    room_count = registry.len(),
                    "room_registry_loaded"
                );
                registry
            }
            Err(error) => {
                warn!(
                    source = source_name,
                    error = %error,
                    "room_registry_load_failed_using_empty"
                );
                Self::empty()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Room ids in dataset order.
    pub fn ids(&self) -> &[String] {
        &self.ids_in_order
    }

    pub fn rooms_in_area<'a>(&'a self, area: &'a str) -> impl Iterator<Item = &'a Room> {
        self.ids_in_order
            .iter()
            .filter_map(|id| self.rooms.get(id))
            .filter(move |room| room.area() == area)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use tempfile::TempDir;

    use super::*;

    const TWO_ROOMS: &str = r#"{
        "format_version": 1,
        "rooms": [
            {"id": "Town", "locations": [], "transitions": [], "x1": 0.0, "y1": 0.0, "x2": 40.0, "y2": 20.0},
            {"id": "Crossroads_01", "locations": [{"id": "Geo", "x": 1.0, "y": 2.0, "z": 0.0, "w": 0.0, "h": 0.0, "d": 0.0}],
             "transitions": [], "x1": -5.0, "y1": 0.0, "x2": 5.0, "y2": 10.0}
        ]
    }"#;

    #[test]
    fn get_returns_rooms_and_none_for_unknown_ids() {
        let registry = RoomRegistry::try_from_json(TWO_ROOMS).expect("load");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), ["Town", "Crossroads_01"]);
        let room = registry.get("Crossroads_01").expect("room");
        assert_eq!(room.locations.len(), 1);
        assert!(registry.get("Abyss_01").is_none());
        assert!(registry.get("").is_none());
    }

    #[test]
    fn repeated_lookups_return_identical_rooms() {
        let registry = RoomRegistry::try_from_json(TWO_ROOMS).expect("load");
        let first = registry.get("Town").cloned();
        let second = registry.get("Town").cloned();
        assert_eq!(first, second);
        assert!(std::ptr::eq(
            registry.get("Town").expect("town"),
            registry.get("Town").expect("town")
        ));
    }

    #[test]
    fn corrupt_dataset_falls_back_to_empty() {
        let registry = RoomRegistry::from_json_or_empty("test", "{ not json");
        assert!(registry.is_empty());
        assert!(registry.get("Town").is_none());
    }

    #[test]
    fn parse_error_reports_json_path() {
        let raw = r#"{"format_version": 1, "rooms": [{"id": "Town", "locations": [], "transitions": [], "x1": "wide", "y1": 0.0, "x2": 1.0, "y2": 1.0}]}"#;
        let error = RoomRegistry::try_from_json(raw).expect_err("error");
        let RegistryLoadError::Parse { json_path, .. } = error else {
            panic!("expected parse error");
        };
        assert_eq!(json_path, "rooms[0].x1");
    }

    #[test]
    fn version_mismatch_and_duplicates_fall_back_to_empty() {
        let future = TWO_ROOMS.replace("\"format_version\": 1", "\"format_version\": 9");
        assert!(matches!(
            RoomRegistry::try_from_json(&future),
            Err(RegistryLoadError::VersionMismatch { actual: 9, .. })
        ));
        assert!(RoomRegistry::from_json_or_empty("test", &future).is_empty());

        let dup = r#"{"format_version": 1, "rooms": [
            {"id": "Town", "locations": [], "transitions": [], "x1": 0.0, "y1": 0.0, "x2": 1.0, "y2": 1.0},
            {"id": "Town", "locations": [], "transitions": [], "x1": 0.0, "y1": 0.0, "x2": 1.0, "y2": 1.0}
        ]}"#;
        assert!(matches!(
            RoomRegistry::try_from_json(dup),
            Err(RegistryLoadError::DuplicateRoom { .. })
        ));
    }

    #[test]
    fn missing_file_falls_back_to_empty() {
        let temp = TempDir::new().expect("temp");
        let registry = RoomRegistry::load_file_or_empty(&temp.path().join("MapData.json"));
        assert!(registry.is_empty());
    }

    #[test]
    fn bundled_dataset_parses() {
        let registry = RoomRegistry::try_from_json(BUNDLED_DATASET_JSON).expect("bundled");
        assert!(registry.get("Town").is_some());
        assert!(registry.rooms_in_area("Crossroads").count() >= 1);
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        let registry = Arc::new(RoomRegistry::try_from_json(TWO_ROOMS).expect("load"));
        let handles = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get("Town").map(|room| room.x2))
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join().expect("join"), Some(40.0));
        }
    }
}
