use serde::{Deserialize, Serialize};

use super::room::Room;

pub const DATASET_FORMAT_VERSION: u32 = 1;

/// Consolidated room graph, as written after a traversal and bundled for lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDocument {
    pub format_version: u32,
    pub rooms: Vec<Room>,
}

impl DatasetDocument {
    pub fn new(rooms: Vec<Room>) -> Self {
        Self {
            format_version: DATASET_FORMAT_VERSION,
            rooms,
        }
    }
}
