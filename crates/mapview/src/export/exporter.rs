use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageError, RgbaImage};
use thiserror::Error;
use tracing::{info, warn};

use super::atomic_io::{is_staging_file, write_bytes_atomic};
use super::hashing::sha256_hex;
use super::manifest::{write_manifest_atomic, DatasetManifestV1};
use crate::capture::encode_png;
use crate::world::{validate_scene_id, DatasetDocument, Room, SceneIdError, DATASET_FORMAT_VERSION};

pub const METADATA_EXTENSION: &str = "json";
pub const IMAGE_EXTENSION: &str = "png";
pub const DATASET_FILE_NAME: &str = "MapData.json";
pub const DATASET_MANIFEST_FILE_NAME: &str = "MapData.manifest.json";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("room id '{id}' is not a valid file stem: {source}")]
    InvalidRoomId {
        id: String,
        #[source]
        source: SceneIdError,
    },
    #[error("failed to encode tile image for '{id}': {source}")]
    EncodeImage {
        id: String,
        #[source]
        source: ImageError,
    },
    #[error("failed to encode json for {path}: {source}")]
    EncodeJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to list output directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read room metadata {path}: {source}")]
    ReadMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse room metadata {path} at {json_path}: {source}")]
    ParseMetadata {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub room_count: usize,
    pub dataset_path: PathBuf,
    pub manifest_path: PathBuf,
    pub dataset_sha256_hex: String,
}

/// Writes per-room artifacts under one output root and consolidates them.
#[derive(Debug, Clone)]
pub struct TileExporter {
    output_root: PathBuf,
}

impl TileExporter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn metadata_path(&self, room_id: &str) -> PathBuf {
        self.output_root
            .join(format!("{room_id}.{METADATA_EXTENSION}"))
    }

    pub fn image_path(&self, room_id: &str) -> PathBuf {
        self.output_root.join(format!("{room_id}.{IMAGE_EXTENSION}"))
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.output_root.join(DATASET_FILE_NAME)
    }

    pub fn dataset_manifest_path(&self) -> PathBuf {
        self.output_root.join(DATASET_MANIFEST_FILE_NAME)
    }

    /// A scene counts as done only once both of its artifacts exist.
    pub fn is_exported(&self, room_id: &str) -> bool {
        if validate_scene_id(room_id).is_err() {
            return false;
        }
        self.image_path(room_id).is_file() && self.metadata_path(room_id).is_file()
    }

    /// Writes the tile image, then the room metadata. Metadata last means a
    /// crash between the two leaves the scene counted as not exported.
    pub fn export(&self, room: &Room, image: &RgbaImage) -> Result<(), ExportError> {
        validate_scene_id(&room.id).map_err(|source| ExportError::InvalidRoomId {
            id: room.id.clone(),
            source,
        })?;

        let png = encode_png(image).map_err(|source| ExportError::EncodeImage {
            id: room.id.clone(),
            source,
        })?;
        let metadata_path = self.metadata_path(&room.id);
        let metadata =
            serde_json::to_string_pretty(room).map_err(|source| ExportError::EncodeJson {
                path: metadata_path.clone(),
                source,
            })?;

        let image_path = self.image_path(&room.id);
        write_bytes_atomic(&image_path, &png).map_err(|source| ExportError::Write {
            path: image_path.clone(),
            source,
        })?;
        write_bytes_atomic(&metadata_path, metadata.as_bytes()).map_err(|source| {
            ExportError::Write {
                path: metadata_path.clone(),
                source,
            }
        })?;

        info!(
            room = %room.id,
            width = image.width(),
            height = image.height(),
            locations = room.locations.len(),
            transitions = room.transitions.len(),
            "room_exported"
        );
        Ok(())
    }

    /// Gathers every room metadata file under the output root into one dataset.
    pub fn export_data(&self) -> Result<DatasetSummary, ExportError> {
        let mut rooms = self.collect_rooms()?;
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        let room_count = rooms.len();

        let dataset_path = self.dataset_path();
        let document = DatasetDocument::new(rooms);
        let text =
            serde_json::to_string_pretty(&document).map_err(|source| ExportError::EncodeJson {
                path: dataset_path.clone(),
                source,
            })?;
        write_bytes_atomic(&dataset_path, text.as_bytes()).map_err(|source| {
            ExportError::Write {
                path: dataset_path.clone(),
                source,
            }
        })?;

        let dataset_sha256_hex = sha256_hex(text.as_bytes());
        let manifest_path = self.dataset_manifest_path();
        write_manifest_atomic(
            &manifest_path,
            &DatasetManifestV1 {
                format_version: DATASET_FORMAT_VERSION,
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                room_count,
                dataset_sha256_hex: dataset_sha256_hex.clone(),
            },
        )?;

        info!(
            path = %dataset_path.display(),
            room_count,
            sha256 = %dataset_sha256_hex,
            "dataset_exported"
        );
        Ok(DatasetSummary {
            room_count,
            dataset_path,
            manifest_path,
            dataset_sha256_hex,
        })
    }

    fn collect_rooms(&self) -> Result<Vec<Room>, ExportError> {
        let entries = match fs::read_dir(&self.output_root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ExportError::ReadDir {
                    path: self.output_root.clone(),
                    source,
                })
            }
        };

        let mut rooms = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ExportError::ReadDir {
                path: self.output_root.clone(),
                source,
            })?;
            let path = entry.path();
            if !is_room_metadata_file(&path) {
                continue;
            }
            let room = read_room_metadata(&path)?;
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            if stem != Some(room.id.as_str()) {
                warn!(
                    path = %path.display(),
                    room = %room.id,
                    "room_metadata_name_mismatch"
                );
            }
            rooms.push(room);
        }
        Ok(rooms)
    }
}

fn is_room_metadata_file(path: &Path) -> bool {
    if !path.is_file() || is_staging_file(path) {
        return false;
    }
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    if file_name == DATASET_FILE_NAME || file_name == DATASET_MANIFEST_FILE_NAME {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == METADATA_EXTENSION)
}

fn read_room_metadata(path: &Path) -> Result<Room, ExportError> {
    let raw = fs::read_to_string(path).map_err(|source| ExportError::ReadMetadata {
        path: path.to_path_buf(),
        source,
    })?;
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        ExportError::ParseMetadata {
            path: path.to_path_buf(),
            json_path,
            source: error.into_inner(),
        }
    })
}

#[cfg(test)]
mod tests {
    use image::Rgba;
    use tempfile::TempDir;

    use super::*;
    use crate::export::read_manifest;
    use crate::world::{RoomLocation, RoomRegistry, Vec3, WorldBounds};

    fn room(id: &str) -> Room {
        let mut room = Room::new(id, WorldBounds::new(0.0, 0.0, 10.0, 5.0));
        room.locations
            .push(RoomLocation::new("Geo", Vec3::new(1.0, 2.0, 0.0), Vec3::ZERO));
        room
    }

    fn tile() -> RgbaImage {
        RgbaImage::from_pixel(4, 2, Rgba([40, 80, 120, 255]))
    }

    #[test]
    fn export_writes_both_artifacts() {
        let temp = TempDir::new().expect("temp");
        let exporter = TileExporter::new(temp.path().join("out"));
        assert!(!exporter.is_exported("Town"));

        exporter.export(&room("Town"), &tile()).expect("export");
        assert!(exporter.is_exported("Town"));

        let metadata = fs::read_to_string(exporter.metadata_path("Town")).expect("metadata");
        let parsed: Room = serde_json::from_str(&metadata).expect("parse");
        assert_eq!(parsed, room("Town"));
        let decoded = image::open(exporter.image_path("Town"))
            .expect("open png")
            .to_rgba8();
        assert_eq!(decoded, tile());
    }

    #[test]
    fn image_alone_does_not_count_as_exported() {
        let temp = TempDir::new().expect("temp");
        let exporter = TileExporter::new(temp.path());
        fs::write(exporter.image_path("Town"), b"png").expect("write png");
        assert!(!exporter.is_exported("Town"));
    }

    #[test]
    fn unsafe_room_ids_are_rejected_before_writing() {
        let temp = TempDir::new().expect("temp");
        let exporter = TileExporter::new(temp.path());
        let error = exporter
            .export(&room("../escape"), &tile())
            .expect_err("invalid id");
        assert!(matches!(error, ExportError::InvalidRoomId { .. }));
        assert_eq!(fs::read_dir(temp.path()).expect("read dir").count(), 0);
        assert!(!exporter.is_exported("../escape"));
    }

    #[test]
    fn export_data_sorts_rooms_and_writes_manifest() {
        let temp = TempDir::new().expect("temp");
        let exporter = TileExporter::new(temp.path());
        exporter.export(&room("Town"), &tile()).expect("export town");
        exporter
            .export(&room("Crossroads_01"), &tile())
            .expect("export crossroads");

        let summary = exporter.export_data().expect("export data");
        assert_eq!(summary.room_count, 2);

        let raw = fs::read_to_string(&summary.dataset_path).expect("dataset");
        let registry = RoomRegistry::try_from_json(&raw).expect("registry");
        assert_eq!(registry.ids(), ["Crossroads_01", "Town"]);

        let manifest = read_manifest(&summary.manifest_path).expect("manifest");
        assert_eq!(manifest.room_count, 2);
        assert_eq!(manifest.format_version, DATASET_FORMAT_VERSION);
        assert_eq!(manifest.dataset_sha256_hex, sha256_hex(raw.as_bytes()));
    }

    #[test]
    fn export_data_is_repeatable_and_ignores_its_own_output() {
        let temp = TempDir::new().expect("temp");
        let exporter = TileExporter::new(temp.path());
        exporter.export(&room("Town"), &tile()).expect("export");

        let first = exporter.export_data().expect("first");
        let second = exporter.export_data().expect("second");
        assert_eq!(second.room_count, 1);
        assert_eq!(first.dataset_sha256_hex, second.dataset_sha256_hex);
    }

    #[test]
    fn dataset_file_stems_cannot_be_room_ids() {
        let temp = TempDir::new().expect("temp");
        let exporter = TileExporter::new(temp.path());
        exporter.export(&room("Town"), &tile()).expect("export town");

        let error = exporter
            .export(&room("MapData"), &tile())
            .expect_err("reserved id");
        assert!(matches!(
            error,
            ExportError::InvalidRoomId {
                source: SceneIdError::Reserved { .. },
                ..
            }
        ));
        assert!(!exporter.image_path("MapData").exists());

        let summary = exporter.export_data().expect("export data");
        assert_eq!(summary.room_count, 1);
        assert!(!exporter.is_exported("MapData"));
        assert!(!exporter.is_exported("MapData.manifest"));
    }

    #[test]
    fn corrupt_metadata_reports_path() {
        let temp = TempDir::new().expect("temp");
        let exporter = TileExporter::new(temp.path());
        fs::write(exporter.metadata_path("Town"), r#"{"id": 3}"#).expect("write");
        let error = exporter.export_data().expect_err("corrupt");
        let ExportError::ParseMetadata { json_path, .. } = error else {
            panic!("expected parse error");
        };
        assert_eq!(json_path, "id");
    }

    #[test]
    fn missing_output_root_consolidates_to_empty_dataset() {
        let temp = TempDir::new().expect("temp");
        let root = temp.path().join("not_yet");
        let summary = TileExporter::new(&root).export_data().expect("export data");
        assert_eq!(summary.room_count, 0);
        assert!(summary.dataset_path.is_file());
    }
}
