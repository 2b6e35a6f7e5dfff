use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::atomic_io::write_bytes_atomic;
use super::exporter::ExportError;

/// Sidecar describing a consolidated dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatasetManifestV1 {
    pub format_version: u32,
    pub tool_version: String,
    pub room_count: usize,
    pub dataset_sha256_hex: String,
}

pub(crate) fn write_manifest_atomic(
    path: &Path,
    manifest: &DatasetManifestV1,
) -> Result<(), ExportError> {
    let text = serde_json::to_string_pretty(manifest).map_err(|source| {
        ExportError::EncodeJson {
            path: path.to_path_buf(),
            source,
        }
    })?;
    write_bytes_atomic(path, text.as_bytes()).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// `None` when the manifest is missing or not valid JSON.
pub fn read_manifest(path: &Path) -> Option<DatasetManifestV1> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
