mod atomic_io;
mod exporter;
mod hashing;
mod manifest;

pub use exporter::{
    DatasetSummary, ExportError, TileExporter, DATASET_FILE_NAME, DATASET_MANIFEST_FILE_NAME,
    IMAGE_EXTENSION, METADATA_EXTENSION,
};
pub use manifest::{read_manifest, DatasetManifestV1};
