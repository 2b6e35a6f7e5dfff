use thiserror::Error;

/// Suffix marking a companion scene loaded additively alongside its base scene.
pub const COMPANION_SUFFIX: &str = "_boss";

/// File stems of the consolidated dataset and its manifest.
pub const RESERVED_SCENE_IDS: &[&str] = &["MapData", "MapData.manifest"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneIdError {
    #[error("scene id must not be empty")]
    Empty,
    #[error("scene id must not contain '..'")]
    ParentTraversal,
    #[error("scene id contains invalid character '{character}'")]
    InvalidCharacter { character: char },
    #[error("scene id '{id}' collides with a dataset file name")]
    Reserved { id: String },
}

/// Scene ids double as artifact file stems, so they are restricted to a safe charset.
pub fn validate_scene_id(id: &str) -> Result<(), SceneIdError> {
    if id.is_empty() {
        return Err(SceneIdError::Empty);
    }
    if id.contains("..") {
        return Err(SceneIdError::ParentTraversal);
    }
    for ch in id.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
            continue;
        }
        return Err(SceneIdError::InvalidCharacter { character: ch });
    }
    if RESERVED_SCENE_IDS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(id))
    {
        return Err(SceneIdError::Reserved { id: id.to_string() });
    }
    Ok(())
}

pub fn companion_scene_id(base: &str) -> String {
    format!("{base}{COMPANION_SUFFIX}")
}

/// Base id for a companion scene, or `None` when `id` is not a companion.
pub fn companion_base(id: &str) -> Option<&str> {
    id.strip_suffix(COMPANION_SUFFIX)
        .filter(|base| !base.is_empty())
}
