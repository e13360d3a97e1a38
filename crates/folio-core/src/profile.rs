//! Profile data merged into the system prompt

use std::path::{Path, PathBuf};

use serde_json::Value;

const EMBEDDED_PROFILE: &str = include_str!("../data/profile.json");

/// Failure loading profile data
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profile at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("profile is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("profile must be a JSON object")]
    NotAnObject,
}

/// Portfolio owner's profile, always a JSON object
#[derive(Debug, Clone, PartialEq)]
pub struct Profile(Value);

impl Profile {
    /// The profile compiled into the binary
    pub fn embedded() -> Result<Self, ProfileError> {
        Self::parse(EMBEDDED_PROFILE)
    }

    /// Read a profile override from disk
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(json: &str) -> Result<Self, ProfileError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self, ProfileError> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err(ProfileError::NotAnObject)
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Owner name from `basic.name`, if present
    pub fn name(&self) -> Option<&str> {
        self.0.get("basic")?.get("name")?.as_str()
    }
}
