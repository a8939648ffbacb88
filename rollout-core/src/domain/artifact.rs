//! Build artifacts
//!
//! An artifact is identified by its content address (the commit it was built
//! from). Two artifacts with the same id are interchangeable.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

const MAX_TAG_LEN: usize = 128;

/// Content address of a build output, usable as an image tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Validates `raw` as an image tag: `[A-Za-z0-9_.-]`, at most 128
    /// characters, not starting with `.` or `-`
    pub fn parse(raw: impl Into<String>) -> Result<Self, ConfigurationError> {
        let raw = raw.into();
        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        let valid_start = !raw.starts_with('.') && !raw.starts_with('-');

        if raw.is_empty() || raw.len() > MAX_TAG_LEN || !valid_chars || !valid_start {
            return Err(ConfigurationError::InvalidArtifactId(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = ConfigurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deployable build output in a specific repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub repository: String,
}

impl Artifact {
    pub fn new(id: ArtifactId, repository: impl Into<String>) -> Self {
        Self {
            id,
            repository: repository.into(),
        }
    }

    /// Full image reference, `repository:id`
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.id)
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.id)
    }
}
