//! Pipeline names.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::IdError;

/// Name of a pipeline: a caller-chosen label rather than a generated ID.
///
/// Allowed characters are ASCII letters, digits, `-`, `_` and `.`, with at
/// most [`PipelineId::MAX_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipelineId(String);

impl PipelineId {
    /// Name used when a plan is scheduled without a pipeline.
    pub const DEFAULT: &'static str = "default";

    /// Maximum name length.
    pub const MAX_LEN: usize = 64;

    /// Validates and wraps a pipeline name.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let len = s.chars().count();
        if len > Self::MAX_LEN {
            return Err(IdError::TooLong {
                len,
                max: Self::MAX_LEN,
            });
        }

        if let Some(found) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(IdError::InvalidCharacter {
                name: s.to_string(),
                found,
            });
        }

        Ok(Self(s.to_string()))
    }

    /// The `"default"` pipeline.
    #[must_use]
    pub fn default_pipeline() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the `"default"` pipeline.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::default_pipeline()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PipelineId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PipelineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PipelineId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for PipelineId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PipelineId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
