//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID has a prefix belonging to another ID type.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing the underscore separator.
    #[error("ID missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// A pipeline name exceeds the length limit.
    #[error("name too long: {len} characters (max {max})")]
    TooLong { len: usize, max: usize },

    /// A pipeline name contains a character outside the allowed set.
    #[error("invalid character {found:?} in name '{name}'")]
    InvalidCharacter { name: String, found: char },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error came from validating a pipeline name.
    pub fn is_name_error(&self) -> bool {
        matches!(
            self,
            IdError::TooLong { .. } | IdError::InvalidCharacter { .. }
        )
    }
}
