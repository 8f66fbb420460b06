//! Shared primitives for all Rust crates in dmart.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across dmart crates.
pub type AppResult<T> = Result<T, AppError>;

/// Characters reserved by permission keys and query-policy tokens.
const RESERVED_SHORTNAME_CHARACTERS: &[char] = &[':', '|', '/', '*'];

/// A validated entity shortname.
///
/// Shortnames are embedded verbatim in permission keys and query-policy
/// tokens, so they may not contain any of the token delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Shortname(String);

impl Shortname {
    /// Creates a validated shortname.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "shortname must not be empty or whitespace".to_owned(),
            ));
        }

        if let Some(reserved) = value
            .chars()
            .find(|character| RESERVED_SHORTNAME_CHARACTERS.contains(character))
        {
            return Err(AppError::Validation(format!(
                "shortname '{value}' must not contain '{reserved}'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Shortname {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Shortname> for String {
    fn from(value: Shortname) -> Self {
        value.0
    }
}

impl AsRef<str> for Shortname {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Display for Shortname {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Principal is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A management entry could not be decoded while rebuilding the
    /// permission snapshot. The previous snapshot stays in place.
    #[error("snapshot load failed: {0}")]
    SnapshotLoad(String),

    /// A storage collaborator could not be reached.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
