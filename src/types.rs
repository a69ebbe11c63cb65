//! Shared types for l10n-tracker

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("value cannot be empty")]
    Empty,
    #[error("invalid character in value: {0:?}")]
    InvalidCharacter(char),
    #[error("value cannot start with '{0}'")]
    InvalidStart(char),
    #[error("value cannot contain '..'")]
    RangeSyntax,
}

/// A commit identifier as printed by `git log --format=%H`.
///
/// Validation rules:
/// - Non-empty
/// - No whitespace or control characters
/// - Cannot start with a hyphen (would be read as a flag)
/// - Cannot contain `..` (would be read as a revision range)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitId(String);

impl CommitId {
    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CommitId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        if s.starts_with('-') {
            return Err(ParseError::InvalidStart('-'));
        }

        if s.contains("..") {
            return Err(ParseError::RangeSyntax);
        }

        for c in s.chars() {
            if c.is_whitespace() || c.is_control() {
                return Err(ParseError::InvalidCharacter(c));
            }
        }

        Ok(CommitId(s.to_string()))
    }
}

impl TryFrom<String> for CommitId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommitId> for String {
    fn from(id: CommitId) -> Self {
        id.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One commit as reported by the repository backend.
///
/// Records are compared by identifier only: two records for the same commit
/// are equal even if one was produced with a different timestamp format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: CommitId,
    /// ISO-8601 timestamp exactly as git printed it, offset included.
    pub timestamp: String,
    pub subject: String,
}

impl CommitRecord {
    pub fn new(id: CommitId, timestamp: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id,
            timestamp: timestamp.into(),
            subject: subject.into(),
        }
    }
}

impl PartialEq for CommitRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CommitRecord {}

impl fmt::Display for CommitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.id.as_str().get(..12).unwrap_or(self.id.as_str());
        write!(f, "{} {}", short, self.subject)
    }
}
