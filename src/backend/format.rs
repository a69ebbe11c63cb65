//! The per-line commit format shared by every history query.

use super::BackendError;
use crate::types::{CommitId, CommitRecord};

/// `git log --format` string producing `<id> <ISO-8601 timestamp> <subject>`.
pub const COMMIT_FORMAT: &str = "--format=%H %cI %s";

/// Parse one `<id> <timestamp> <subject>` line.
///
/// The subject is the remainder of the line and may contain spaces or be
/// empty. A line without two separating spaces is a contract violation.
pub fn parse_commit_line(operation: &'static str, line: &str) -> Result<CommitRecord, BackendError> {
    let malformed = || BackendError::Parse {
        operation,
        line: line.to_string(),
    };

    let mut parts = line.splitn(3, ' ');
    let (Some(id), Some(timestamp), Some(subject)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    if timestamp.is_empty() {
        return Err(malformed());
    }

    let id: CommitId = id.parse().map_err(|_| malformed())?;
    Ok(CommitRecord::new(id, timestamp, subject))
}

/// Parse every non-empty line of `stdout`.
pub fn parse_commit_lines(
    operation: &'static str,
    stdout: &str,
) -> Result<Vec<CommitRecord>, BackendError> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| parse_commit_line(operation, line))
        .collect()
}
