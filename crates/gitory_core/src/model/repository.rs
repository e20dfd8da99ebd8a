//! Repository domain model.
//!
//! # Responsibility
//! - Define the canonical record for one hosted git repository.
//! - Validate identifiers before they reach storage or the filesystem.
//!
//! # Invariants
//! - `identifier` is immutable and safe to use as a single path segment.
//! - `path` and timestamps are assigned by the manager, never by callers.
//! - Two records are equal when their identifiers are equal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum accepted identifier length in characters.
pub const IDENTIFIER_MAX_LEN: usize = 100;

/// Suffix reserved for hosting lock files.
const RESERVED_LOCK_SUFFIX: &str = ".lock";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]*$").expect("valid identifier regex"));

/// Reason an identifier was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidIdentifierError {
    Empty,
    TooLong { len: usize, max: usize },
    InvalidCharacters(String),
    ReservedSuffix(String),
}

impl Display for InvalidIdentifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "repository identifier cannot be empty"),
            Self::TooLong { len, max } => write!(
                f,
                "repository identifier is {len} characters long; maximum is {max}"
            ),
            Self::InvalidCharacters(value) => write!(
                f,
                "repository identifier `{value}` must match [A-Za-z0-9._-] and not start with `.` or `-`"
            ),
            Self::ReservedSuffix(value) => write!(
                f,
                "repository identifier `{value}` must not end with `{RESERVED_LOCK_SUFFIX}`"
            ),
        }
    }
}

impl Error for InvalidIdentifierError {}

/// Validated repository identifier.
///
/// Doubles as the on-disk directory name below the hosting root, so the
/// accepted charset is deliberately narrow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryIdentifier(String);

impl RepositoryIdentifier {
    /// Parses and validates a raw identifier. Surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidIdentifierError::Empty);
        }

        let len = trimmed.chars().count();
        if len > IDENTIFIER_MAX_LEN {
            return Err(InvalidIdentifierError::TooLong {
                len,
                max: IDENTIFIER_MAX_LEN,
            });
        }

        if !IDENTIFIER_RE.is_match(trimmed) {
            return Err(InvalidIdentifierError::InvalidCharacters(
                trimmed.to_string(),
            ));
        }

        if trimmed.ends_with(RESERVED_LOCK_SUFFIX) {
            return Err(InvalidIdentifierError::ReservedSuffix(trimmed.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RepositoryIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepositoryIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepositoryIdentifier {
    type Error = InvalidIdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for RepositoryIdentifier {
    type Error = InvalidIdentifierError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RepositoryIdentifier> for String {
    fn from(value: RepositoryIdentifier) -> Self {
        value.0
    }
}

/// Canonical record for one hosted repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Stable lookup key and on-disk directory name.
    pub identifier: RepositoryIdentifier,
    /// Display name, mutable.
    pub name: String,
    /// Optional free-form description, mutable.
    pub description: Option<String>,
    /// Hosting location. `None` until the manager persists the record.
    pub path: Option<PathBuf>,
    /// Unix epoch milliseconds. `None` means the record was never persisted.
    pub created_at: Option<i64>,
    /// Unix epoch milliseconds of the last metadata change.
    pub updated_at: Option<i64>,
}

impl Repository {
    /// Creates a new, not yet persisted repository record.
    ///
    /// # Errors
    /// - Returns `InvalidIdentifierError` when `identifier` is not a safe
    ///   path segment.
    pub fn new(identifier: &str, name: impl Into<String>) -> Result<Self, InvalidIdentifierError> {
        Ok(Self::with_identifier(
            RepositoryIdentifier::parse(identifier)?,
            name,
        ))
    }

    /// Creates a new record from an already validated identifier.
    pub fn with_identifier(identifier: RepositoryIdentifier, name: impl Into<String>) -> Self {
        Self {
            identifier,
            name: name.into(),
            description: None,
            path: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Builder-style helper for the optional description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns whether this record has never been persisted.
    pub fn is_new(&self) -> bool {
        self.created_at.is_none()
    }
}

impl PartialEq for Repository {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Repository {}

impl Hash for Repository {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
///
/// Clamps to `0` when the clock reads earlier than the epoch.
pub(crate) fn current_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
