//! Git hosting driver contracts.
//!
//! # Responsibility
//! - Define the only interface that touches the physical git backend.
//! - Report backend failures with semantic kinds (`AlreadyExists`,
//!   `NotFound`, `Locked`, `Timeout`) in addition to transport errors.
//!
//! # Invariants
//! - Drivers never read or write repository metadata.
//! - A repository location is a pure function of its identifier.
//! - `create` and `destroy` are all-or-nothing at the live location.

use crate::model::repository::RepositoryIdentifier;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod local;
mod lock;
pub mod timeout;

pub use local::LocalGitHosting;

pub type HostingResult<T> = Result<T, HostingError>;

/// Handle returned for a freshly provisioned repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub identifier: RepositoryIdentifier,
    pub path: PathBuf,
}

/// Read-only snapshot of a physical repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Local branch names, sorted.
    pub branches: Vec<String>,
    /// Tag names, sorted.
    pub tags: Vec<String>,
    /// Commit id HEAD resolves to; `None` while HEAD is unborn.
    pub head_commit: Option<String>,
    /// Sum of file sizes below the repository directory.
    pub size_bytes: u64,
}

/// Git hosting driver error.
#[derive(Debug)]
pub enum HostingError {
    /// Something already occupies the repository location.
    AlreadyExists(RepositoryIdentifier),
    /// No physical repository at the location.
    NotFound(RepositoryIdentifier),
    /// Another process holds the location lock.
    Locked(RepositoryIdentifier),
    /// The operation did not finish within the configured bound.
    Timeout {
        identifier: RepositoryIdentifier,
        operation: &'static str,
        timeout: Duration,
    },
    /// The worker running the operation failed before reporting a result.
    Worker {
        operation: &'static str,
        message: String,
    },
    Git {
        identifier: RepositoryIdentifier,
        source: git2::Error,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl HostingError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl Display for HostingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists(id) => {
                write!(f, "a physical repository already occupies `{id}`")
            }
            Self::NotFound(id) => write!(f, "physical repository not found: {id}"),
            Self::Locked(id) => write!(f, "repository location `{id}` is locked"),
            Self::Timeout {
                identifier,
                operation,
                timeout,
            } => write!(
                f,
                "hosting {operation} for `{identifier}` timed out after {}ms",
                timeout.as_millis()
            ),
            Self::Worker { operation, message } => {
                write!(f, "hosting {operation} worker failed: {message}")
            }
            Self::Git { identifier, source } => {
                write!(f, "git error on `{identifier}`: {source}")
            }
            Self::Io { path, source } => write!(f, "io error at `{}`: {source}", path.display()),
        }
    }
}

impl Error for HostingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Git { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Physical repository lifecycle driver.
pub trait GitHosting: Send + Sync {
    /// Location a repository with this identifier lives at.
    fn location(&self, id: &RepositoryIdentifier) -> PathBuf;
    /// Provisions a new bare repository.
    fn create(&self, id: &RepositoryIdentifier) -> HostingResult<RepositoryHandle>;
    /// Removes a physical repository.
    fn destroy(&self, id: &RepositoryIdentifier) -> HostingResult<()>;
    /// Reads branches, tags, HEAD and size.
    fn inspect(&self, id: &RepositoryIdentifier) -> HostingResult<RepositoryInfo>;
    /// Cheap existence probe.
    fn exists(&self, id: &RepositoryIdentifier) -> bool;
    /// Identifiers of every physical repository, sorted.
    fn list_identifiers(&self) -> HostingResult<Vec<RepositoryIdentifier>>;
}

impl<T: GitHosting + ?Sized> GitHosting for Arc<T> {
    fn location(&self, id: &RepositoryIdentifier) -> PathBuf {
        (**self).location(id)
    }

    fn create(&self, id: &RepositoryIdentifier) -> HostingResult<RepositoryHandle> {
        (**self).create(id)
    }

    fn destroy(&self, id: &RepositoryIdentifier) -> HostingResult<()> {
        (**self).destroy(id)
    }

    fn inspect(&self, id: &RepositoryIdentifier) -> HostingResult<RepositoryInfo> {
        (**self).inspect(id)
    }

    fn exists(&self, id: &RepositoryIdentifier) -> bool {
        (**self).exists(id)
    }

    fn list_identifiers(&self) -> HostingResult<Vec<RepositoryIdentifier>> {
        (**self).list_identifiers()
    }
}
