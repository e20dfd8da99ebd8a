//! Core domain logic for Gitory.
//! This crate keeps repository metadata and hosted git repositories in step.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod hosting;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use bootstrap::{open_manager, BootstrapError, LocalRepositoryManager};
pub use config::{ConfigError, CoreConfig};
pub use hosting::{
    GitHosting, HostingError, HostingResult, LocalGitHosting, RepositoryHandle, RepositoryInfo,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::repository::{InvalidIdentifierError, Repository, RepositoryIdentifier};
pub use repo::repository_repo::{RepositoryStore, SqliteRepositoryStore, StoreError, StoreResult};
pub use service::identifier_lock::IdentifierLocks;
pub use service::repository_manager::{
    InconsistencyKind, InconsistencyReport, ManagerError, ManagerResult, RepositoryManager,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
