//! Explicit wiring of concrete collaborators from a `CoreConfig`.

use crate::config::{ConfigError, CoreConfig};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::hosting::{HostingError, LocalGitHosting};
use crate::repo::repository_repo::SqliteRepositoryStore;
use crate::service::repository_manager::RepositoryManager;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Manager over the SQLite store and local git hosting.
pub type LocalRepositoryManager = RepositoryManager<SqliteRepositoryStore, LocalGitHosting>;

/// Startup failure while wiring the manager.
#[derive(Debug)]
pub enum BootstrapError {
    Config(ConfigError),
    Db(DbError),
    Hosting(HostingError),
}

impl Display for BootstrapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "failed to open metadata store: {err}"),
            Self::Hosting(err) => write!(f, "failed to open hosting root: {err}"),
        }
    }
}

impl Error for BootstrapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Hosting(err) => Some(err),
        }
    }
}

impl From<ConfigError> for BootstrapError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for BootstrapError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<HostingError> for BootstrapError {
    fn from(value: HostingError) -> Self {
        Self::Hosting(value)
    }
}

/// Opens the metadata store and hosting root named by `config` and wires a
/// manager over them.
pub fn open_manager(config: &CoreConfig) -> Result<LocalRepositoryManager, BootstrapError> {
    config.validate()?;

    let conn = if config.is_in_memory() {
        open_db_in_memory()?
    } else {
        open_db(&config.storage_location)?
    };
    let store = SqliteRepositoryStore::new(conn);
    let hosting = LocalGitHosting::open(&config.hosting_root_path)?;

    info!(
        "event=core_wiring module=bootstrap status=ok storage={} hosting_root={} hosting_timeout_ms={}",
        config.storage_location.display(),
        config.hosting_root_path.display(),
        config.hosting_timeout_ms.unwrap_or(0)
    );
    Ok(RepositoryManager::new(store, hosting).with_hosting_timeout(config.hosting_timeout()))
}
