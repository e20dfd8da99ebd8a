//! Repository lifecycle orchestration.
//!
//! # Responsibility
//! - Present one consistent lifecycle API over the metadata store and the
//!   git hosting driver.
//! - Sequence the two backends and compensate when a later step fails.
//!
//! # Invariants
//! - Identifiers are validated before any store or hosting call.
//! - `save` of a new record inserts metadata before provisioning; a failed
//!   provisioning removes the inserted record again.
//! - `delete` removes the physical repository before the metadata record.
//! - Lifecycle operations on one identifier never overlap in this process.
//! - No operation is retried automatically.

use crate::hosting::timeout::run_with_timeout;
use crate::hosting::{GitHosting, HostingError, HostingResult, RepositoryInfo};
use crate::model::repository::{
    current_epoch_ms, InvalidIdentifierError, Repository, RepositoryIdentifier,
};
use crate::repo::repository_repo::{RepositoryStore, StoreError};
use crate::service::identifier_lock::IdentifierLocks;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Error surfaced to API callers.
#[derive(Debug)]
pub enum ManagerError {
    /// Caller supplied an unusable identifier; nothing was attempted.
    InvalidIdentifier(InvalidIdentifierError),
    /// Identifier already taken; nothing was provisioned.
    DuplicateIdentifier(RepositoryIdentifier),
    /// Operation target does not exist.
    NotFound(RepositoryIdentifier),
    /// Provisioning failed and the metadata insert was rolled back.
    ///
    /// A `HostingError::AlreadyExists` source means the physical location was
    /// occupied without a metadata record (split-brain); the occupant is left
    /// untouched.
    HostingProvisioning {
        identifier: RepositoryIdentifier,
        source: HostingError,
    },
    /// Provisioning failed and rolling back the metadata insert failed too.
    /// The record for `identifier` is orphaned until an operator intervenes.
    InconsistentState {
        identifier: RepositoryIdentifier,
        hosting: HostingError,
        compensation: StoreError,
    },
    Store(StoreError),
    Hosting(HostingError),
}

impl ManagerError {
    /// Returns whether provisioning found the location already occupied.
    pub fn is_split_brain(&self) -> bool {
        matches!(
            self,
            Self::HostingProvisioning {
                source: HostingError::AlreadyExists(_),
                ..
            }
        )
    }
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(err) => write!(f, "{err}"),
            Self::DuplicateIdentifier(id) => {
                write!(f, "a repository with identifier `{id}` already exists")
            }
            Self::NotFound(id) => write!(f, "repository not found: {id}"),
            Self::HostingProvisioning { identifier, source } => write!(
                f,
                "failed to provision repository `{identifier}`: {source}"
            ),
            Self::InconsistentState {
                identifier,
                hosting,
                compensation,
            } => write!(
                f,
                "repository `{identifier}` is orphaned in metadata: provisioning failed ({hosting}) and rollback failed ({compensation})"
            ),
            Self::Store(err) => write!(f, "{err}"),
            Self::Hosting(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidIdentifier(err) => Some(err),
            Self::HostingProvisioning { source, .. } => Some(source),
            Self::InconsistentState { compensation, .. } => Some(compensation),
            Self::Store(err) => Some(err),
            Self::Hosting(err) => Some(err),
            Self::DuplicateIdentifier(_) | Self::NotFound(_) => None,
        }
    }
}

impl From<InvalidIdentifierError> for ManagerError {
    fn from(value: InvalidIdentifierError) -> Self {
        Self::InvalidIdentifier(value)
    }
}

impl From<StoreError> for ManagerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateIdentifier(id) => Self::DuplicateIdentifier(id),
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl From<HostingError> for ManagerError {
    fn from(value: HostingError) -> Self {
        match value {
            HostingError::NotFound(id) => Self::NotFound(id),
            other => Self::Hosting(other),
        }
    }
}

/// Direction of a metadata/physical mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InconsistencyKind {
    /// Metadata record without a physical repository.
    OrphanMetadata,
    /// Physical repository without a metadata record.
    OrphanRepository,
}

/// One mismatch found by `reconcile`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct InconsistencyReport {
    pub identifier: RepositoryIdentifier,
    pub kind: InconsistencyKind,
}

/// Coordinates the metadata store and the hosting driver.
pub struct RepositoryManager<S: RepositoryStore, H: GitHosting> {
    store: S,
    hosting: Arc<H>,
    locks: IdentifierLocks,
    hosting_timeout: Option<Duration>,
}

impl<S, H> RepositoryManager<S, H>
where
    S: RepositoryStore,
    H: GitHosting + 'static,
{
    /// Creates a manager over explicit collaborators. Hosting calls are
    /// unbounded until `with_hosting_timeout` is applied.
    pub fn new(store: S, hosting: H) -> Self {
        Self {
            store,
            hosting: Arc::new(hosting),
            locks: IdentifierLocks::new(),
            hosting_timeout: None,
        }
    }

    /// Bounds every hosting call by `timeout`; `None` disables the bound.
    pub fn with_hosting_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.hosting_timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hosting(&self) -> &H {
        &self.hosting
    }

    /// Lists all records ordered by identifier. Hosting state is not probed.
    pub fn find_all(&self) -> ManagerResult<Vec<Repository>> {
        Ok(self.store.find_all()?)
    }

    /// Looks up one record.
    pub fn find_by_identifier(&self, identifier: &str) -> ManagerResult<Repository> {
        let id = RepositoryIdentifier::parse(identifier)?;
        Ok(self.store.find_by_identifier(&id)?)
    }

    /// Reads branch/tag/HEAD details of the physical repository.
    pub fn inspect(&self, identifier: &str) -> ManagerResult<RepositoryInfo> {
        let id = RepositoryIdentifier::parse(identifier)?;
        Ok(self.run_hosting("inspect", &id, |hosting, id| hosting.inspect(id))?)
    }

    /// Persists a record.
    ///
    /// A record that has never been persisted (`created_at` unset) is
    /// inserted and provisioned; any other record gets a metadata-only update
    /// of `name` and `description`.
    ///
    /// # Errors
    /// - `DuplicateIdentifier` when a new record reuses a taken identifier.
    /// - `NotFound` when updating a record that no longer exists.
    /// - `HostingProvisioning` when provisioning failed and was rolled back;
    ///   `is_split_brain` tells an occupied location apart.
    /// - `InconsistentState` when the rollback failed as well.
    pub fn save(&self, repository: &Repository) -> ManagerResult<Repository> {
        let id = repository.identifier.clone();
        let _guard = self.locks.lock(&id);

        if repository.is_new() {
            self.create(repository)
        } else {
            self.update(repository)
        }
    }

    /// Removes the physical repository, then the metadata record.
    ///
    /// A physically absent repository is tolerated and its record is removed;
    /// a missing record after a successful physical removal is treated as
    /// complete.
    ///
    /// # Errors
    /// - `NotFound` when neither side knows the identifier.
    /// - `Hosting` when physical removal failed; metadata is left untouched.
    pub fn delete(&self, identifier: &str) -> ManagerResult<()> {
        let id = RepositoryIdentifier::parse(identifier)?;
        let _guard = self.locks.lock(&id);
        let started_at = Instant::now();

        let physically_removed = match self.run_hosting("destroy", &id, |hosting, id| {
            hosting.destroy(id)
        }) {
            Ok(()) => true,
            Err(HostingError::NotFound(_)) => {
                warn!(
                    "event=repository_delete module=service status=degraded reason=physical_missing identifier={}",
                    id
                );
                false
            }
            Err(err) => {
                error!(
                    "event=repository_delete module=service status=error step=destroy identifier={} error={}",
                    id, err
                );
                return Err(ManagerError::Hosting(err));
            }
        };

        match self.store.delete(&id) {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) if physically_removed => {
                warn!(
                    "event=repository_delete module=service status=degraded reason=metadata_missing identifier={}",
                    id
                );
            }
            Err(StoreError::NotFound(_)) => return Err(ManagerError::NotFound(id)),
            Err(err) => {
                error!(
                    "event=repository_delete module=service status=error step=metadata identifier={} physically_removed={} error={}",
                    id, physically_removed, err
                );
                return Err(ManagerError::Store(err));
            }
        }

        info!(
            "event=repository_delete module=service status=ok identifier={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Compares metadata and physical state without mutating either.
    ///
    /// The store and the hosting root are read at different instants, so each
    /// candidate mismatch is confirmed again while holding its identifier
    /// lock. A lifecycle operation that completes in between is never
    /// reported.
    pub fn reconcile(&self) -> ManagerResult<Vec<InconsistencyReport>> {
        let recorded: BTreeSet<RepositoryIdentifier> = self
            .store
            .find_all()?
            .into_iter()
            .map(|record| record.identifier)
            .collect();
        let physical: BTreeSet<RepositoryIdentifier> =
            self.hosting.list_identifiers()?.into_iter().collect();

        let mut candidates: Vec<&RepositoryIdentifier> = recorded
            .iter()
            .filter(|id| !physical.contains(*id))
            .collect();
        candidates.extend(physical.difference(&recorded));

        let mut reports = Vec::new();
        for id in candidates {
            if let Some(kind) = self.confirm_mismatch(id)? {
                reports.push(InconsistencyReport {
                    identifier: id.clone(),
                    kind,
                });
            }
        }

        reports.sort();
        if reports.is_empty() {
            info!("event=reconcile module=service status=ok inconsistencies=0");
        } else {
            warn!(
                "event=reconcile module=service status=inconsistent inconsistencies={}",
                reports.len()
            );
        }
        Ok(reports)
    }

    fn create(&self, repository: &Repository) -> ManagerResult<Repository> {
        let started_at = Instant::now();
        let id = &repository.identifier;
        let now = current_epoch_ms();

        let mut record = repository.clone();
        record.path = Some(self.hosting.location(id));
        record.created_at = Some(now);
        record.updated_at = Some(now);

        let stored = self.store.insert(&record)?;

        match self.run_hosting("create", id, |hosting, id| hosting.create(id)) {
            Ok(handle) => {
                info!(
                    "event=repository_create module=service status=ok identifier={} path={} duration_ms={}",
                    id,
                    handle.path.display(),
                    started_at.elapsed().as_millis()
                );
                Ok(stored)
            }
            Err(err) => Err(self.compensate_insert(id, err)),
        }
    }

    fn update(&self, repository: &Repository) -> ManagerResult<Repository> {
        let mut record = repository.clone();
        record.updated_at = Some(current_epoch_ms());

        let stored = self.store.update(&record)?;
        info!(
            "event=repository_update module=service status=ok identifier={}",
            stored.identifier
        );
        Ok(stored)
    }

    fn compensate_insert(&self, id: &RepositoryIdentifier, cause: HostingError) -> ManagerError {
        if matches!(cause, HostingError::Timeout { .. }) {
            warn!(
                "event=repository_create module=service status=error reason=timeout identifier={} note=physical_state_unknown",
                id
            );
        }

        match self.store.delete(id) {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                warn!(
                    "event=repository_create module=service status=compensated identifier={} error={}",
                    id, cause
                );
                ManagerError::HostingProvisioning {
                    identifier: id.clone(),
                    source: cause,
                }
            }
            Err(compensation) => {
                error!(
                    "event=repository_create module=service status=inconsistent identifier={} hosting_error={} compensation_error={}",
                    id, cause, compensation
                );
                ManagerError::InconsistentState {
                    identifier: id.clone(),
                    hosting: cause,
                    compensation,
                }
            }
        }
    }

    fn confirm_mismatch(
        &self,
        id: &RepositoryIdentifier,
    ) -> ManagerResult<Option<InconsistencyKind>> {
        let _guard = self.locks.lock(id);

        let has_record = match self.store.find_by_identifier(id) {
            Ok(_) => true,
            Err(StoreError::NotFound(_)) => false,
            Err(err) => return Err(ManagerError::Store(err)),
        };
        let has_repository = self.hosting.exists(id);

        let kind = match (has_record, has_repository) {
            (true, false) => Some(InconsistencyKind::OrphanMetadata),
            (false, true) => Some(InconsistencyKind::OrphanRepository),
            _ => {
                debug!(
                    "event=reconcile module=service status=skip reason=settled identifier={}",
                    id
                );
                None
            }
        };
        Ok(kind)
    }

    fn run_hosting<T, F>(
        &self,
        operation: &'static str,
        id: &RepositoryIdentifier,
        call: F,
    ) -> HostingResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&H, &RepositoryIdentifier) -> HostingResult<T> + Send + 'static,
    {
        let hosting = Arc::clone(&self.hosting);
        let owned_id = id.clone();
        run_with_timeout(id, operation, self.hosting_timeout, move || {
            call(&*hosting, &owned_id)
        })
    }
}
