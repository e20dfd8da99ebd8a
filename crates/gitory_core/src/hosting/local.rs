//! Local filesystem hosting backed by libgit2.
//!
//! # Responsibility
//! - Provision, inspect and remove bare repositories below one root.
//!
//! # Invariants
//! - Repository `<id>` lives at `<root>/<id>`.
//! - Entries starting with `.` are driver bookkeeping (locks, staging, trash)
//!   and are never reported as repositories.
//! - New repositories are initialized in a staging directory and renamed into
//!   place, so the live location either holds a full repository or nothing.

use super::lock::LocationLock;
use super::{GitHosting, HostingError, HostingResult, RepositoryHandle, RepositoryInfo};
use crate::model::repository::RepositoryIdentifier;
use git2::{BranchType, ErrorCode, Repository, RepositoryInitOptions};
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;
use walkdir::WalkDir;

/// Bare-repository hosting rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalGitHosting {
    root: PathBuf,
}

impl LocalGitHosting {
    /// Opens a hosting root, creating the directory when missing.
    pub fn open(root: impl Into<PathBuf>) -> HostingResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|err| HostingError::io(&root, err))?;
        info!(
            "event=hosting_open module=hosting status=ok root={}",
            root.display()
        );
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scratch_path(&self, id: &RepositoryIdentifier, purpose: &str) -> PathBuf {
        self.root
            .join(format!(".{id}.{}.{purpose}", Uuid::new_v4().simple()))
    }

    fn occupied(&self, path: &Path) -> HostingResult<bool> {
        match std::fs::symlink_metadata(path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(HostingError::io(path, err)),
        }
    }
}

impl GitHosting for LocalGitHosting {
    fn location(&self, id: &RepositoryIdentifier) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn create(&self, id: &RepositoryIdentifier) -> HostingResult<RepositoryHandle> {
        let started_at = Instant::now();
        let _lock = LocationLock::acquire(&self.root, id)?;

        let target = self.location(id);
        if self.occupied(&target)? {
            warn!(
                "event=hosting_create module=hosting status=error error_code=already_exists identifier={}",
                id
            );
            return Err(HostingError::AlreadyExists(id.clone()));
        }

        let staging = self.scratch_path(id, "staging");
        let provisioned = init_bare(id, &staging).and_then(|()| {
            std::fs::rename(&staging, &target).map_err(|err| HostingError::io(&target, err))
        });

        if let Err(err) = provisioned {
            if let Err(cleanup_err) = remove_if_present(&staging) {
                warn!(
                    "event=hosting_create module=hosting status=error error_code=staging_cleanup_failed path={} error={}",
                    staging.display(),
                    cleanup_err
                );
            }
            warn!(
                "event=hosting_create module=hosting status=error identifier={} duration_ms={} error={}",
                id,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        info!(
            "event=hosting_create module=hosting status=ok identifier={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );
        Ok(RepositoryHandle {
            identifier: id.clone(),
            path: target,
        })
    }

    fn destroy(&self, id: &RepositoryIdentifier) -> HostingResult<()> {
        let started_at = Instant::now();
        let _lock = LocationLock::acquire(&self.root, id)?;

        if !self.exists(id) {
            return Err(HostingError::NotFound(id.clone()));
        }

        let target = self.location(id);
        let trash = self.scratch_path(id, "trash");
        std::fs::rename(&target, &trash).map_err(|err| HostingError::io(&target, err))?;

        // The live location is already free; a leftover trash directory is
        // bookkeeping only.
        if let Err(err) = std::fs::remove_dir_all(&trash) {
            warn!(
                "event=hosting_destroy module=hosting status=degraded error_code=trash_cleanup_failed path={} error={}",
                trash.display(),
                err
            );
        }

        info!(
            "event=hosting_destroy module=hosting status=ok identifier={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn inspect(&self, id: &RepositoryIdentifier) -> HostingResult<RepositoryInfo> {
        if !self.exists(id) {
            return Err(HostingError::NotFound(id.clone()));
        }

        let path = self.location(id);
        let git_err = |source: git2::Error| HostingError::Git {
            identifier: id.clone(),
            source,
        };
        let repo = Repository::open_bare(&path).map_err(git_err)?;

        let mut branches = Vec::new();
        for branch in repo.branches(Some(BranchType::Local)).map_err(git_err)? {
            let (branch, _) = branch.map_err(git_err)?;
            if let Some(name) = branch.name().map_err(git_err)? {
                branches.push(name.to_string());
            }
        }
        branches.sort();

        let mut tags: Vec<String> = repo
            .tag_names(None)
            .map_err(git_err)?
            .iter()
            .flatten()
            .map(str::to_string)
            .collect();
        tags.sort();

        let head_commit = match repo.head() {
            Ok(head) => Some(head.peel_to_commit().map_err(git_err)?.id().to_string()),
            Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                None
            }
            Err(err) => return Err(git_err(err)),
        };

        let size_bytes = directory_size(&path)?;
        debug!(
            "event=hosting_inspect module=hosting status=ok identifier={} branches={} tags={}",
            id,
            branches.len(),
            tags.len()
        );

        Ok(RepositoryInfo {
            branches,
            tags,
            head_commit,
            size_bytes,
        })
    }

    fn exists(&self, id: &RepositoryIdentifier) -> bool {
        self.location(id).join("HEAD").is_file()
    }

    fn list_identifiers(&self) -> HostingResult<Vec<RepositoryIdentifier>> {
        let entries =
            std::fs::read_dir(&self.root).map_err(|err| HostingError::io(&self.root, err))?;

        let mut identifiers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| HostingError::io(&self.root, err))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Ok(id) = RepositoryIdentifier::parse(name) else {
                debug!(
                    "event=hosting_list module=hosting status=skip reason=invalid_identifier name={}",
                    name
                );
                continue;
            };
            if self.exists(&id) {
                identifiers.push(id);
            }
        }

        identifiers.sort();
        Ok(identifiers)
    }
}

fn init_bare(id: &RepositoryIdentifier, path: &Path) -> HostingResult<()> {
    let mut opts = RepositoryInitOptions::new();
    opts.bare(true).no_reinit(true).mkdir(true).mkpath(false);
    Repository::init_opts(path, &opts)
        .map(|_| ())
        .map_err(|source| HostingError::Git {
            identifier: id.clone(),
            source,
        })
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn directory_size(path: &Path) -> HostingResult<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|err| {
            let at = err.path().unwrap_or(path).to_path_buf();
            HostingError::io(at, err.into())
        })?;
        if entry.file_type().is_file() {
            let metadata = entry
                .metadata()
                .map_err(|err| HostingError::io(entry.path(), err.into()))?;
            total += metadata.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::LocalGitHosting;
    use crate::hosting::lock::LocationLock;
    use crate::hosting::{GitHosting, HostingError};
    use crate::model::repository::RepositoryIdentifier;

    #[test]
    fn create_and_destroy_fail_while_location_lock_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let hosting = LocalGitHosting::open(dir.path().join("repos")).unwrap();
        let id = RepositoryIdentifier::parse("proj-a").unwrap();
        hosting.create(&id).unwrap();

        let held = LocationLock::acquire(hosting.root(), &id).unwrap();
        let other = RepositoryIdentifier::parse("proj-b").unwrap();
        let _held_other = LocationLock::acquire(hosting.root(), &other).unwrap();

        assert!(matches!(hosting.destroy(&id), Err(HostingError::Locked(_))));
        assert!(hosting.exists(&id), "locked repository must stay in place");
        assert!(matches!(hosting.create(&other), Err(HostingError::Locked(_))));
        assert!(!hosting.location(&other).exists());

        drop(held);
        hosting.destroy(&id).expect("lock released");
    }
}
