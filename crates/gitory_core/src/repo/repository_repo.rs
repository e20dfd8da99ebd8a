//! Repository metadata store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the canonical `repositories` table.
//! - Own the identifier uniqueness guarantee through the primary key.
//!
//! # Invariants
//! - `identifier`, `path` and `created_at` are never rewritten by `update`.
//! - Concurrent inserts of one identifier yield exactly one success.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::repository::{current_epoch_ms, Repository, RepositoryIdentifier};
use log::{debug, warn};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

const REPOSITORY_SELECT_SQL: &str = "SELECT
    identifier,
    name,
    description,
    path,
    created_at,
    updated_at
FROM repositories";

pub type StoreResult<T> = Result<T, StoreError>;

/// Metadata store error.
#[derive(Debug)]
pub enum StoreError {
    /// A record with the same identifier already exists.
    DuplicateIdentifier(RepositoryIdentifier),
    /// No record with this identifier exists.
    NotFound(RepositoryIdentifier),
    /// Storage transport failure.
    Db(DbError),
    /// Persisted or submitted data violates record invariants.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateIdentifier(id) => {
                write!(f, "repository identifier already exists: {id}")
            }
            Self::NotFound(id) => write!(f, "repository not found: {id}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid repository data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract for repository metadata.
pub trait RepositoryStore: Send + Sync {
    /// Returns every record ordered by identifier.
    fn find_all(&self) -> StoreResult<Vec<Repository>>;
    /// Point lookup; `NotFound` when absent.
    fn find_by_identifier(&self, id: &RepositoryIdentifier) -> StoreResult<Repository>;
    /// Persists a new record; `DuplicateIdentifier` when the identifier is taken.
    fn insert(&self, repository: &Repository) -> StoreResult<Repository>;
    /// Rewrites mutable fields; `NotFound` when absent.
    fn update(&self, repository: &Repository) -> StoreResult<Repository>;
    /// Removes one record; `NotFound` when absent.
    fn delete(&self, id: &RepositoryIdentifier) -> StoreResult<()>;
}

impl<T: RepositoryStore + ?Sized> RepositoryStore for Arc<T> {
    fn find_all(&self) -> StoreResult<Vec<Repository>> {
        (**self).find_all()
    }

    fn find_by_identifier(&self, id: &RepositoryIdentifier) -> StoreResult<Repository> {
        (**self).find_by_identifier(id)
    }

    fn insert(&self, repository: &Repository) -> StoreResult<Repository> {
        (**self).insert(repository)
    }

    fn update(&self, repository: &Repository) -> StoreResult<Repository> {
        (**self).update(repository)
    }

    fn delete(&self, id: &RepositoryIdentifier) -> StoreResult<()> {
        (**self).delete(id)
    }
}

/// SQLite-backed metadata store.
///
/// Owns a single migrated connection; access is serialized through a mutex so
/// the store can be shared between request workers.
pub struct SqliteRepositoryStore {
    conn: Mutex<Connection>,
}

impl SqliteRepositoryStore {
    /// Wraps a connection returned by `db::open_db` / `db::open_db_in_memory`.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the guard cannot leave a SQLite statement
        // half-applied, so the poisoned connection is still usable.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RepositoryStore for SqliteRepositoryStore {
    fn find_all(&self) -> StoreResult<Vec<Repository>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{REPOSITORY_SELECT_SQL} ORDER BY identifier ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut repositories = Vec::new();
        while let Some(row) = rows.next()? {
            repositories.push(parse_repository_row(row)?);
        }
        Ok(repositories)
    }

    fn find_by_identifier(&self, id: &RepositoryIdentifier) -> StoreResult<Repository> {
        let conn = self.conn();
        fetch_repository(&conn, id)?.ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn insert(&self, repository: &Repository) -> StoreResult<Repository> {
        let path = path_to_db(repository)?;
        let created_at = repository.created_at.unwrap_or_else(current_epoch_ms);
        let updated_at = repository.updated_at.unwrap_or(created_at).max(created_at);

        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO repositories (
                identifier,
                name,
                description,
                path,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                repository.identifier.as_str(),
                repository.name.as_str(),
                repository.description.as_deref(),
                path,
                created_at,
                updated_at,
            ],
        );

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                debug!(
                    "event=store_insert module=repo status=duplicate identifier={}",
                    repository.identifier
                );
                return Err(StoreError::DuplicateIdentifier(
                    repository.identifier.clone(),
                ));
            }
            Err(err) => return Err(err.into()),
        }

        fetch_repository(&conn, &repository.identifier)?.ok_or_else(|| {
            StoreError::InvalidData(format!(
                "inserted repository `{}` missing in read-back",
                repository.identifier
            ))
        })
    }

    fn update(&self, repository: &Repository) -> StoreResult<Repository> {
        let updated_at = repository.updated_at.unwrap_or_else(current_epoch_ms);

        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE repositories
             SET
                name = ?2,
                description = ?3,
                updated_at = MAX(?4, created_at)
             WHERE identifier = ?1;",
            params![
                repository.identifier.as_str(),
                repository.name.as_str(),
                repository.description.as_deref(),
                updated_at,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(repository.identifier.clone()));
        }

        fetch_repository(&conn, &repository.identifier)?
            .ok_or_else(|| StoreError::NotFound(repository.identifier.clone()))
    }

    fn delete(&self, id: &RepositoryIdentifier) -> StoreResult<()> {
        let changed = self.conn().execute(
            "DELETE FROM repositories WHERE identifier = ?1;",
            [id.as_str()],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }

        Ok(())
    }
}

fn fetch_repository(
    conn: &Connection,
    id: &RepositoryIdentifier,
) -> StoreResult<Option<Repository>> {
    let mut stmt = conn.prepare(&format!(
        "{REPOSITORY_SELECT_SQL} WHERE identifier = ?1;"
    ))?;
    let row = stmt
        .query_row([id.as_str()], |row| Ok(parse_repository_row(row)))
        .optional()?;
    row.transpose()
}

fn parse_repository_row(row: &Row<'_>) -> StoreResult<Repository> {
    let identifier_text: String = row.get("identifier")?;
    let identifier = RepositoryIdentifier::parse(&identifier_text).map_err(|err| {
        warn!(
            "event=store_read module=repo status=error error_code=invalid_identifier error={}",
            err
        );
        StoreError::InvalidData(format!(
            "invalid identifier `{identifier_text}` in repositories.identifier: {err}"
        ))
    })?;

    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;
    if updated_at < created_at {
        return Err(StoreError::InvalidData(format!(
            "repositories.updated_at precedes created_at for `{identifier}`"
        )));
    }

    Ok(Repository {
        identifier,
        name: row.get("name")?,
        description: row.get("description")?,
        path: Some(PathBuf::from(row.get::<_, String>("path")?)),
        created_at: Some(created_at),
        updated_at: Some(updated_at),
    })
}

fn path_to_db(repository: &Repository) -> StoreResult<&str> {
    let path = repository.path.as_ref().ok_or_else(|| {
        StoreError::InvalidData(format!(
            "repository `{}` has no hosting path assigned",
            repository.identifier
        ))
    })?;
    path.to_str().ok_or_else(|| {
        StoreError::InvalidData(format!(
            "hosting path `{}` is not valid UTF-8",
            path.display()
        ))
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => {
            failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{RepositoryStore, SqliteRepositoryStore, StoreError};
    use crate::db::open_db_in_memory;
    use crate::model::repository::Repository;

    fn store() -> SqliteRepositoryStore {
        SqliteRepositoryStore::new(open_db_in_memory().expect("in-memory db should open"))
    }

    #[test]
    fn insert_without_path_is_rejected() {
        let store = store();
        let repo = Repository::new("proj-a", "Proj A").unwrap();

        let err = store.insert(&repo).expect_err("path is required");
        assert!(matches!(err, StoreError::InvalidData(_)));
        assert!(store.find_all().unwrap().is_empty());
    }

    #[test]
    fn insert_clamps_updated_at_to_created_at() {
        let store = store();
        let mut repo = Repository::new("proj-a", "Proj A").unwrap();
        repo.path = Some("/srv/git/proj-a".into());
        repo.created_at = Some(2_000);
        repo.updated_at = Some(1_000);

        let stored = store.insert(&repo).unwrap();
        assert_eq!(stored.created_at, Some(2_000));
        assert_eq!(stored.updated_at, Some(2_000));
    }
}
