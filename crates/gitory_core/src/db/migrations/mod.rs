//! Schema migrations for the repository metadata table.
//!
//! Migrations are plain SQL files applied in one transaction, each bumping
//! `PRAGMA user_version` to its own number. After migrating, the
//! `repositories` columns are checked, since a hand-edited file can carry a
//! current version without the table it implies.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_init.sql"),
}];

const REPOSITORY_COLUMNS: &[&str] = &[
    "identifier",
    "name",
    "description",
    "path",
    "created_at",
    "updated_at",
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings `conn` to the latest schema and verifies the repositories table.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = current_user_version(conn)?;
    let latest = latest_version();

    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    if from_version < latest {
        let tx = conn.transaction()?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > from_version) {
            debug!(
                "event=db_migrate module=db status=apply version={}",
                migration.version
            );
            tx.execute_batch(migration.sql)?;
            tx.pragma_update(None, "user_version", migration.version)?;
        }
        tx.commit()?;
        info!(
            "event=db_migrate module=db status=ok from_version={} to_version={}",
            from_version, latest
        );
    }

    verify_repository_columns(conn)
}

fn verify_repository_columns(conn: &Connection) -> DbResult<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('repositories');")?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    match REPOSITORY_COLUMNS
        .iter()
        .find(|column| !present.iter().any(|name| name == *column))
    {
        Some(&column) => Err(DbError::MissingColumn {
            table: "repositories",
            column,
        }),
        None => Ok(()),
    }
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
