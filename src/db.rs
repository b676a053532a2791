use std::time::Duration;

use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, RuntimeErr};
use sea_orm_migration::MigratorTrait;
use sqlx::sqlite::SqliteError;

use crate::migration::Migrator;

pub type OrmConn = DatabaseConnection;

/// Create a SeaORM connection.
///
/// An in-memory SQLite database lives and dies with its connection, so the
/// pool is pinned to a single long-lived connection in that case.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .acquire_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    if is_in_memory(database_url) {
        options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(24 * 60 * 60))
            .max_lifetime(Duration::from_secs(24 * 60 * 60));
    } else {
        options.max_connections(20);
    }
    let conn = Database::connect(options).await?;
    Ok(conn)
}

/// Apply every pending migration.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    Migrator::up(conn, None).await?;
    Ok(())
}

/// Whether a storage error means a concurrent writer got in the way:
/// serialization failures and deadlocks on Postgres, busy/locked on SQLite.
pub fn is_write_conflict(err: &DbErr) -> bool {
    let runtime = match err {
        DbErr::Exec(e) | DbErr::Query(e) | DbErr::Conn(e) => e,
        _ => return false,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx_err) => sqlx_conflict(sqlx_err),
        _ => false,
    }
}

fn sqlx_conflict(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    let Some(code) = db_err.code() else {
        return false;
    };
    if db_err.try_downcast_ref::<SqliteError>().is_some() {
        sqlite_busy_or_locked(&code)
    } else {
        matches!(code.as_ref(), "40001" | "40P01")
    }
}

/// SQLite reports extended result codes; the low byte is the primary code
/// (5 BUSY, 6 LOCKED).
fn sqlite_busy_or_locked(code: &str) -> bool {
    code.parse::<i32>()
        .is_ok_and(|code| matches!(code & 0xff, 5 | 6))
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_sqlite_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite:file:shop?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://data/shop.db"));
        assert!(!is_in_memory("postgres://localhost/shop"));
    }

    #[test]
    fn sqlite_extended_codes_reduce_to_busy_or_locked() {
        for code in ["5", "6", "261", "517", "262", "774"] {
            assert!(sqlite_busy_or_locked(code), "code {code}");
        }
        for code in ["1", "19", "2067", "40001", "not-a-number"] {
            assert!(!sqlite_busy_or_locked(code), "code {code}");
        }
    }

    #[test]
    fn plain_errors_are_not_conflicts() {
        assert!(!is_write_conflict(&DbErr::RecordNotFound("book".into())));
        assert!(!is_write_conflict(&DbErr::Custom("boom".into())));
        assert!(!is_write_conflict(&DbErr::Query(RuntimeErr::Internal(
            "syntax error".into()
        ))));
    }
}
