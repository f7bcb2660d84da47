//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order. ADD COLUMN migrations are handled conditionally
//! to support idempotent execution.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    kind: MigrationKind,
}

enum MigrationKind {
    /// Execute the SQL directly.
    Standard,
    /// ALTER TABLE ADD COLUMN; skipped when the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_leads_table",
        sql: include_str!("sql/001_create_leads.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 2,
        description: "create_sync_status_table",
        sql: include_str!("sql/002_create_sync_status.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 3,
        description: "create_emails_table",
        sql: include_str!("sql/003_create_emails.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 4,
        description: "create_email_attachments_table",
        sql: include_str!("sql/004_create_email_attachments.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 5,
        description: "create_email_folders_table",
        sql: include_str!("sql/005_create_email_folders.sql"),
        kind: MigrationKind::Standard,
    },
    Migration {
        version: 6,
        description: "add_uid_validity_to_sync_status",
        sql: include_str!("sql/006_add_uid_validity.sql"),
        kind: MigrationKind::AddColumn {
            table: "sync_status",
            column: "uid_validity",
        },
    },
    Migration {
        version: 7,
        description: "add_uid_validity_to_emails",
        sql: include_str!("sql/007_add_uid_validity_to_emails.sql"),
        kind: MigrationKind::Standard,
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let should_run = match &migration.kind {
            MigrationKind::Standard => true,
            MigrationKind::AddColumn { table, column } => !column_exists(conn, table, column)?,
        };

        if should_run {
            conn.execute_batch(migration.sql)
                .map_err(|e| DatabaseError::Migration {
                    version: migration.version,
                    reason: e.to_string(),
                })?;
        } else {
            log::info!(
                "Skipping migration v{} (column already present)",
                migration.version
            );
        }

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

/// Checks whether a column exists on a table using `PRAGMA table_info`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    // Identifiers are interpolated, so only alphanumerics and underscores pass.
    if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::Migration {
            version: 0,
            reason: format!("Invalid table name: {}", table),
        });
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .any(|r| r.map(|name| name == column).unwrap_or(false));
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = fresh();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_add_column_skipped_when_present() {
        let conn = fresh();
        for migration in &MIGRATIONS[..5] {
            conn.execute_batch(migration.sql).unwrap();
        }
        conn.execute_batch("ALTER TABLE sync_status ADD COLUMN uid_validity INTEGER;")
            .unwrap();

        run_all(&conn).unwrap();
        assert!(column_exists(&conn, "sync_status", "uid_validity").unwrap());
    }

    #[test]
    fn test_column_exists_check() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE test_tbl (id TEXT, name TEXT);")
            .unwrap();

        assert!(column_exists(&conn, "test_tbl", "id").unwrap());
        assert!(!column_exists(&conn, "test_tbl", "missing").unwrap());
        assert!(column_exists(&conn, "bad;name", "id").is_err());
    }

    #[test]
    fn test_attachments_cascade_with_email() {
        let conn = fresh();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO emails (account_id, folder, uid, message_id, created_at)
             VALUES ('acc', 'INBOX', 1, '<m1>', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO email_attachments (email_id, file_name, file_type, file_size, content, created_at)
             VALUES (1, 'a.pdf', 'application/pdf', 3, x'010203', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM emails WHERE id = 1", []).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM email_attachments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_email_uid_unique_per_validity_epoch() {
        let conn = fresh();
        run_all(&conn).unwrap();

        let insert = "INSERT OR IGNORE INTO emails (account_id, folder, uid_validity, uid, message_id, created_at)
             VALUES ('acc', 'INBOX', ?1, 1, ?2, '2026-01-01T00:00:00Z')";
        assert_eq!(conn.execute(insert, rusqlite::params![5, "<old>"]).unwrap(), 1);
        assert_eq!(conn.execute(insert, rusqlite::params![5, "<dup>"]).unwrap(), 0);
        assert_eq!(conn.execute(insert, rusqlite::params![7, "<new>"]).unwrap(), 1);

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM emails WHERE uid = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }
}
