//! Lead repository: address lookups against the `leads` table.

use rusqlite::params;

use super::{Database, DatabaseError};

/// Inserts a lead and returns its id.
pub fn insert(db: &Database, email: &str, name: Option<&str>) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO leads (email, name) VALUES (?1, ?2)",
            params![email, name],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Returns the lowest lead id whose email equals one of `addresses`.
pub fn find_first_by_addresses(
    db: &Database,
    addresses: &[&str],
) -> Result<Option<i64>, DatabaseError> {
    if addresses.is_empty() {
        return Ok(None);
    }

    db.with_conn(|conn| {
        let placeholders: Vec<String> = (0..addresses.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "SELECT id FROM leads WHERE email IN ({}) ORDER BY id ASC LIMIT 1",
            placeholders.join(", ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(rusqlite::params_from_iter(addresses.iter()), |row| {
            row.get::<_, i64>(0)
        })?;
        match rows.next() {
            Some(Ok(val)) => Ok(Some(val)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
