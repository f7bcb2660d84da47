//! Email repository: bulk writes and dedupe lookups for `emails`,
//! `email_attachments` and `email_folders`.

use chrono::Utc;
use rusqlite::params;

use crate::store::{AttachmentRecord, EmailRecord, FolderRecord, InsertedEmail};

use super::{Database, DatabaseError};

fn to_json(column: &'static str, values: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(values).map_err(|e| DatabaseError::InvalidValue {
        column,
        reason: e.to_string(),
    })
}

/// Inserts a batch of emails in one transaction.
///
/// Rows that collide with an existing `(account_id, folder, uid_validity, uid)`
/// are ignored and left out of the result.
pub fn insert_batch(
    db: &Database,
    records: &[EmailRecord],
) -> Result<Vec<InsertedEmail>, DatabaseError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let created_at = Utc::now().to_rfc3339();
    db.with_transaction(|tx| {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO emails (account_id, folder, uid, message_id, subject,
             from_name, from_email, to_name, to_email, cc, bcc, html_body, text_body,
             sent_at, received_at, is_read, is_starred, has_attachments, flags, lead_id, created_at,
             uid_validity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20, ?21, ?22)",
        )?;

        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            let changed = stmt.execute(params![
                record.account_id,
                record.folder,
                record.uid,
                record.message_id,
                record.subject,
                record.from_name,
                record.from_email,
                record.to_name,
                record.to_email,
                to_json("cc", &record.cc)?,
                to_json("bcc", &record.bcc)?,
                record.html_body,
                record.text_body,
                record.sent_at.map(|d| d.to_rfc3339()),
                record.received_at.map(|d| d.to_rfc3339()),
                record.is_read,
                record.is_starred,
                record.has_attachments,
                to_json("flags", &record.flags)?,
                record.lead_id,
                created_at,
                record.uid_validity,
            ])?;
            if changed > 0 {
                inserted.push(InsertedEmail {
                    id: tx.last_insert_rowid(),
                    uid: record.uid,
                });
            }
        }
        Ok(inserted)
    })
}

/// Inserts a batch of attachment rows in one transaction.
pub fn insert_attachments(
    db: &Database,
    records: &[AttachmentRecord],
) -> Result<usize, DatabaseError> {
    if records.is_empty() {
        return Ok(0);
    }

    let created_at = Utc::now().to_rfc3339();
    db.with_transaction(|tx| {
        let mut stmt = tx.prepare(
            "INSERT INTO email_attachments (email_id, file_name, file_type, file_size, content,
             content_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for record in records {
            stmt.execute(params![
                record.email_id,
                record.file_name,
                record.file_type,
                record.file_size,
                record.content,
                record.content_id,
                created_at,
            ])?;
        }
        Ok(records.len())
    })
}

/// Returns every stored `(message_id, uid_validity, uid)` row for a folder.
pub fn find_known_rows(
    db: &Database,
    account_id: &str,
    folder: &str,
) -> Result<Vec<(String, u32, u32)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT message_id, uid_validity, uid FROM emails
             WHERE account_id = ?1 AND folder = ?2",
        )?;
        let rows = stmt
            .query_map(params![account_id, folder], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Returns the stored UIDs for a folder in ascending order.
pub fn find_uids(db: &Database, account_id: &str, folder: &str) -> Result<Vec<u32>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT uid FROM emails WHERE account_id = ?1 AND folder = ?2 ORDER BY uid ASC",
        )?;
        let uids = stmt
            .query_map(params![account_id, folder], |row| row.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(uids)
    })
}

/// Counts stored emails for a folder.
pub fn count_by_folder(db: &Database, account_id: &str, folder: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM emails WHERE account_id = ?1 AND folder = ?2",
            params![account_id, folder],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Counts attachment rows belonging to an email.
pub fn count_attachments(db: &Database, email_id: i64) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM email_attachments WHERE email_id = ?1",
            params![email_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Finds the generated id and lead association of an email by UID.
pub fn find_email(
    db: &Database,
    account_id: &str,
    folder: &str,
    uid: u32,
) -> Result<Option<(i64, Option<i64>)>, DatabaseError> {
    use rusqlite::OptionalExtension;

    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT id, lead_id FROM emails WHERE account_id = ?1 AND folder = ?2 AND uid = ?3
                 ORDER BY id DESC LIMIT 1",
                params![account_id, folder, uid],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Option<i64>>(1)?)),
            )
            .optional()?;
        Ok(row)
    })
}

/// Replaces the folder list of an account.
pub fn replace_folders(
    db: &Database,
    account_id: &str,
    folders: &[FolderRecord],
) -> Result<usize, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_transaction(|tx| {
        tx.execute(
            "DELETE FROM email_folders WHERE account_id = ?1",
            params![account_id],
        )?;
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO email_folders (account_id, name, delimiter, selectable, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for folder in folders {
            stmt.execute(params![
                account_id,
                folder.name,
                folder.delimiter,
                folder.selectable,
                now
            ])?;
        }
        Ok(folders.len())
    })
}

/// Lists folder names stored for an account.
pub fn find_folders(db: &Database, account_id: &str) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT name FROM email_folders WHERE account_id = ?1 ORDER BY name ASC")?;
        let names = stmt
            .query_map(params![account_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    })
}
