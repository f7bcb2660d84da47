//! Record store boundary.
//!
//! The engine talks to persistence only through these traits. Records are
//! explicit typed structs and are validated when they cross into a store;
//! a store rejects the whole request when any record is invalid.

use std::collections::HashSet;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::mail::{ExtractedAttachment, ParsedMessage};

pub mod error;

pub use error::{Result, StoreError};

/// Primary key of a lead (contact) record.
pub type LeadId = i64;

/// Primary key of a stored email row.
pub type EmailId = i64;

/// An email row as written to the `emails` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    pub account_id: String,
    pub folder: String,
    /// UIDVALIDITY the `uid` belongs to; 0 when the server reported none.
    pub uid_validity: u32,
    pub uid: u32,
    pub message_id: String,
    pub subject: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub to_name: Option<String>,
    pub to_email: Option<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub is_starred: bool,
    pub has_attachments: bool,
    pub flags: Vec<String>,
    pub lead_id: Option<LeadId>,
}

impl EmailRecord {
    /// Binds a parsed message to its account folder and UID epoch.
    pub fn from_parsed(
        account_id: &str,
        folder: &str,
        uid_validity: u32,
        message: ParsedMessage,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            folder: folder.to_string(),
            uid_validity,
            uid: message.uid,
            message_id: message.message_id,
            subject: message.subject,
            from_name: message.from_name,
            from_email: message.from_email,
            to_name: message.to_name,
            to_email: message.to_email,
            cc: message.cc,
            bcc: message.bcc,
            html_body: message.html_body,
            text_body: message.text_body,
            sent_at: message.sent_at,
            received_at: message.received_at,
            is_read: message.is_read,
            is_starred: message.is_starred,
            has_attachments: message.has_attachments,
            flags: message.flags,
            lead_id: message.lead_id,
        }
    }

    /// Checks the invariants a store relies on.
    pub fn validate(&self) -> Result<()> {
        if self.account_id.is_empty() {
            return Err(StoreError::Rejected(format!(
                "email uid {} has an empty account id",
                self.uid
            )));
        }
        if self.folder.is_empty() {
            return Err(StoreError::Rejected(format!(
                "email uid {} has an empty folder",
                self.uid
            )));
        }
        if self.message_id.is_empty() {
            return Err(StoreError::Rejected(format!(
                "email uid {} has an empty message id",
                self.uid
            )));
        }
        Ok(())
    }
}

/// An attachment row; written only once its parent email row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    pub email_id: EmailId,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    /// Raw bytes; base64 in JSON.
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub content: Vec<u8>,
    pub content_id: Option<String>,
}

impl AttachmentRecord {
    /// Binds an extracted attachment to the generated id of its parent email.
    pub fn from_extracted(email_id: EmailId, attachment: ExtractedAttachment) -> Self {
        Self {
            email_id,
            file_size: attachment.content.len() as u64,
            file_name: attachment.filename,
            file_type: attachment.mime_type,
            content: attachment.content,
            content_id: attachment.content_id,
        }
    }

    /// Checks the invariants a store relies on.
    pub fn validate(&self) -> Result<()> {
        if self.file_name.is_empty() {
            return Err(StoreError::Rejected(format!(
                "attachment of email {} has an empty file name",
                self.email_id
            )));
        }
        if self.file_size != self.content.len() as u64 {
            return Err(StoreError::Rejected(format!(
                "attachment '{}' size {} does not match content length {}",
                self.file_name,
                self.file_size,
                self.content.len()
            )));
        }
        Ok(())
    }
}

fn to_base64<S: Serializer>(content: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(content))
}

fn from_base64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// A row the store actually inserted, with its generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedEmail {
    pub id: EmailId,
    pub uid: u32,
}

/// A server folder as reported by LIST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub name: String,
    pub delimiter: Option<String>,
    pub selectable: bool,
}

/// Messages already persisted for a folder, used for dedupe.
///
/// UIDs only count within the current UIDVALIDITY epoch; Message-IDs count
/// across every epoch.
#[derive(Debug, Clone, Default)]
pub struct KnownMessages {
    uids: HashSet<u32>,
    message_ids: HashSet<String>,
}

impl KnownMessages {
    /// Builds the set from stored `(message_id, uid_validity, uid)` rows.
    pub fn for_epoch<I>(rows: I, uid_validity: u32) -> Self
    where
        I: IntoIterator<Item = (String, u32, u32)>,
    {
        let mut known = Self::default();
        for (message_id, epoch, uid) in rows {
            if epoch == uid_validity {
                known.uids.insert(uid);
            }
            if !message_id.is_empty() {
                known.message_ids.insert(message_id);
            }
        }
        known
    }

    /// True when either the UID or the Message-ID has been seen.
    pub fn contains(&self, uid: u32, message_id: Option<&str>) -> bool {
        self.uids.contains(&uid) || message_id.is_some_and(|id| self.message_ids.contains(id))
    }

    pub fn insert(&mut self, uid: u32, message_id: &str) {
        self.uids.insert(uid);
        if !message_id.is_empty() {
            self.message_ids.insert(message_id.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.uids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }
}

/// Storage for synced messages and their attachments.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Loads what is stored for the folder, keyed to the given UIDVALIDITY.
    async fn known_messages(
        &self,
        account_id: &str,
        folder: &str,
        uid_validity: u32,
    ) -> Result<KnownMessages>;

    /// Bulk insert in one atomic request.
    ///
    /// Rows whose `(account_id, folder, uid_validity, uid)` already exists
    /// are ignored and left out of the returned list.
    async fn insert_emails(&self, records: &[EmailRecord]) -> Result<Vec<InsertedEmail>>;

    /// Bulk insert of attachment rows in one atomic request.
    async fn insert_attachments(&self, records: &[AttachmentRecord]) -> Result<usize>;

    /// Replaces the stored folder list for an account.
    async fn upsert_folders(&self, account_id: &str, folders: &[FolderRecord]) -> Result<usize>;
}

/// Lookup of lead (contact) records by address.
#[async_trait]
pub trait LeadDirectory: Send + Sync {
    /// Returns the first lead whose email equals any of `addresses`.
    async fn find_by_addresses(&self, addresses: &[&str]) -> Result<Option<LeadId>>;
}
