//! Structured message types produced by the parser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::LeadId;

/// A mailbox address with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAddress {
    pub name: Option<String>,
    pub email: String,
}

impl MailAddress {
    /// Formats as `Name <email>` when a display name is present.
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// A fully parsed message ready for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedMessage {
    /// Message-ID header, or a synthetic id when the message carries none.
    pub message_id: String,
    pub uid: u32,
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

/// An attachment extracted from a message, not yet bound to a stored email row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAttachment {
    /// UID of the message this attachment came from.
    pub uid: u32,
    /// The attachment's filename (sanitized).
    pub filename: String,
    /// The attachment's MIME type.
    pub mime_type: String,
    /// The attachment's content.
    pub content: Vec<u8>,
    /// Content-ID for inline parts referenced from the HTML body.
    pub content_id: Option<String>,
}

/// Parser output: the message plus the attachments that passed the size limits.
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    pub message: ParsedMessage,
    pub attachments: Vec<ExtractedAttachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let named = MailAddress {
            name: Some("Ada Lovelace".to_string()),
            email: "ada@example.com".to_string(),
        };
        assert_eq!(named.display(), "Ada Lovelace <ada@example.com>");

        let bare = MailAddress {
            name: None,
            email: "ops@example.com".to_string(),
        };
        assert_eq!(bare.display(), "ops@example.com");
    }
}
