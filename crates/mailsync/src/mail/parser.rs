//! Email parsing and attachment extraction.

use chrono::{DateTime, Utc};
use log::debug;
use mail_parser::{Address, Message, MessageParser, MimeHeaders, PartType};

use crate::connection::FetchedMessage;

use super::error::{ParseError, Result};
use super::message::{ExtractedAttachment, MailAddress, ParsedEmail, ParsedMessage};

/// Default upper bound for a single stored attachment (50 MiB).
pub const DEFAULT_MAX_ATTACHMENT_SIZE: u64 = 52_428_800;

/// Turns fetched raw messages into [`ParsedEmail`] values.
#[derive(Debug, Clone)]
pub struct EmailParser {
    max_attachment_size: u64,
}

impl Default for EmailParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTACHMENT_SIZE)
    }
}

impl EmailParser {
    /// Creates a parser that drops attachments larger than `max_attachment_size`.
    pub fn new(max_attachment_size: u64) -> Self {
        Self {
            max_attachment_size,
        }
    }

    /// Parses one fetched message of `account_id`/`folder`.
    ///
    /// Flags and INTERNALDATE come from the fetch response; everything else
    /// from the RFC 5322 body.
    pub fn parse(
        &self,
        account_id: &str,
        folder: &str,
        fetched: &FetchedMessage,
    ) -> Result<ParsedEmail> {
        let uid = fetched.uid;
        let raw = fetched
            .body
            .as_deref()
            .ok_or(ParseError::MissingBody { uid })?;
        if raw.is_empty() {
            return Err(ParseError::Empty { uid });
        }

        let message = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| ParseError::Malformed {
                uid,
                reason: "not an RFC 5322 message".to_string(),
            })?;

        debug!(
            "Parsing email UID={} subject={:?}",
            uid,
            message.subject().unwrap_or("(no subject)")
        );

        let message_id = message
            .message_id()
            .map(normalize_message_id)
            .or_else(|| fetched.envelope_message_id.as_deref().map(normalize_message_id))
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| synthetic_message_id(uid, folder, account_id));

        let from = first_address(message.from());
        let to = first_address(message.to());
        let sent_at = message
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0));

        let attachments = self.extract_attachments(&message, uid);

        let parsed = ParsedMessage {
            message_id,
            uid,
            subject: message.subject().map(|s| s.to_string()),
            from_name: from.as_ref().and_then(|a| a.name.clone()),
            from_email: from.map(|a| a.email),
            to_name: to.as_ref().and_then(|a| a.name.clone()),
            to_email: to.map(|a| a.email),
            cc: all_addresses(message.cc()),
            bcc: all_addresses(message.bcc()),
            html_body: html_body(&message),
            text_body: message.body_text(0).map(|t| t.into_owned()),
            sent_at,
            received_at: fetched.internal_date.or(sent_at),
            is_read: fetched.has_flag("\\Seen"),
            is_starred: fetched.has_flag("\\Flagged"),
            has_attachments: message.attachment_count() > 0,
            flags: fetched.flags.clone(),
            lead_id: None,
        };

        Ok(ParsedEmail {
            message: parsed,
            attachments,
        })
    }

    /// Extracts attachments that fit within the size limit.
    fn extract_attachments(&self, message: &Message<'_>, uid: u32) -> Vec<ExtractedAttachment> {
        let mut attachments = Vec::new();

        for part in message.attachments() {
            let content = match &part.body {
                PartType::Binary(data) | PartType::InlineBinary(data) => data.to_vec(),
                PartType::Text(text) => text.as_bytes().to_vec(),
                PartType::Html(html) => html.as_bytes().to_vec(),
                _ => continue,
            };

            let mime_type = part
                .content_type()
                .map(|ct| {
                    if let Some(subtype) = ct.subtype() {
                        format!("{}/{}", ct.ctype(), subtype)
                    } else {
                        ct.ctype().to_string()
                    }
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let filename = attachment_filename(part, &mime_type);

            if content.len() as u64 > self.max_attachment_size {
                debug!(
                    "Attachment '{}' too large: {} > {}",
                    filename,
                    content.len(),
                    self.max_attachment_size
                );
                continue;
            }

            debug!(
                "Found attachment: {} ({}, {} bytes)",
                filename,
                mime_type,
                content.len()
            );

            attachments.push(ExtractedAttachment {
                uid,
                filename,
                mime_type,
                content,
                content_id: part
                    .content_id()
                    .map(|id| id.trim_matches(|c| c == '<' || c == '>').to_string())
                    .filter(|id| !id.is_empty()),
            });
        }

        debug!(
            "Extracted {} attachments from email UID={}",
            attachments.len(),
            uid
        );
        attachments
    }
}

/// Only a real `text/html` part counts; plain-text messages have no HTML body.
fn html_body(message: &Message<'_>) -> Option<String> {
    message.html_part(0).and_then(|part| match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    })
}

fn first_address(address: Option<&Address<'_>>) -> Option<MailAddress> {
    address
        .and_then(|a| a.first())
        .and_then(to_mail_address)
}

fn all_addresses(address: Option<&Address<'_>>) -> Vec<String> {
    address
        .map(|a| {
            a.iter()
                .filter_map(to_mail_address)
                .map(|addr| addr.email)
                .collect()
        })
        .unwrap_or_default()
}

fn to_mail_address(addr: &mail_parser::Addr<'_>) -> Option<MailAddress> {
    let email = addr.address()?.trim();
    if email.is_empty() {
        return None;
    }
    Some(MailAddress {
        name: addr
            .name()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        email: email.to_string(),
    })
}

/// Wraps a bare Message-ID in angle brackets so header and envelope ids compare equal.
pub fn normalize_message_id(id: &str) -> String {
    let id = id.trim();
    if id.is_empty() || (id.starts_with('<') && id.ends_with('>')) {
        id.to_string()
    } else {
        format!("<{}>", id.trim_matches(|c| c == '<' || c == '>'))
    }
}

/// Stand-in id for messages that carry no Message-ID at all.
pub fn synthetic_message_id(uid: u32, folder: &str, account_id: &str) -> String {
    format!("<{}.{}@{}>", uid, folder, account_id)
}

/// Gets a sanitized filename for an attachment.
fn attachment_filename(part: &mail_parser::MessagePart<'_>, mime_type: &str) -> String {
    let raw_filename = part
        .attachment_name()
        .or_else(|| part.content_type().and_then(|ct| ct.attribute("name")))
        .map(|s| s.to_string());

    let filename = match raw_filename {
        Some(name) if !name.is_empty() => name,
        _ => format!("attachment.{}", mime_to_extension(mime_type)),
    };

    sanitize_filename(&filename)
}

/// Sanitizes a filename to remove potentially dangerous characters.
fn sanitize_filename(filename: &str) -> String {
    let filename = filename
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    let filename = filename.trim_matches(|c| c == '.' || c == ' ');

    if filename.chars().count() > 255 {
        let ext = filename
            .rfind('.')
            .map(|i| &filename[i..])
            .filter(|ext| ext.chars().count() <= 50)
            .unwrap_or("");
        let base: String = filename
            .chars()
            .take(255 - ext.chars().count())
            .collect();
        format!("{}{}", base, ext)
    } else if filename.is_empty() {
        "attachment".to_string()
    } else {
        filename.to_string()
    }
}

/// Converts a MIME type to a file extension.
fn mime_to_extension(mime_type: &str) -> &'static str {
    match mime_type.to_lowercase().as_str() {
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/zip" => "zip",
        "application/json" => "json",
        "text/calendar" => "ics",
        "text/vcard" | "text/x-vcard" => "vcf",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "text/plain" => "txt",
        "text/html" => "html",
        "text/csv" => "csv",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fetched(uid: u32, raw: &str, flags: &[&str]) -> FetchedMessage {
        FetchedMessage {
            uid,
            flags: flags.iter().map(|f| f.to_string()).collect(),
            internal_date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()),
            envelope_message_id: None,
            body: Some(raw.as_bytes().to_vec()),
        }
    }

    const SIMPLE: &str = "Message-ID: <abc@example.com>\r\n\
From: \"Ada Lovelace\" <ada@example.com>\r\n\
To: Sales <sales@crm.io>\r\n\
Cc: one@example.com, Two <two@example.com>\r\n\
Subject: Quote request\r\n\
Date: Fri, 1 Mar 2024 08:00:00 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Please send a quote.\r\n";

    #[test]
    fn test_parse_headers_and_flags() {
        let parser = EmailParser::default();
        let parsed = parser
            .parse("acc", "INBOX", &fetched(7, SIMPLE, &["\\Seen"]))
            .unwrap();
        let message = parsed.message;

        assert_eq!(message.uid, 7);
        assert_eq!(message.message_id, "<abc@example.com>");
        assert_eq!(message.subject.as_deref(), Some("Quote request"));
        assert_eq!(message.from_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(message.from_email.as_deref(), Some("ada@example.com"));
        assert_eq!(message.to_email.as_deref(), Some("sales@crm.io"));
        assert_eq!(message.cc, vec!["one@example.com", "two@example.com"]);
        assert!(message.bcc.is_empty());
        assert!(message.is_read);
        assert!(!message.is_starred);
        assert!(!message.has_attachments);
        assert!(message.html_body.is_none());
        assert!(message
            .text_body
            .as_deref()
            .unwrap_or_default()
            .contains("Please send a quote."));
        assert_eq!(
            message.sent_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
        );
        // INTERNALDATE wins over the Date header.
        assert_eq!(
            message.received_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_missing_message_id_falls_back() {
        let raw = "From: a@example.com\r\nSubject: x\r\n\r\nbody\r\n";
        let parser = EmailParser::default();

        let mut with_envelope = fetched(3, raw, &[]);
        with_envelope.envelope_message_id = Some("<env@example.com>".to_string());
        let parsed = parser.parse("acc", "INBOX", &with_envelope).unwrap();
        assert_eq!(parsed.message.message_id, "<env@example.com>");

        let parsed = parser.parse("acc", "INBOX", &fetched(3, raw, &[])).unwrap();
        assert_eq!(parsed.message.message_id, "<3.INBOX@acc>");
    }

    #[test]
    fn test_empty_or_missing_body_is_error() {
        let parser = EmailParser::default();
        assert_eq!(
            parser.parse("acc", "INBOX", &fetched(9, "", &[])).unwrap_err(),
            ParseError::Empty { uid: 9 }
        );

        let mut no_body = fetched(10, SIMPLE, &[]);
        no_body.body = None;
        assert_eq!(
            parser.parse("acc", "INBOX", &no_body).unwrap_err().uid(),
            10
        );
    }

    #[test]
    fn test_attachments_extracted_and_size_limited() {
        let raw = "Message-ID: <att@example.com>\r\n\
From: a@example.com\r\n\
Subject: files\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>See attached</p>\r\n\
--XYZ\r\n\
Content-Type: application/pdf; name=\"quote.pdf\"\r\n\
Content-Disposition: attachment; filename=\"quote.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--XYZ--\r\n";

        let parsed = EmailParser::default()
            .parse("acc", "INBOX", &fetched(11, raw, &["\\Flagged"]))
            .unwrap();
        assert!(parsed.message.has_attachments);
        assert!(parsed.message.is_starred);
        assert!(parsed
            .message
            .html_body
            .as_deref()
            .unwrap_or_default()
            .contains("See attached"));
        assert_eq!(parsed.attachments.len(), 1);
        let attachment = &parsed.attachments[0];
        assert_eq!(attachment.filename, "quote.pdf");
        assert_eq!(attachment.mime_type, "application/pdf");
        assert_eq!(attachment.content, b"%PDF-1.4\n");

        let limited = EmailParser::new(4)
            .parse("acc", "INBOX", &fetched(11, raw, &[]))
            .unwrap();
        assert!(limited.message.has_attachments);
        assert!(limited.attachments.is_empty());
    }

    #[test]
    fn test_normalize_message_id() {
        assert_eq!(normalize_message_id("abc@x"), "<abc@x>");
        assert_eq!(normalize_message_id(" <abc@x> "), "<abc@x>");
        assert_eq!(normalize_message_id(""), "");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("document.pdf"), "document.pdf");
        assert_eq!(sanitize_filename("doc<>ument.pdf"), "doc__ument.pdf");
        assert_eq!(
            sanitize_filename("../../../etc/passwd"),
            "_.._.._etc_passwd"
        );
        assert_eq!(sanitize_filename(""), "attachment");
        assert_eq!(sanitize_filename("..."), "attachment");

        let long = format!("{}.pdf", "a".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), 255);
        assert!(sanitized.ends_with(".pdf"));
    }

    #[test]
    fn test_mime_to_extension() {
        assert_eq!(mime_to_extension("application/pdf"), "pdf");
        assert_eq!(mime_to_extension("IMAGE/JPEG"), "jpg");
        assert_eq!(mime_to_extension("unknown/type"), "bin");
    }
}
