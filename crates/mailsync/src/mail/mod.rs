//! Message parsing.
//!
//! Raw RFC 5322 bytes from a batch fetch become [`ParsedMessage`] values
//! plus the attachments extracted from them.

pub mod error;
pub mod message;
pub mod parser;

pub use error::ParseError;
pub use message::{ExtractedAttachment, MailAddress, ParsedEmail, ParsedMessage};
pub use parser::{normalize_message_id, synthetic_message_id, EmailParser};
