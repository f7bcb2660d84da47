//! Message parsing error types.

use thiserror::Error;

/// Why a fetched message could not be turned into a [`super::ParsedMessage`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The server returned no body for the message.
    #[error("Message UID {uid} has no body")]
    MissingBody { uid: u32 },

    /// The body was empty.
    #[error("Message UID {uid} is empty")]
    Empty { uid: u32 },

    /// The body is not a parseable RFC 5322 message.
    #[error("Failed to parse email UID {uid}: {reason}")]
    Malformed { uid: u32, reason: String },
}

impl ParseError {
    pub fn uid(&self) -> u32 {
        match self {
            ParseError::MissingBody { uid }
            | ParseError::Empty { uid }
            | ParseError::Malformed { uid, .. } => *uid,
        }
    }
}

/// Result type for message parsing.
pub type Result<T> = std::result::Result<T, ParseError>;
