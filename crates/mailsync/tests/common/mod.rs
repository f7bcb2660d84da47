//! Shared test utilities for mailsync integration tests.
//!
//! This module provides:
//! - `TestEngine`, a sync engine wired to an in-memory SQLite store
//! - `StubMailbox` / `StubConnector`, a scripted IMAP server
//! - `MessageBuilder` for raw RFC 5322 messages

pub mod builders;
pub mod harness;
pub mod stub;

pub use builders::*;
pub use harness::*;
pub use stub::*;
