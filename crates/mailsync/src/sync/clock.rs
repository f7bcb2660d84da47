//! Local clock sanity check against a reference clock.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::SyncError;

#[derive(Error, Debug)]
pub enum ClockError {
    #[error("Clock reference request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Clock reference response has no Date header")]
    MissingDate,

    #[error("Clock reference sent an invalid Date header '{0}'")]
    InvalidDate(String),
}

/// A trusted source of the current time.
#[async_trait]
pub trait ClockReference: Send + Sync {
    async fn now(&self) -> Result<DateTime<Utc>, ClockError>;
}

/// Reads the `Date` header of a HEAD request.
#[derive(Debug, Clone)]
pub struct HttpDateClock {
    client: reqwest::Client,
    url: String,
}

impl HttpDateClock {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClockError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ClockReference for HttpDateClock {
    async fn now(&self) -> Result<DateTime<Utc>, ClockError> {
        let response = self.client.head(&self.url).send().await?;
        let header = response
            .headers()
            .get(reqwest::header::DATE)
            .ok_or(ClockError::MissingDate)?;
        let value = header
            .to_str()
            .map_err(|_| ClockError::InvalidDate(String::from_utf8_lossy(header.as_bytes()).into_owned()))?;
        parse_http_date(value)
    }
}

/// Parses an IMF-fixdate such as `Tue, 15 Nov 1994 08:12:31 GMT`.
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>, ClockError> {
    DateTime::parse_from_rfc2822(value.trim())
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ClockError::InvalidDate(value.to_string()))
}

/// Fails when the local clock runs ahead of the reference by more than `tolerance`.
///
/// An unreachable reference only logs a warning.
pub async fn check_clock_skew(
    clock: &dyn ClockReference,
    tolerance: Duration,
) -> Result<(), SyncError> {
    let reference = match clock.now().await {
        Ok(reference) => reference,
        Err(e) => {
            warn!(error = %e, "Clock reference unavailable, skipping skew check");
            return Ok(());
        }
    };

    let skew_secs = (Utc::now() - reference).num_seconds();
    debug!(skew_secs, "Clock skew measured");
    let tolerance_secs = tolerance.as_secs();
    if skew_secs > tolerance_secs as i64 {
        return Err(SyncError::TimeSkew {
            skew_secs,
            tolerance_secs,
        });
    }
    Ok(())
}
