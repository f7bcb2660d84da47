//! Computes which UIDs a run should fetch.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::connection::session::bounded;
use crate::connection::{MailSession, SearchQuery, SessionError};
use crate::status::SyncCursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerateOptions {
    /// Cap applied to unrestricted searches.
    pub max_emails: u32,
    pub load_latest: bool,
    /// Whether the stored cursor may narrow the search.
    pub use_cursor: bool,
    pub operation_timeout: Duration,
}

/// UIDs to fetch, ascending and unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub uids: Vec<u32>,
    /// UIDVALIDITY reported by EXAMINE.
    pub uid_validity: Option<u32>,
    /// EXISTS count reported by EXAMINE.
    pub folder_total: u32,
    /// The stored cursor belongs to an older folder epoch.
    pub uid_validity_changed: bool,
    /// Search issued, `None` when the folder was empty or the cap was zero.
    pub query: Option<SearchQuery>,
}

/// Examines `folder` read-only and lists the UIDs to fetch.
pub async fn enumerate(
    session: &mut dyn MailSession,
    folder: &str,
    cursor: Option<&SyncCursor>,
    options: &EnumerateOptions,
) -> Result<Enumeration, SessionError> {
    let mailbox = bounded("EXAMINE", options.operation_timeout, session.examine(folder)).await?;

    let stored_validity = cursor.and_then(|c| c.uid_validity);
    let uid_validity_changed = matches!(
        (stored_validity, mailbox.uid_validity),
        (Some(stored), Some(current)) if stored != current
    );
    if uid_validity_changed {
        warn!(
            folder,
            stored = ?stored_validity,
            current = ?mailbox.uid_validity,
            "UIDVALIDITY changed, ignoring stored cursor"
        );
    }

    let mut enumeration = Enumeration {
        uid_validity: mailbox.uid_validity,
        folder_total: mailbox.exists,
        uid_validity_changed,
        ..Enumeration::default()
    };

    if mailbox.exists == 0 {
        info!(folder, "Folder is empty");
        return Ok(enumeration);
    }

    let cursor = cursor.filter(|_| options.use_cursor && !uid_validity_changed);
    let query = select_query(cursor);

    if query == SearchQuery::All && options.max_emails == 0 {
        info!(folder, "maxEmails is 0, nothing to fetch");
        return Ok(enumeration);
    }

    let found = bounded(
        "SEARCH",
        options.operation_timeout,
        session.uid_search(query),
    )
    .await?;
    debug!(folder, query = %query.to_imap(), found = found.len(), "UID search finished");

    let mut uids = found;
    if let SearchQuery::UidAfter(last_uid) = query {
        // `n:*` always matches the highest UID, even when it is below n.
        uids.retain(|uid| *uid > last_uid);
    }
    uids.sort_unstable();
    uids.dedup();

    if query == SearchQuery::All {
        uids = truncate(uids, options.max_emails as usize, options.load_latest);
    }

    info!(
        folder,
        query = %query.to_imap(),
        selected = uids.len(),
        folder_total = mailbox.exists,
        "Enumerated messages"
    );
    enumeration.uids = uids;
    enumeration.query = Some(query);
    Ok(enumeration)
}

/// Picks the search criterion from the cursor.
pub fn select_query(cursor: Option<&SyncCursor>) -> SearchQuery {
    match cursor {
        Some(SyncCursor {
            last_uid: Some(last_uid),
            ..
        }) => SearchQuery::UidAfter(*last_uid),
        Some(SyncCursor {
            last_sync_time: Some(time),
            ..
        }) => SearchQuery::Since(time.date_naive()),
        _ => SearchQuery::All,
    }
}

/// Keeps at most `max` of the ascending `uids`, newest or oldest.
pub fn truncate(mut uids: Vec<u32>, max: usize, load_latest: bool) -> Vec<u32> {
    if uids.len() > max {
        if load_latest {
            uids.drain(..uids.len() - max);
        } else {
            uids.truncate(max);
        }
    }
    uids
}
