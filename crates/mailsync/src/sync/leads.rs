//! Best-effort association of messages with known leads.

use std::sync::Arc;

use tracing::warn;

use crate::store::{LeadDirectory, LeadId};

#[derive(Clone)]
pub struct LeadResolver {
    directory: Arc<dyn LeadDirectory>,
}

impl LeadResolver {
    pub fn new(directory: Arc<dyn LeadDirectory>) -> Self {
        Self { directory }
    }

    /// Finds the lead whose address equals the sender or the recipient.
    ///
    /// Lookup failures are logged and treated as "no lead".
    pub async fn resolve(&self, from_email: Option<&str>, to_email: Option<&str>) -> Option<LeadId> {
        let mut addresses: Vec<&str> = Vec::with_capacity(2);
        for address in [from_email, to_email].into_iter().flatten() {
            let address = address.trim();
            if !address.is_empty() && !addresses.contains(&address) {
                addresses.push(address);
            }
        }
        if addresses.is_empty() {
            return None;
        }

        match self.directory.find_by_addresses(&addresses).await {
            Ok(lead) => lead,
            Err(e) => {
                warn!(error = %e, "Lead lookup failed, storing message without lead");
                None
            }
        }
    }
}
