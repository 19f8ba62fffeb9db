//! Narrow collaborator contracts the engine calls but does not implement.
//!
//! Search indexing, mailing-list management and two-factor validation are
//! external systems. The engine consumes them behind small traits; an absent
//! collaborator degrades to a no-op (or, for two-factor, to a failing
//! check) instead of blocking the account flow.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use folio_events::{AccountEvent, EventBus};
use folio_storage::Account;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error("collaborator call failed: {0}")]
    Failed(String),
}

/// Search index notifications; best-effort, log-and-continue.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index_account(&self, account: &Account) -> Result<(), CollabError>;
}

/// Outbound mailing-list management.
#[async_trait]
pub trait MailingListClient: Send + Sync {
    /// Unsubscribe the address from every platform list.
    async fn unsubscribe_all(&self, email: &str) -> Result<(), CollabError>;
}

/// One-time-password validation against the external two-factor provider.
#[async_trait]
pub trait TwoFactorVerifier: Send + Sync {
    async fn verify(&self, account: &Account, code: &str) -> Result<bool, CollabError>;
}

/// Best-effort search reindex: failures are logged, never propagated.
pub(crate) async fn reindex_account(search: &Option<Arc<dyn SearchIndexer>>, account: &Account) {
    if let Some(indexer) = search {
        if let Err(err) = indexer.index_account(account).await {
            warn!(account = %account.id.0, error = %err, "search reindex failed");
        }
    }
}

/// Best-effort event fan-out: failures are logged, never propagated.
pub(crate) async fn publish_events(bus: &Option<Arc<dyn EventBus>>, events: &[AccountEvent]) {
    if let Some(bus) = bus {
        for event in events {
            if let Err(err) = bus.publish(event.subject(), event.clone()).await {
                warn!(error = %err, "event publish failed");
            }
        }
    }
}
