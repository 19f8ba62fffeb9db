//! Domain events for account lifecycle changes.
//!
//! Engine methods return the list of events they produced; callers consume
//! them synchronously or fan them out through the [`EventBus`]. This replaces
//! global signal dispatch with an explicit, inspectable value.
//!
//! The bundled [`MemoryEventBus`] (tokio broadcast channels) covers single
//! process deployments and tests; multi-replica deployments would implement
//! [`EventBus`] over their own transport.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use folio_storage::AccountId;

/// An account lifecycle event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// A new unconfirmed account was created by self-registration.
    AccountCreated { account_id: AccountId },
    /// An email address was confirmed.
    EmailConfirmed { account_id: AccountId, email: String },
    /// Confirmation completed full registration.
    AccountRegistered { account_id: AccountId },
    /// The account was disabled.
    AccountDisabled { account_id: AccountId },
    /// A disabled account was reactivated.
    AccountReactivated { account_id: AccountId },
    /// The account's PII was scrubbed under GDPR erasure.
    AccountErased { account_id: AccountId },
    /// An external identity reached VERIFIED status.
    IdentityVerified {
        account_id: AccountId,
        provider: String,
        external_id: String,
    },
    /// The source account was merged into the target account.
    AccountsMerged {
        source: AccountId,
        target: AccountId,
    },
    /// The account's password was reset through an action token.
    PasswordReset { account_id: AccountId },
}

impl AccountEvent {
    /// The account a consumer should subscribe on to observe this event.
    pub fn subject(&self) -> &AccountId {
        match self {
            AccountEvent::AccountCreated { account_id }
            | AccountEvent::EmailConfirmed { account_id, .. }
            | AccountEvent::AccountRegistered { account_id }
            | AccountEvent::AccountDisabled { account_id }
            | AccountEvent::AccountReactivated { account_id }
            | AccountEvent::AccountErased { account_id }
            | AccountEvent::IdentityVerified { account_id, .. }
            | AccountEvent::PasswordReset { account_id } => account_id,
            AccountEvent::AccountsMerged { target, .. } => target,
        }
    }
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of account events
pub type EventStream = Pin<Box<dyn Stream<Item = AccountEvent> + Send>>;

/// Event bus trait for publishing and subscribing to account events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to all watchers of the account.
    async fn publish(&self, account_id: &AccountId, event: AccountEvent)
        -> Result<(), EventBusError>;

    /// Subscribe to events for an account. The stream yields events as they
    /// occur until dropped.
    async fn subscribe(&self, account_id: &AccountId) -> Result<EventStream, EventBusError>;
}

const CHANNEL_CAPACITY: usize = 100;

/// In-memory event bus using tokio broadcast channels.
///
/// Events are only broadcast within a single process.
pub struct MemoryEventBus {
    channels: Arc<DashMap<AccountId, broadcast::Sender<AccountEvent>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    fn get_or_create_channel(&self, account_id: &AccountId) -> broadcast::Sender<AccountEvent> {
        self.channels
            .entry(account_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(
        &self,
        account_id: &AccountId,
        event: AccountEvent,
    ) -> Result<(), EventBusError> {
        let tx = self.get_or_create_channel(account_id);

        // Ignore error if no receivers (this is fine)
        let _ = tx.send(event);

        Ok(())
    }

    async fn subscribe(&self, account_id: &AccountId) -> Result<EventStream, EventBusError> {
        let tx = self.get_or_create_channel(account_id);
        let rx = tx.subscribe();

        // Lagged receivers fell behind and should resync from the store.
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());

        Ok(Box::pin(stream))
    }
}
