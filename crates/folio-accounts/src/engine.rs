//! Engine wiring.
//!
//! Builds every component over one store, one lock table and one
//! configuration, with the external collaborators a deployment supplies.

use std::sync::Arc;

use folio_events::EventBus;
use folio_storage::Store;

use crate::collab::{MailingListClient, SearchIndexer, TwoFactorVerifier};
use crate::config::EngineConfig;
use crate::gateway::AuthGateway;
use crate::identity::ExternalIdentityLinker;
use crate::lifecycle::AccountStateMachine;
use crate::locks::AccountLocks;
use crate::mailer::Mailer;
use crate::merge::MergeEngine;
use crate::registry::EmailRegistry;
use crate::vault::TokenVault;

/// External collaborators. Any of them may be absent; absent collaborators
/// degrade to no-ops (mail, search, events) or to failing checks
/// (two-factor).
#[derive(Default)]
pub struct Collaborators {
    pub mailer: Option<Arc<dyn Mailer>>,
    pub search: Option<Arc<dyn SearchIndexer>>,
    pub mailing_lists: Option<Arc<dyn MailingListClient>>,
    pub two_factor: Option<Arc<dyn TwoFactorVerifier>>,
    pub events: Option<Arc<dyn EventBus>>,
}

/// The assembled account engine.
pub struct AccountEngine {
    pub store: Arc<dyn Store>,
    pub config: Arc<EngineConfig>,
    pub locks: Arc<AccountLocks>,
    pub vault: TokenVault,
    pub identity: ExternalIdentityLinker,
    pub merge: MergeEngine,
    pub registry: EmailRegistry,
    pub lifecycle: AccountStateMachine,
    pub gateway: AuthGateway,
}

impl AccountEngine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig, collaborators: Collaborators) -> Self {
        let config = Arc::new(config);
        let locks = Arc::new(AccountLocks::new());
        let vault = TokenVault::new(config.clone());

        let identity = ExternalIdentityLinker::new(store.clone());
        let merge = MergeEngine::new(
            store.clone(),
            locks.clone(),
            collaborators.events.clone(),
            config.clone(),
        );
        let registry = EmailRegistry::new(
            store.clone(),
            vault.clone(),
            merge.clone(),
            identity.clone(),
            locks.clone(),
            collaborators.mailer.clone(),
            collaborators.events.clone(),
            config.clone(),
        );
        let lifecycle = AccountStateMachine::new(
            store.clone(),
            vault.clone(),
            registry.clone(),
            locks.clone(),
            collaborators.mailer.clone(),
            collaborators.search.clone(),
            collaborators.mailing_lists.clone(),
            collaborators.events.clone(),
            config.clone(),
        );
        let gateway = AuthGateway::new(
            store.clone(),
            lifecycle.clone(),
            collaborators.two_factor.clone(),
            collaborators.mailer.clone(),
            config.clone(),
        );

        Self {
            store,
            config,
            locks,
            vault,
            identity,
            merge,
            registry,
            lifecycle,
            gateway,
        }
    }
}
