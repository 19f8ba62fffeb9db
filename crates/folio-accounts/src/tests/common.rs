//! Common test helpers and utilities for engine tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use folio_store_memory::MemoryStore;
use folio_storage::*;

use crate::collab::{CollabError, MailingListClient, TwoFactorVerifier};
use crate::config::EngineConfig;
use crate::mailer::{Mail, MailError, Mailer};
use crate::{AccountEngine, Collaborators};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Mailer that records every message instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Mail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &Mail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

impl RecordingMailer {
    pub fn sent_to(&self, to: &str) -> Vec<Mail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|mail| mail.to == to)
            .cloned()
            .collect()
    }
}

/// Two-factor verifier accepting a single fixed code.
pub struct StaticTwoFactor {
    pub accept: String,
}

#[async_trait]
impl TwoFactorVerifier for StaticTwoFactor {
    async fn verify(&self, _account: &Account, code: &str) -> Result<bool, CollabError> {
        Ok(code == self.accept)
    }
}

/// Mailing-list client that records unsubscribes.
#[derive(Default)]
pub struct RecordingMailingLists {
    pub unsubscribed: Mutex<Vec<String>>,
}

#[async_trait]
impl MailingListClient for RecordingMailingLists {
    async fn unsubscribe_all(&self, email: &str) -> Result<(), CollabError> {
        self.unsubscribed.lock().unwrap().push(email.to_string());
        Ok(())
    }
}

/// Mailing-list client that always fails.
pub struct FailingMailingLists;

#[async_trait]
impl MailingListClient for FailingMailingLists {
    async fn unsubscribe_all(&self, _email: &str) -> Result<(), CollabError> {
        Err(CollabError::Failed("provider down".to_string()))
    }
}

/// An engine over an in-memory store with a recording mailer.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub engine: AccountEngine,
}

pub fn test_engine() -> TestHarness {
    test_engine_with(EngineConfig::default(), Collaborators::default())
}

pub fn test_engine_with(config: EngineConfig, mut collaborators: Collaborators) -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(RecordingMailer::default());
    if collaborators.mailer.is_none() {
        collaborators.mailer = Some(mailer.clone());
    }
    let engine = AccountEngine::new(store.clone(), config, collaborators);
    TestHarness {
        store,
        mailer,
        engine,
    }
}

/// The single pending verification token on an account.
pub fn pending_token(account: &Account) -> String {
    assert_eq!(
        account.email_verifications.len(),
        1,
        "expected exactly one pending verification"
    );
    account
        .email_verifications
        .keys()
        .next()
        .cloned()
        .unwrap()
}

/// Register and confirm an account so it is fully active.
pub async fn create_active_account(harness: &TestHarness, email: &str, password: &str) -> Account {
    let (account, _) = harness
        .engine
        .lifecycle
        .create_unconfirmed(email, password, "Test User", None, now())
        .await
        .unwrap();
    let token = pending_token(&account);
    harness
        .engine
        .registry
        .confirm(&account.id, &token, false, now())
        .await
        .unwrap();
    harness.store.get_account(&account.id).await.unwrap()
}

pub async fn create_resource(
    store: &MemoryStore,
    creator: &AccountId,
    kind: ResourceKind,
) -> Resource {
    let resource = Resource {
        id: ResourceId(Uuid::new_v4()),
        title: "Test Resource".to_string(),
        kind,
        is_public: false,
        deleted: None,
        creator: creator.clone(),
    };
    store.save_resource(&resource).await.unwrap();
    resource
}

pub async fn add_contributor(
    store: &MemoryStore,
    resource_id: &ResourceId,
    account_id: &AccountId,
    permission: Permission,
    visible: bool,
) {
    store
        .upsert_contributor(
            resource_id,
            &Contributor {
                account_id: account_id.clone(),
                permission,
                visible,
            },
        )
        .await
        .unwrap();
}

pub async fn create_preprint(store: &MemoryStore, ever_public: bool) -> Preprint {
    let preprint = Preprint {
        id: PreprintId(Uuid::new_v4()),
        title: "Test Preprint".to_string(),
        ever_public,
    };
    store.save_preprint(&preprint).await.unwrap();
    preprint
}

pub async fn create_quick_file(store: &MemoryStore, owner: &AccountId, name: &str) -> QuickFile {
    let file = QuickFile {
        id: FileId(Uuid::new_v4()),
        owner: owner.clone(),
        name: name.to_string(),
        checked_out_by: None,
    };
    store.save_quick_file(&file).await.unwrap();
    file
}

pub async fn create_session_for(store: &MemoryStore, account_id: &AccountId) -> Session {
    let session = Session {
        id: SessionId(Uuid::new_v4()),
        account_id: account_id.clone(),
        created_at: now(),
    };
    store.create_session(&session).await.unwrap();
    session
}

/// Build a sealed gateway body: AEAD-encrypt the JSON plaintext and sign the
/// plaintext with the front end's key.
pub fn sealed_body(
    payload: &serde_json::Value,
    seal_key: &[u8; 32],
    signing_key: &ed25519_dalek::SigningKey,
) -> Vec<u8> {
    use ed25519_dalek::Signer;

    let plaintext = serde_json::to_vec(payload).unwrap();
    let key = folio_crypto::SealKey::from_bytes(seal_key);
    let (nonce, ciphertext) = folio_crypto::seal(&plaintext, &key, b"folio-gateway").unwrap();
    let signature = signing_key.sign(&plaintext);

    serde_json::to_vec(&crate::gateway::SealedEnvelope {
        nonce: hex::encode(nonce.0),
        ciphertext: hex::encode(ciphertext.0),
        signature: hex::encode(signature.to_bytes()),
    })
    .unwrap()
}
