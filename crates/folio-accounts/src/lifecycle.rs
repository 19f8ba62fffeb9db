//! Account state machine.
//!
//! States run `UNREGISTERED → UNCONFIRMED → ACTIVE ⇄ DISABLED` with the
//! terminal states `MERGED` and `DELETED` reachable from any non-terminal
//! state. Every method persists through the store and returns the events it
//! produced; there is no dirty-field diffing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use folio_events::{AccountEvent, EventBus};
use folio_storage::{
    normalize_email, Account, AccountId, ConfirmedEmail, ResourceId, ResourceKind, Permission,
    Store, StoreError,
};

use crate::collab::{publish_events, reindex_account, MailingListClient, SearchIndexer};
use crate::config::EngineConfig;
use crate::error::{LifecycleError, TokenError};
use crate::locks::AccountLocks;
use crate::mailer::{claim_mail, confirmation_mail, password_reset_mail, send_best_effort, Mailer};
use crate::registry::EmailRegistry;
use crate::urls::{claim_url, confirmation_url, password_reset_url};
use crate::vault::{TokenKind, TokenVault};

/// Drives account lifecycle transitions.
#[derive(Clone)]
pub struct AccountStateMachine {
    store: Arc<dyn Store>,
    vault: TokenVault,
    registry: EmailRegistry,
    locks: Arc<AccountLocks>,
    mailer: Option<Arc<dyn Mailer>>,
    search: Option<Arc<dyn SearchIndexer>>,
    mailing_lists: Option<Arc<dyn MailingListClient>>,
    events: Option<Arc<dyn EventBus>>,
    config: Arc<EngineConfig>,
}

impl AccountStateMachine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        vault: TokenVault,
        registry: EmailRegistry,
        locks: Arc<AccountLocks>,
        mailer: Option<Arc<dyn Mailer>>,
        search: Option<Arc<dyn SearchIndexer>>,
        mailing_lists: Option<Arc<dyn MailingListClient>>,
        events: Option<Arc<dyn EventBus>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            vault,
            registry,
            locks,
            mailer,
            search,
            mailing_lists,
            events,
            config,
        }
    }

    /// Self-registration: create an unconfirmed account and send the
    /// confirmation mail. An existing shadow account for the same address is
    /// reused instead of duplicated; a registered or confirmed account with
    /// the address fails `DuplicateEmail`.
    pub async fn create_unconfirmed(
        &self,
        email: &str,
        password: &str,
        fullname: &str,
        campaign: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Account, Vec<AccountEvent>), LifecycleError> {
        let email = normalize_email(email);

        let (mut account, reused_shadow) = match self.store.find_by_username_or_email(&email).await
        {
            Ok(existing) if existing.is_registered || existing.is_confirmed() => {
                return Err(LifecycleError::DuplicateEmail);
            }
            Ok(shadow) => {
                // Invited contributor registering themselves: keep the
                // shadow row so its contributions stay attached.
                let mut account = shadow;
                account.fullname = fullname.to_string();
                (account, true)
            }
            Err(StoreError::NotFound) => (Account::new_unconfirmed(&email, fullname, now), false),
            Err(err) => return Err(err.into()),
        };

        account.password_hash = Some(folio_crypto::hash_password(password)?);
        account.verification_key = Some(folio_crypto::generate_token());

        let token = self
            .registry
            .add_unconfirmed(&mut account, &email, None, now)
            .await?;

        if let Some(tag) = campaign.and_then(|campaign| self.config.campaigns.get(campaign)) {
            account.system_tags.insert(tag.clone());
        }

        account.updated_at = now;
        if reused_shadow {
            self.store.save_account(&account).await?;
        } else {
            self.store.insert_account(&account).await?;
        }

        let url = confirmation_url(&self.config.domain, &account.id, &token, None);
        send_best_effort(
            &self.mailer,
            confirmation_mail(&email, &account.fullname, &url),
        )
        .await;

        let events = vec![AccountEvent::AccountCreated {
            account_id: account.id.clone(),
        }];
        publish_events(&self.events, &events).await;
        Ok((account, events))
    }

    /// Create a shadow account for an invited, unregistered contributor.
    pub async fn create_unregistered(
        &self,
        email: &str,
        fullname: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, LifecycleError> {
        let email = normalize_email(email);
        match self.store.find_by_username_or_email(&email).await {
            Ok(_) => return Err(LifecycleError::DuplicateEmail),
            Err(StoreError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }

        let account = Account::new_unregistered(&email, fullname, now);
        self.store.insert_account(&account).await?;
        Ok(account)
    }

    /// Complete registration for `email`: set it as the primary username,
    /// confirm it, and stamp the confirmation date. Idempotent once the
    /// account is active.
    pub async fn register(
        &self,
        account_id: &AccountId,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccountEvent>, LifecycleError> {
        let email = normalize_email(email);
        let _guard = self.locks.lock(account_id).await;

        let mut account = self.store.get_account(account_id).await?;
        if account.is_active() {
            return Ok(Vec::new());
        }

        match self.store.find_confirmed_email(&email).await {
            Ok(existing) if existing.account_id != *account_id => {
                return Err(LifecycleError::DuplicateEmail);
            }
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                self.store
                    .add_confirmed_email(&ConfirmedEmail {
                        address: email.clone(),
                        account_id: account_id.clone(),
                        created_at: now,
                    })
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }

        account.username = email;
        account.is_registered = true;
        if account.date_confirmed.is_none() {
            account.date_confirmed = Some(now);
        }
        account.updated_at = now;
        self.store.save_account(&account).await?;

        reindex_account(&self.search, &account).await;

        let events = vec![AccountEvent::AccountRegistered {
            account_id: account_id.clone(),
        }];
        publish_events(&self.events, &events).await;
        Ok(events)
    }

    /// Disable the account: stamp `date_disabled`, revoke live sessions and
    /// unsubscribe from outbound mailing lists. The unsubscribe is
    /// best-effort unless subscriptions are mandatory by configuration.
    pub async fn disable(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccountEvent>, LifecycleError> {
        let _guard = self.locks.lock(account_id).await;

        let mut account = self.store.get_account(account_id).await?;
        if account.is_disabled() {
            return Ok(Vec::new());
        }

        if self.config.mailing_lists_mandatory {
            if let Some(client) = &self.mailing_lists {
                client
                    .unsubscribe_all(&account.username)
                    .await
                    .map_err(|err| LifecycleError::MailingList(err.to_string()))?;
            }
        }

        account.date_disabled = Some(now);
        for subscribed in account.mailing_lists.values_mut() {
            *subscribed = false;
        }
        account.updated_at = now;
        self.store.save_account(&account).await?;
        self.store.revoke_all_for_account(account_id).await?;

        if !self.config.mailing_lists_mandatory {
            if let Some(client) = &self.mailing_lists {
                if let Err(err) = client.unsubscribe_all(&account.username).await {
                    warn!(account = %account_id.0, error = %err, "mailing list unsubscribe failed");
                }
            }
        }

        info!(account = %account_id.0, "account disabled");
        let events = vec![AccountEvent::AccountDisabled {
            account_id: account_id.clone(),
        }];
        publish_events(&self.events, &events).await;
        Ok(events)
    }

    /// Clear `date_disabled`.
    pub async fn reactivate(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccountEvent>, LifecycleError> {
        let _guard = self.locks.lock(account_id).await;

        let mut account = self.store.get_account(account_id).await?;
        if !account.is_disabled() {
            return Ok(Vec::new());
        }

        account.date_disabled = None;
        account.updated_at = now;
        self.store.save_account(&account).await?;

        reindex_account(&self.search, &account).await;

        let events = vec![AccountEvent::AccountReactivated {
            account_id: account_id.clone(),
        }];
        publish_events(&self.events, &events).await;
        Ok(events)
    }

    /// GDPR erasure. Refused while the account still anchors shared
    /// content; on success PII is scrubbed in place and the row persists
    /// for referential integrity.
    pub async fn gdpr_delete(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccountEvent>, LifecycleError> {
        let _guard = self.locks.lock(account_id).await;
        let mut account = self.store.get_account(account_id).await?;

        let contributed = self.store.resources_contributed_by(account_id).await?;
        let mut personal: Vec<ResourceId> = Vec::new();
        for resource_id in &contributed {
            let resource = self.store.get_resource(resource_id).await?;
            if resource.kind == ResourceKind::Registration {
                return Err(LifecycleError::UserState(
                    "account has registrations".to_string(),
                ));
            }
            let rows = self.store.contributors_for_resource(resource_id).await?;
            if rows.len() == 1 {
                personal.push(resource_id.clone());
                continue;
            }
            let mine = rows.iter().find(|row| &row.account_id == account_id);
            let sole_admin = mine.is_some_and(|row| row.permission == Permission::Admin)
                && !rows.iter().any(|row| {
                    &row.account_id != account_id && row.permission == Permission::Admin
                });
            if sole_admin {
                return Err(LifecycleError::UserState(format!(
                    "sole admin on shared resource '{}'",
                    resource.title
                )));
            }
        }

        for preprint_id in self.store.preprints_contributed_by(account_id).await? {
            let preprint = self.store.get_preprint(&preprint_id).await?;
            if preprint.ever_public {
                return Err(LifecycleError::UserState(format!(
                    "contributor on public preprint '{}'",
                    preprint.title
                )));
            }
        }

        for group in self.store.groups_for(account_id).await? {
            if !group.is_manager(account_id) {
                continue;
            }
            let has_others = group
                .managers
                .iter()
                .chain(group.members.iter())
                .any(|member| member != account_id);
            if !has_others {
                continue;
            }
            let mut other_registered_manager = false;
            for manager in &group.managers {
                if manager == account_id {
                    continue;
                }
                if self.store.get_account(manager).await?.is_registered {
                    other_registered_manager = true;
                    break;
                }
            }
            if !other_registered_manager {
                return Err(LifecycleError::UserState(format!(
                    "sole registered manager of group '{}'",
                    group.name
                )));
            }
        }

        // Guards passed: erase. Personal sole-contributor resources are
        // soft-deleted, never orphaned.
        for resource_id in personal {
            let mut resource = self.store.get_resource(&resource_id).await?;
            resource.deleted = Some(now);
            self.store.save_resource(&resource).await?;
        }

        for email in self.store.emails_for_account(account_id).await? {
            self.store.remove_confirmed_email(&email.address).await?;
        }

        account.fullname = "Deleted user".to_string();
        account.given_name = None;
        account.middle_names = None;
        account.family_name = None;
        account.suffix = None;
        account.social.clear();
        account.jobs.clear();
        account.schools.clear();
        account.external_identities.clear();
        account.mailing_lists.clear();
        account.date_disabled = Some(now);
        account.deleted = Some(now);
        account.updated_at = now;
        self.store.save_account(&account).await?;
        self.store.revoke_all_for_account(account_id).await?;

        reindex_account(&self.search, &account).await;

        info!(account = %account_id.0, "account erased");
        let events = vec![AccountEvent::AccountErased {
            account_id: account_id.clone(),
        }];
        publish_events(&self.events, &events).await;
        Ok(events)
    }

    /// Issue a password-reset action token and mail the reset link.
    pub async fn request_password_reset(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<String, LifecycleError> {
        let email = normalize_email(email);
        let account = self.store.find_by_username_or_email(&email).await?;

        let _guard = self.locks.lock(&account.id).await;
        let mut account = self.store.get_account(&account.id).await?;
        let token = self
            .vault
            .set_action_token(&mut account, TokenKind::PasswordReset, now);
        account.updated_at = now;
        self.store.save_account(&account).await?;

        let url = password_reset_url(&self.config.domain, &account.id, &token);
        send_best_effort(
            &self.mailer,
            password_reset_mail(&email, &account.fullname, &url),
        )
        .await;

        Ok(token)
    }

    /// Consume a password-reset token and install the new password. The
    /// token is removed inside the store's atomic section, so a concurrent
    /// double-spend has one winner.
    pub async fn reset_password(
        &self,
        account_id: &AccountId,
        token: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccountEvent>, LifecycleError> {
        let _guard = self.locks.lock(account_id).await;

        let account = self.store.get_account(account_id).await?;
        self.vault.validate_action_token(&account, token, now)?;

        match self.store.take_action_token(account_id, token).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => return Err(TokenError::Invalid.into()),
            Err(err) => return Err(err.into()),
        }

        let mut account = self.store.get_account(account_id).await?;
        account.password_hash = Some(folio_crypto::hash_password(new_password)?);
        account.updated_at = now;
        self.store.save_account(&account).await?;
        self.store.revoke_all_for_account(account_id).await?;

        let events = vec![AccountEvent::PasswordReset {
            account_id: account_id.clone(),
        }];
        publish_events(&self.events, &events).await;
        Ok(events)
    }

    /// Issue a claim token for an unregistered contributor and mail the
    /// claim link for the resource they were invited to.
    pub async fn send_claim_invitation(
        &self,
        account_id: &AccountId,
        resource_id: &ResourceId,
        now: DateTime<Utc>,
    ) -> Result<String, LifecycleError> {
        let _guard = self.locks.lock(account_id).await;

        let mut account = self.store.get_account(account_id).await?;
        if account.is_registered {
            return Err(LifecycleError::UserState(
                "account is already registered".to_string(),
            ));
        }

        let token = self.vault.set_action_token(&mut account, TokenKind::Claim, now);
        account.updated_at = now;
        self.store.save_account(&account).await?;

        let url = claim_url(&self.config.domain, account_id, resource_id, &token);
        send_best_effort(
            &self.mailer,
            claim_mail(&account.username, &account.fullname, &url),
        )
        .await;

        Ok(token)
    }

    /// Claim a shadow account: consume the claim token, set a password and
    /// complete registration under the invited address.
    pub async fn claim_account(
        &self,
        account_id: &AccountId,
        token: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccountEvent>, LifecycleError> {
        let _guard = self.locks.lock(account_id).await;

        let account = self.store.get_account(account_id).await?;
        if account.is_registered {
            return Err(LifecycleError::UserState(
                "account is already registered".to_string(),
            ));
        }
        self.vault.validate_action_token(&account, token, now)?;

        match self.store.take_action_token(account_id, token).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => return Err(TokenError::Invalid.into()),
            Err(err) => return Err(err.into()),
        }

        let mut account = self.store.get_account(account_id).await?;
        let email = normalize_email(&account.username);
        match self.store.find_confirmed_email(&email).await {
            Err(StoreError::NotFound) => {
                self.store
                    .add_confirmed_email(&ConfirmedEmail {
                        address: email,
                        account_id: account_id.clone(),
                        created_at: now,
                    })
                    .await?;
            }
            Ok(existing) if existing.account_id != *account_id => {
                return Err(LifecycleError::DuplicateEmail);
            }
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }

        account.password_hash = Some(folio_crypto::hash_password(password)?);
        account.is_registered = true;
        account.date_confirmed = Some(now);
        account.updated_at = now;
        self.store.save_account(&account).await?;

        reindex_account(&self.search, &account).await;

        let events = vec![AccountEvent::AccountRegistered {
            account_id: account_id.clone(),
        }];
        publish_events(&self.events, &events).await;
        Ok(events)
    }
}
