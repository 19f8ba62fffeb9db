//! Email registry: global uniqueness of confirmed addresses and
//! pending-confirmation bookkeeping.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use folio_events::{AccountEvent, EventBus};
use folio_storage::{
    normalize_email, Account, AccountId, ConfirmedEmail, ExternalIdentityClaim, Store, StoreError,
};

use crate::collab::publish_events;
use crate::config::EngineConfig;
use crate::error::{RegistryError, TokenError};
use crate::identity::ExternalIdentityLinker;
use crate::locks::AccountLocks;
use crate::mailer::{confirmation_mail, send_best_effort, Mailer};
use crate::merge::MergeEngine;
use crate::urls::confirmation_url;
use crate::vault::TokenVault;

/// Manages confirmed and pending email addresses.
#[derive(Clone)]
pub struct EmailRegistry {
    store: Arc<dyn Store>,
    vault: TokenVault,
    merge: MergeEngine,
    linker: ExternalIdentityLinker,
    locks: Arc<AccountLocks>,
    mailer: Option<Arc<dyn Mailer>>,
    events: Option<Arc<dyn EventBus>>,
    config: Arc<EngineConfig>,
}

impl EmailRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        vault: TokenVault,
        merge: MergeEngine,
        linker: ExternalIdentityLinker,
        locks: Arc<AccountLocks>,
        mailer: Option<Arc<dyn Mailer>>,
        events: Option<Arc<dyn EventBus>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            vault,
            merge,
            linker,
            locks,
            mailer,
            events,
            config,
        }
    }

    /// Register a pending verification for `email` on the account. Fails
    /// `AlreadyConfirmed` if the address is already a confirmed address of
    /// this account, unless an external-identity context is present (which
    /// allows re-verification flows). The caller persists the account.
    pub async fn add_unconfirmed(
        &self,
        account: &mut Account,
        email: &str,
        external_identity: Option<ExternalIdentityClaim>,
        now: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        let email = normalize_email(email);

        if external_identity.is_none() {
            let own_primary =
                normalize_email(&account.username) == email && account.is_confirmed();
            let own_confirmed = self
                .store
                .emails_for_account(&account.id)
                .await?
                .iter()
                .any(|confirmed| confirmed.address == email);
            if own_primary || own_confirmed {
                return Err(RegistryError::AlreadyConfirmed);
            }
        }

        Ok(self.vault.add_pending(account, &email, external_identity, now))
    }

    /// Confirm a pending verification token.
    ///
    /// If another account has already confirmed the same address, the
    /// confirmation fails with `MergeConfirmationRequired` unless the caller
    /// opted into merging, in which case the other account is merged into
    /// this one. An account whose username equals the address but which was
    /// never fully registered (a shadow account from an
    /// unregistered-contributor invitation) is merged automatically, without
    /// an opt-in; that asymmetry matches the observed production behavior.
    ///
    /// Only when the address equals the account's own username does
    /// confirmation complete full registration.
    pub async fn confirm(
        &self,
        account_id: &AccountId,
        token: &str,
        merge_opt_in: bool,
        now: DateTime<Utc>,
    ) -> Result<(String, Vec<AccountEvent>), RegistryError> {
        let account = self.store.get_account(account_id).await?;
        let pending = self.vault.validate(&account, token, now)?.clone();
        let email = normalize_email(&pending.email);

        let mut events = Vec::new();

        // Collision and shadow handling run before this account's lock is
        // taken: the merge acquires the pair lock itself.
        match self.store.find_confirmed_email(&email).await {
            Ok(existing) if existing.account_id != *account_id => {
                if !merge_opt_in {
                    return Err(RegistryError::MergeConfirmationRequired {
                        this: account_id.clone(),
                        other: existing.account_id,
                    });
                }
                events.extend(
                    self.merge
                        .merge(&existing.account_id, account_id, now)
                        .await?,
                );
            }
            Ok(_) => {}
            Err(StoreError::NotFound) => match self.store.find_by_username(&email).await {
                Ok(shadow) if shadow.id != *account_id && !shadow.is_registered => {
                    info!(shadow = %shadow.id.0, claimer = %account_id.0, "claim converts shadow account");
                    events.extend(self.merge.merge(&shadow.id, account_id, now).await?);
                }
                Ok(_) => {}
                Err(StoreError::NotFound) => {}
                Err(err) => return Err(err.into()),
            },
            Err(err) => return Err(err.into()),
        }

        let _guard = self.locks.lock(account_id).await;

        // Consume the token: presence is re-checked inside the store's
        // atomic section, so a concurrent double-spend has one winner and
        // the loser sees InvalidToken.
        match self.store.take_pending_verification(account_id, token).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => return Err(TokenError::Invalid.into()),
            Err(err) => return Err(err.into()),
        }

        let mut account = self.store.get_account(account_id).await?;
        self.vault.clean_expired(&mut account, now);

        match self.store.find_confirmed_email(&email).await {
            Err(StoreError::NotFound) => {
                self.store
                    .add_confirmed_email(&ConfirmedEmail {
                        address: email.clone(),
                        account_id: account_id.clone(),
                        created_at: now,
                    })
                    .await?;
            }
            Ok(_) => {} // transferred here by the merge above
            Err(err) => return Err(err.into()),
        }
        events.push(AccountEvent::EmailConfirmed {
            account_id: account_id.clone(),
            email: email.clone(),
        });

        // A verification initiated by an external-identity flow marks the
        // claimed identity VERIFIED along with the address.
        if let Some(claim) = &pending.external_identity {
            events.extend(
                self.linker
                    .claim(
                        &mut account,
                        &claim.provider,
                        &claim.external_id,
                        folio_storage::IdentityStatus::Verified,
                    )
                    .await?,
            );
        }

        if normalize_email(&account.username) == email && !account.is_confirmed() {
            account.is_registered = true;
            account.date_confirmed = Some(now);
            events.push(AccountEvent::AccountRegistered {
                account_id: account_id.clone(),
            });
        }

        account.updated_at = now;
        self.store.save_account(&account).await?;

        let own_events: Vec<AccountEvent> = events
            .iter()
            .filter(|event| !matches!(event, AccountEvent::AccountsMerged { .. }))
            .cloned()
            .collect();
        publish_events(&self.events, &own_events).await;

        Ok((email, events))
    }

    /// Issue a fresh token for `email` and send a new confirmation mail.
    pub async fn resend_confirmation(
        &self,
        account_id: &AccountId,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        let email = normalize_email(email);
        let _guard = self.locks.lock(account_id).await;

        let mut account = self.store.get_account(account_id).await?;
        let token = self
            .vault
            .force_renew(&mut account, &email, now)
            .ok_or(RegistryError::EmailNotFound)?;
        account.updated_at = now;
        self.store.save_account(&account).await?;

        let url = confirmation_url(&self.config.domain, account_id, &token, None);
        send_best_effort(
            &self.mailer,
            confirmation_mail(&email, &account.fullname, &url),
        )
        .await;

        Ok(token)
    }

    /// Build the confirmation URL for a pending address. With `force`, an
    /// expired token is renewed in place (the caller persists the account);
    /// without it, an expired token surfaces as `ExpiredToken`.
    pub fn confirmation_url_for(
        &self,
        account: &mut Account,
        email: &str,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<String, RegistryError> {
        let email = normalize_email(email);
        let entry = account
            .email_verifications
            .iter()
            .find(|(_, pending)| normalize_email(&pending.email) == email)
            .map(|(token, pending)| (token.clone(), pending.expires));

        let (token, expires) = entry.ok_or(RegistryError::EmailNotFound)?;
        let live = matches!(expires, Some(expires) if now <= expires);

        let token = if live {
            token
        } else if force {
            self.vault
                .force_renew(account, &email, now)
                .ok_or(RegistryError::EmailNotFound)?
        } else {
            return Err(TokenError::Expired.into());
        };

        Ok(confirmation_url(&self.config.domain, &account.id, &token, None))
    }

    /// Remove a confirmed address. The primary address, and the account's
    /// sole confirmed address, cannot be removed.
    pub async fn remove_email(
        &self,
        account_id: &AccountId,
        address: &str,
    ) -> Result<(), RegistryError> {
        let address = normalize_email(address);
        let _guard = self.locks.lock(account_id).await;

        let account = self.store.get_account(account_id).await?;
        if normalize_email(&account.username) == address {
            return Err(RegistryError::CannotRemovePrimaryEmail);
        }

        let existing = match self.store.find_confirmed_email(&address).await {
            Ok(existing) if existing.account_id == *account_id => existing,
            Ok(_) | Err(StoreError::NotFound) => return Err(RegistryError::EmailNotFound),
            Err(err) => return Err(err.into()),
        };

        let owned = self.store.emails_for_account(account_id).await?;
        if owned.len() <= 1 {
            return Err(RegistryError::CannotRemovePrimaryEmail);
        }

        self.store.remove_confirmed_email(&existing.address).await?;
        Ok(())
    }
}
