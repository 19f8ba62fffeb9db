//! Time-limited, single-purpose verification tokens.
//!
//! Pending email verifications live in the account's token map; the v2
//! action token backs password-reset and claim flows. Garbage collection is
//! lazy: expired entries are pruned only when touched, and a successful
//! clean removes every token found expired at that moment.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use folio_storage::{Account, ActionToken, ExternalIdentityClaim, PendingEmail};

use crate::config::EngineConfig;
use crate::error::TokenError;

/// Purpose of an issued token; the TTL is kind-dependent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Confirmation,
    PasswordReset,
    Claim,
}

/// Issues and validates verification tokens.
#[derive(Clone)]
pub struct TokenVault {
    config: Arc<EngineConfig>,
}

impl TokenVault {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    fn ttl(&self, kind: TokenKind) -> chrono::Duration {
        match kind {
            TokenKind::Confirmation => self.config.confirmation_ttl(),
            TokenKind::PasswordReset => self.config.password_reset_ttl(),
            TokenKind::Claim => self.config.claim_ttl(),
        }
    }

    /// Issue a fresh token of the given kind.
    pub fn issue(&self, kind: TokenKind, now: DateTime<Utc>) -> ActionToken {
        ActionToken {
            token: folio_crypto::generate_token(),
            expires: now + self.ttl(kind),
        }
    }

    /// Add a pending verification for `email`, superseding any existing
    /// entry for the same address (a refresh replaces rather than
    /// duplicates). Returns the new token.
    pub fn add_pending(
        &self,
        account: &mut Account,
        email: &str,
        external_identity: Option<ExternalIdentityClaim>,
        now: DateTime<Utc>,
    ) -> String {
        account
            .email_verifications
            .retain(|_, pending| pending.email != email);

        let issued = self.issue(TokenKind::Confirmation, now);
        account.email_verifications.insert(
            issued.token.clone(),
            PendingEmail {
                email: email.to_string(),
                confirmed: false,
                expires: Some(issued.expires),
                external_identity,
            },
        );
        issued.token
    }

    /// Look up a pending verification. Read-only and idempotent: fails
    /// `Invalid` if the token is absent, `Expired` if past its expiration.
    /// An entry without an expiration is treated as expired.
    pub fn validate<'a>(
        &self,
        account: &'a Account,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<&'a PendingEmail, TokenError> {
        let pending = account
            .email_verifications
            .get(token)
            .ok_or(TokenError::Invalid)?;
        match pending.expires {
            Some(expires) if now <= expires => Ok(pending),
            _ => Err(TokenError::Expired),
        }
    }

    /// Issue a fresh token for `email`, superseding the existing entry and
    /// preserving its external-identity context. Returns `None` if no entry
    /// for the address exists.
    pub fn force_renew(
        &self,
        account: &mut Account,
        email: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let context = account
            .email_verifications
            .values()
            .find(|pending| pending.email == email)?
            .external_identity
            .clone();
        Some(self.add_pending(account, email, context, now))
    }

    /// Remove every token found expired at this moment. Returns how many
    /// entries were pruned.
    pub fn clean_expired(&self, account: &mut Account, now: DateTime<Utc>) -> usize {
        let before = account.email_verifications.len();
        account
            .email_verifications
            .retain(|_, pending| matches!(pending.expires, Some(expires) if now <= expires));
        before - account.email_verifications.len()
    }

    /// Install a fresh v2 action token, superseding any previous one.
    pub fn set_action_token(
        &self,
        account: &mut Account,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> String {
        let issued = self.issue(kind, now);
        let token = issued.token.clone();
        account.action_token = Some(issued);
        token
    }

    /// Check the v2 action token without consuming it.
    pub fn validate_action_token(
        &self,
        account: &Account,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        let current = account.action_token.as_ref().ok_or(TokenError::Invalid)?;
        if !folio_crypto::constant_time_eq(current.token.as_bytes(), token.as_bytes()) {
            return Err(TokenError::Invalid);
        }
        if now > current.expires {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}
