//! Account record — the identity root.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, ExternalAccountId, ExternalIdentityClaim, IdentityStatus, InstitutionId};

/// A time-limited action token (v2): backs password-reset and claim flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionToken {
    pub token: String,
    pub expires: DateTime<Utc>,
}

/// A pending email-verification entry, keyed by its token in
/// [`Account::email_verifications`].
///
/// Entries without an expiration are treated as expired (fail safe).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEmail {
    pub email: String,
    pub confirmed: bool,
    pub expires: Option<DateTime<Utc>>,
    /// Present when the verification was initiated by an external-identity
    /// flow; allows re-verification of an already-confirmed address.
    pub external_identity: Option<ExternalIdentityClaim>,
}

/// An employment entry in the account profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub institution: String,
    pub title: Option<String>,
    pub ongoing: bool,
}

/// An education entry in the account profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolRecord {
    pub institution: String,
    pub degree: Option<String>,
    pub ongoing: bool,
}

/// Account record.
///
/// Accounts are never hard-deleted: GDPR erasure scrubs PII fields in place
/// and the row persists for referential integrity of content it still
/// nominally owns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Primary email address, or a placeholder once merged.
    pub username: String,
    pub password_hash: Option<String>,
    /// Short-lived v1 session-login token.
    pub verification_key: Option<String>,
    /// v2 action token used by password-reset and claim flows.
    pub action_token: Option<ActionToken>,
    /// Pending email verifications, keyed by token.
    pub email_verifications: BTreeMap<String, PendingEmail>,
    /// provider → external id → claim status.
    pub external_identities: BTreeMap<String, BTreeMap<String, IdentityStatus>>,

    pub is_registered: bool,
    pub is_invited: bool,
    pub is_superuser: bool,
    pub is_staff: bool,

    pub date_confirmed: Option<DateTime<Utc>>,
    pub date_disabled: Option<DateTime<Utc>>,
    pub deleted: Option<DateTime<Utc>>,
    /// Set once by the merge engine, never cleared.
    pub merged_into: Option<AccountId>,

    pub system_tags: BTreeSet<String>,

    pub fullname: String,
    pub given_name: Option<String>,
    pub middle_names: Option<String>,
    pub family_name: Option<String>,
    pub suffix: Option<String>,
    pub jobs: Vec<JobRecord>,
    pub schools: Vec<SchoolRecord>,
    pub social: BTreeMap<String, String>,

    /// Invitation bookkeeping for content attributed before registration.
    pub unclaimed_records: BTreeMap<String, serde_json::Value>,
    pub security_messages: BTreeMap<String, DateTime<Utc>>,
    pub notifications_configured: BTreeMap<String, bool>,
    /// list name → subscribed.
    pub mailing_lists: BTreeMap<String, bool>,
    pub comments_viewed_timestamp: BTreeMap<String, DateTime<Utc>>,

    pub affiliated_institutions: BTreeSet<InstitutionId>,
    /// Attached OAuth provider accounts.
    pub external_accounts: BTreeSet<ExternalAccountId>,

    pub two_factor_enabled: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A self-registered account awaiting email confirmation. Registration
    /// completes (and `is_registered` flips on) when the address is
    /// confirmed.
    pub fn new_unconfirmed(username: &str, fullname: &str, now: DateTime<Utc>) -> Self {
        let mut account = Self::blank(now);
        account.username = username.to_string();
        account.fullname = fullname.to_string();
        account
    }

    /// A shadow account created when inviting an unregistered contributor.
    /// Its username is the invited email; it is subsumed when that email is
    /// claimed or confirmed.
    pub fn new_unregistered(email: &str, fullname: &str, now: DateTime<Utc>) -> Self {
        let mut account = Self::blank(now);
        account.username = email.to_string();
        account.fullname = fullname.to_string();
        account.is_invited = true;
        account
    }

    fn blank(now: DateTime<Utc>) -> Self {
        Account {
            id: AccountId(Uuid::new_v4()),
            username: String::new(),
            password_hash: None,
            verification_key: None,
            action_token: None,
            email_verifications: BTreeMap::new(),
            external_identities: BTreeMap::new(),
            is_registered: false,
            is_invited: false,
            is_superuser: false,
            is_staff: false,
            date_confirmed: None,
            date_disabled: None,
            deleted: None,
            merged_into: None,
            system_tags: BTreeSet::new(),
            fullname: String::new(),
            given_name: None,
            middle_names: None,
            family_name: None,
            suffix: None,
            jobs: Vec::new(),
            schools: Vec::new(),
            social: BTreeMap::new(),
            unclaimed_records: BTreeMap::new(),
            security_messages: BTreeMap::new(),
            notifications_configured: BTreeMap::new(),
            mailing_lists: BTreeMap::new(),
            comments_viewed_timestamp: BTreeMap::new(),
            affiliated_institutions: BTreeSet::new(),
            external_accounts: BTreeSet::new(),
            two_factor_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.date_confirmed.is_some()
    }

    pub fn is_merged(&self) -> bool {
        self.merged_into.is_some()
    }

    pub fn is_disabled(&self) -> bool {
        self.date_disabled.is_some()
    }

    pub fn has_usable_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Whether the account has been claimed by a person: it carries a
    /// confirmation date. Merged and disabled accounts stay claimed.
    pub fn is_claimed(&self) -> bool {
        self.date_confirmed.is_some()
    }

    /// Derived state: the account can log in.
    pub fn is_active(&self) -> bool {
        self.is_registered
            && self.is_confirmed()
            && self.has_usable_password()
            && !self.is_merged()
            && !self.is_disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_unconfirmed_account_is_not_active() {
        let account = Account::new_unconfirmed("ada@example.com", "Ada Lovelace", now());
        assert!(!account.is_registered);
        assert!(!account.is_confirmed());
        assert!(!account.is_active());
    }

    #[test]
    fn test_unregistered_account_is_invited() {
        let account = Account::new_unregistered("guest@example.com", "Guest", now());
        assert!(account.is_invited);
        assert!(!account.is_registered);
        assert!(!account.is_claimed());
    }

    #[test]
    fn test_active_requires_all_conditions() {
        let mut account = Account::new_unconfirmed("ada@example.com", "Ada Lovelace", now());
        account.password_hash = Some("hash".to_string());
        account.is_registered = true;
        account.date_confirmed = Some(now());
        assert!(account.is_active());

        account.date_disabled = Some(now());
        assert!(!account.is_active());
        account.date_disabled = None;

        account.merged_into = Some(AccountId(Uuid::new_v4()));
        assert!(!account.is_active());
    }

    #[test]
    fn test_merged_account_stays_claimed() {
        let mut account = Account::new_unconfirmed("ada@example.com", "Ada Lovelace", now());
        account.date_confirmed = Some(now());
        account.merged_into = Some(AccountId(Uuid::new_v4()));
        assert!(account.is_claimed());
        assert!(!account.is_active());
    }
}
