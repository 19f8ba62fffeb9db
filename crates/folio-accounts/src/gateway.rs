//! Authentication gateway.
//!
//! Accepts the front end's encrypted-then-signed payload, resolves a
//! credential proof and routes registration and institution provisioning.
//! The status decision table always runs last: a successful proof never
//! bypasses status gating.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use folio_crypto::{Nonce, SealKey};
use folio_storage::{normalize_email, Account, AccountId, Store, StoreError};

use crate::collab::TwoFactorVerifier;
use crate::config::EngineConfig;
use crate::error::{GatewayError, LoginFailure, StatusGate};
use crate::lifecycle::AccountStateMachine;
use crate::mailer::{institution_welcome_mail, send_best_effort, Mailer};

/// AAD binding sealed payloads to this gateway.
const GATEWAY_AAD: &[u8] = b"folio-gateway";

// ───────────────────────────────────── Request bodies ──────────────────────────────────

/// Post-decryption request body.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum AuthRequest {
    #[serde(rename = "LOGIN")]
    Login { user: LoginUser },
    #[serde(rename = "REGISTER")]
    Register { user: RegisterUser },
    #[serde(rename = "INSTITUTION_AUTHENTICATE")]
    InstitutionAuthenticate { provider: InstitutionProvider },
}

#[derive(Debug, Deserialize)]
pub struct LoginUser {
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(rename = "verificationKey", default)]
    pub verification_key: Option<String>,
    #[serde(rename = "oneTimePassword", default)]
    pub one_time_password: Option<String>,
    #[serde(rename = "remoteAuthenticated", default)]
    pub remote_authenticated: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub fullname: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub campaign: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InstitutionProvider {
    pub idp: String,
    pub id: String,
    pub user: InstitutionUser,
}

#[derive(Debug, Deserialize)]
pub struct InstitutionUser {
    pub username: String,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(rename = "givenName", default)]
    pub given_name: Option<String>,
    #[serde(rename = "familyName", default)]
    pub family_name: Option<String>,
    #[serde(rename = "middleNames", default)]
    pub middle_names: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
}

/// Wire envelope when payload protection is enabled: hex-encoded nonce,
/// AEAD ciphertext and an Ed25519 signature over the plaintext.
#[derive(Debug, Serialize, Deserialize)]
pub struct SealedEnvelope {
    pub nonce: String,
    pub ciphertext: String,
    pub signature: String,
}

/// Successful gateway outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    LoggedIn { account_id: AccountId },
    Registered { account_id: AccountId },
    InstitutionAuthenticated { account_id: AccountId, created: bool },
}

// ───────────────────────────────────── Status table ────────────────────────────────────

/// The status decision table. Returns `None` (pass) only when `active`;
/// otherwise the first matching row decides the failure.
pub fn status_gate(
    active: bool,
    claimed: bool,
    registered: bool,
    has_password: bool,
    merged: bool,
    disabled: bool,
) -> Option<StatusGate> {
    if active {
        return None;
    }
    if !claimed && !registered {
        return Some(if has_password {
            StatusGate::NotConfirmed
        } else {
            StatusGate::NotClaimed
        });
    }
    if claimed && registered && merged {
        return Some(StatusGate::Merged);
    }
    if claimed && !merged && disabled {
        return Some(StatusGate::Disabled);
    }
    Some(StatusGate::NotActive)
}

/// Evaluate the table against an account snapshot.
pub fn gate_for(account: &Account) -> Option<StatusGate> {
    status_gate(
        account.is_active(),
        account.is_claimed(),
        account.is_registered,
        account.has_usable_password(),
        account.is_merged(),
        account.is_disabled(),
    )
}

// ───────────────────────────────────── Gateway ─────────────────────────────────────────

/// Decrypts, authenticates and routes inbound authentication requests.
#[derive(Clone)]
pub struct AuthGateway {
    store: Arc<dyn Store>,
    lifecycle: AccountStateMachine,
    two_factor: Option<Arc<dyn TwoFactorVerifier>>,
    mailer: Option<Arc<dyn Mailer>>,
    config: Arc<EngineConfig>,
}

impl AuthGateway {
    pub fn new(
        store: Arc<dyn Store>,
        lifecycle: AccountStateMachine,
        two_factor: Option<Arc<dyn TwoFactorVerifier>>,
        mailer: Option<Arc<dyn Mailer>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            lifecycle,
            two_factor,
            mailer,
            config,
        }
    }

    /// Handle a raw request body: unseal if encryption is configured, parse
    /// and route.
    pub async fn handle(
        &self,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<AuthOutcome, GatewayError> {
        let plaintext = self.unseal(body)?;
        let request: AuthRequest =
            serde_json::from_slice(&plaintext).map_err(|_| GatewayError::InvalidRequest)?;

        match request {
            AuthRequest::Login { user } => self.login(user, now).await,
            AuthRequest::Register { user } => self.register(user, now).await,
            AuthRequest::InstitutionAuthenticate { provider } => {
                self.institution_authenticate(provider, now).await
            }
        }
    }

    /// With encryption disabled the body is plain JSON; otherwise decrypt,
    /// then verify the signature over the plaintext. Signature expiration is
    /// intentionally not enforced at this layer.
    fn unseal(&self, body: &[u8]) -> Result<Vec<u8>, GatewayError> {
        let Some(keys) = &self.config.gateway_keys else {
            return Ok(body.to_vec());
        };

        let envelope: SealedEnvelope =
            serde_json::from_slice(body).map_err(|_| GatewayError::AuthenticationFailed)?;
        let nonce: [u8; 24] = hex::decode(&envelope.nonce)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(GatewayError::AuthenticationFailed)?;
        let ciphertext =
            hex::decode(&envelope.ciphertext).map_err(|_| GatewayError::AuthenticationFailed)?;
        let signature =
            hex::decode(&envelope.signature).map_err(|_| GatewayError::AuthenticationFailed)?;

        let key = SealKey::from_bytes(&keys.seal_key);
        let plaintext = folio_crypto::open(&ciphertext, &Nonce(nonce), &key, GATEWAY_AAD)
            .map_err(|_| GatewayError::AuthenticationFailed)?;
        folio_crypto::verify_signature(&keys.verify_key, &plaintext, &signature)
            .map_err(|_| GatewayError::AuthenticationFailed)?;

        Ok(plaintext.to_vec())
    }

    /// Resolve the account and accept exactly one credential proof, tried in
    /// order: upstream-IdP trust, v1 verification key, password. Two-factor
    /// runs after the primary proof; the status table runs last.
    async fn login(&self, user: LoginUser, _now: DateTime<Utc>) -> Result<AuthOutcome, GatewayError> {
        let email = normalize_email(&user.email);
        let has_proof =
            user.remote_authenticated || user.verification_key.is_some() || user.password.is_some();
        if email.is_empty() || !has_proof {
            return Err(GatewayError::Login(LoginFailure::MissingCredentials));
        }

        let account = match self.store.find_by_username_or_email(&email).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                return Err(GatewayError::Login(LoginFailure::AccountNotFound));
            }
            Err(err) => return Err(err.into()),
        };

        if user.remote_authenticated {
            // Upstream identity provider already authenticated the user.
        } else if let Some(supplied) = &user.verification_key {
            let matches = account.verification_key.as_ref().is_some_and(|current| {
                folio_crypto::constant_time_eq(current.as_bytes(), supplied.as_bytes())
            });
            if !matches {
                return Err(GatewayError::Login(LoginFailure::InvalidVerificationKey));
            }
        } else if let Some(password) = &user.password {
            let matches = match &account.password_hash {
                Some(hash) => folio_crypto::verify_password(password, hash).unwrap_or(false),
                None => false,
            };
            if !matches {
                return Err(GatewayError::Login(LoginFailure::InvalidPassword));
            }
        }

        if account.two_factor_enabled {
            let code = user
                .one_time_password
                .as_deref()
                .ok_or(GatewayError::Login(LoginFailure::TwoFactorRequired))?;
            let valid = match &self.two_factor {
                Some(verifier) => verifier.verify(&account, code).await.unwrap_or(false),
                None => false,
            };
            if !valid {
                return Err(GatewayError::Login(LoginFailure::InvalidOneTimePassword));
            }
        }

        if let Some(gate) = gate_for(&account) {
            return Err(GatewayError::Login(LoginFailure::Gate(gate)));
        }

        Ok(AuthOutcome::LoggedIn {
            account_id: account.id,
        })
    }

    async fn register(
        &self,
        user: RegisterUser,
        now: DateTime<Utc>,
    ) -> Result<AuthOutcome, GatewayError> {
        match self
            .lifecycle
            .create_unconfirmed(
                &user.email,
                &user.password,
                &user.fullname,
                user.campaign.as_deref(),
                now,
            )
            .await
        {
            Ok((account, _events)) => Ok(AuthOutcome::Registered {
                account_id: account.id,
            }),
            Err(crate::error::LifecycleError::DuplicateEmail) => {
                Err(GatewayError::AlreadyRegistered)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Get-or-create an account keyed by the institution-supplied username.
    /// The institution is the trust root: accounts are registered
    /// immediately, with no email confirmation, password or two-factor.
    async fn institution_authenticate(
        &self,
        provider: InstitutionProvider,
        now: DateTime<Utc>,
    ) -> Result<AuthOutcome, GatewayError> {
        let institution = match self
            .store
            .find_institution_by_identifier(&provider.idp)
            .await
        {
            Ok(institution) => institution,
            Err(StoreError::NotFound) => return Err(GatewayError::InvalidRequest),
            Err(err) => return Err(err.into()),
        };

        let username = normalize_email(&provider.user.username);
        if username.is_empty() {
            return Err(GatewayError::InvalidRequest);
        }

        let (mut account, created) = match self.store.find_by_username_or_email(&username).await {
            Ok(account) => (account, false),
            Err(StoreError::NotFound) => {
                let fullname = institution_fullname(&provider.user, &username);
                let mut account = Account::new_unconfirmed(&username, &fullname, now);
                account.given_name = provider.user.given_name.clone();
                account.middle_names = provider.user.middle_names.clone();
                account.family_name = provider.user.family_name.clone();
                account.suffix = provider.user.suffix.clone();
                account.date_confirmed = Some(now);
                self.store.insert_account(&account).await?;
                (account, true)
            }
            Err(err) => return Err(err.into()),
        };

        // Idempotently ensure the affiliation.
        if account.affiliated_institutions.insert(institution.id.clone()) {
            account.updated_at = now;
            self.store.save_account(&account).await?;
        }

        if created {
            send_best_effort(
                &self.mailer,
                institution_welcome_mail(&username, &account.fullname, &institution.name),
            )
            .await;
        }

        Ok(AuthOutcome::InstitutionAuthenticated {
            account_id: account.id,
            created,
        })
    }
}

/// Name fallback chain for institution provisioning: supplied full name,
/// then composed given/family name, then the username.
fn institution_fullname(user: &InstitutionUser, username: &str) -> String {
    if let Some(fullname) = user.fullname.as_deref().filter(|name| !name.is_empty()) {
        return fullname.to_string();
    }
    match (user.given_name.as_deref(), user.family_name.as_deref()) {
        (Some(given), Some(family)) => format!("{} {}", given, family),
        (Some(given), None) => given.to_string(),
        (None, Some(family)) => family.to_string(),
        (None, None) => username.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference rendition of the decision table, row by row.
    fn expected(
        active: bool,
        claimed: bool,
        registered: bool,
        has_password: bool,
        merged: bool,
        disabled: bool,
    ) -> Option<StatusGate> {
        if active {
            None
        } else if !claimed && !registered && !has_password {
            Some(StatusGate::NotClaimed)
        } else if !claimed && !registered && has_password {
            Some(StatusGate::NotConfirmed)
        } else if claimed && registered && merged {
            Some(StatusGate::Merged)
        } else if claimed && !merged && disabled {
            Some(StatusGate::Disabled)
        } else {
            Some(StatusGate::NotActive)
        }
    }

    #[test]
    fn test_status_table_exhaustive() {
        for bits in 0..64u32 {
            let active = bits & 1 != 0;
            let claimed = bits & 2 != 0;
            let registered = bits & 4 != 0;
            let has_password = bits & 8 != 0;
            let merged = bits & 16 != 0;
            let disabled = bits & 32 != 0;

            assert_eq!(
                status_gate(active, claimed, registered, has_password, merged, disabled),
                expected(active, claimed, registered, has_password, merged, disabled),
                "combination {:06b}",
                bits
            );
        }
    }

    #[test]
    fn test_pass_only_when_active() {
        for bits in 0..32u32 {
            let claimed = bits & 1 != 0;
            let registered = bits & 2 != 0;
            let has_password = bits & 4 != 0;
            let merged = bits & 8 != 0;
            let disabled = bits & 16 != 0;
            assert!(status_gate(false, claimed, registered, has_password, merged, disabled)
                .is_some());
        }
        assert_eq!(status_gate(true, true, true, true, false, false), None);
    }

    #[test]
    fn test_institution_fullname_fallback_chain() {
        let mut user = InstitutionUser {
            username: "u@example.edu".to_string(),
            fullname: Some("Full Name".to_string()),
            given_name: Some("Given".to_string()),
            family_name: Some("Family".to_string()),
            middle_names: None,
            suffix: None,
        };
        assert_eq!(institution_fullname(&user, "u@example.edu"), "Full Name");

        user.fullname = None;
        assert_eq!(institution_fullname(&user, "u@example.edu"), "Given Family");

        user.given_name = None;
        assert_eq!(institution_fullname(&user, "u@example.edu"), "Family");

        user.family_name = None;
        assert_eq!(institution_fullname(&user, "u@example.edu"), "u@example.edu");
    }

    #[test]
    fn test_request_parsing_field_names() {
        let body = serde_json::json!({
            "type": "LOGIN",
            "user": {
                "email": "ada@example.com",
                "verificationKey": "vk",
                "oneTimePassword": "123456",
                "remoteAuthenticated": false
            }
        });
        let request: AuthRequest = serde_json::from_value(body).unwrap();
        match request {
            AuthRequest::Login { user } => {
                assert_eq!(user.verification_key.as_deref(), Some("vk"));
                assert_eq!(user.one_time_password.as_deref(), Some("123456"));
                assert!(!user.remote_authenticated);
                assert!(user.password.is_none());
            }
            _ => panic!("expected LOGIN"),
        }
    }

    #[test]
    fn test_unknown_request_type_is_invalid() {
        let body = serde_json::json!({"type": "LOGOUT", "user": {}});
        assert!(serde_json::from_value::<AuthRequest>(body).is_err());
    }
}
