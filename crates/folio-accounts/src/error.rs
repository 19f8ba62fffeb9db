//! Error taxonomy for the account engine.
//!
//! Every failure surfaces to the caller as a typed error; the only swallowed
//! failures are best-effort side effects (outbound mail, search reindex,
//! optional mailing-list unsubscribe), which are logged at the call site.

use thiserror::Error;

use folio_storage::{AccountId, IdentityStatus, StoreError};

/// Verification-token failures. Recoverable by the caller through a forced
/// renewal; never silently treated as valid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("expired token")]
    Expired,
}

/// External-identity linking failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity already verified on another account")]
    AlreadyVerifiedElsewhere,
    #[error("cannot downgrade identity status from {from:?} to {to:?}")]
    NonMonotonicPromotion {
        from: IdentityStatus,
        to: IdentityStatus,
    },
    #[error("identity was never claimed on this account")]
    NotClaimed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Merge failures. `Conflict` is unrecoverable without manual intervention;
/// `MaxRetries` aborts the merge with no partial move committed for the
/// failing file. Steps committed before the failing step are not rolled
/// back; callers own the transaction boundary.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot merge an account into itself")]
    SelfMerge,
    #[error("integration '{0}' on the source account cannot be merged")]
    Conflict(String),
    #[error("rename attempts exhausted for file '{0}'")]
    MaxRetries(String),
    #[error("source account is already merged into a different account")]
    AlreadyMergedElsewhere,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Email-registry failures.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("email is already confirmed on this account")]
    AlreadyConfirmed,
    /// The address is confirmed on another account. Recoverable: the caller
    /// re-runs the confirmation with an explicit merge opt-in.
    #[error("confirming this email requires merging account {other:?} into {this:?}")]
    MergeConfirmationRequired { this: AccountId, other: AccountId },
    #[error("the primary email address cannot be removed")]
    CannotRemovePrimaryEmail,
    #[error("email not found")]
    EmailNotFound,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Account state-machine failures.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("an account with this email already exists")]
    DuplicateEmail,
    /// The account's state forbids the operation (GDPR erasure guards).
    #[error("account state does not allow this operation: {0}")]
    UserState(String),
    #[error("mailing list unsubscribe failed: {0}")]
    MailingList(String),
    #[error("password hashing failed")]
    PasswordHash(#[from] folio_crypto::KdfError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A login rejection. Credential failures are distinct per failed proof;
/// status-gating failures are always evaluated last and never
/// short-circuited by a successful proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoginFailure {
    #[error("no usable credentials supplied")]
    MissingCredentials,
    #[error("no account matches the supplied identifier")]
    AccountNotFound,
    #[error("verification key mismatch")]
    InvalidVerificationKey,
    #[error("password mismatch")]
    InvalidPassword,
    #[error("a one-time password is required")]
    TwoFactorRequired,
    #[error("one-time password mismatch")]
    InvalidOneTimePassword,
    #[error("account status forbids login")]
    Gate(StatusGate),
}

/// Outcome of the status decision table for an inactive account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusGate {
    NotClaimed,
    NotConfirmed,
    Merged,
    Disabled,
    NotActive,
}

impl StatusGate {
    pub fn code(&self) -> &'static str {
        match self {
            StatusGate::NotClaimed => "USER_NOT_CLAIMED",
            StatusGate::NotConfirmed => "USER_NOT_CONFIRMED",
            StatusGate::Merged => "USER_MERGED",
            StatusGate::Disabled => "USER_DISABLED",
            StatusGate::NotActive => "USER_NOT_ACTIVE",
        }
    }
}

impl LoginFailure {
    /// Stable wire code for the front end.
    pub fn code(&self) -> &'static str {
        match self {
            LoginFailure::MissingCredentials => "MISSING_CREDENTIALS",
            LoginFailure::AccountNotFound => "ACCOUNT_NOT_FOUND",
            LoginFailure::InvalidVerificationKey => "INVALID_VERIFICATION_KEY",
            LoginFailure::InvalidPassword => "INVALID_PASSWORD",
            LoginFailure::TwoFactorRequired => "TWO_FACTOR_AUTHENTICATION_REQUIRED",
            LoginFailure::InvalidOneTimePassword => "INVALID_ONE_TIME_PASSWORD",
            LoginFailure::Gate(gate) => gate.code(),
        }
    }
}

/// Authentication-gateway failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Envelope decryption or signature verification failed.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// The decrypted body is not a recognizable request.
    #[error("invalid request")]
    InvalidRequest,
    #[error("login rejected: {0}")]
    Login(LoginFailure),
    #[error("email already registered")]
    AlreadyRegistered,
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Stable wire code for the front end, where one exists.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            GatewayError::Login(failure) => Some(failure.code()),
            GatewayError::AlreadyRegistered => Some("ALREADY_REGISTERED"),
            GatewayError::InvalidRequest => Some("INVALID_REQUEST"),
            _ => None,
        }
    }
}
