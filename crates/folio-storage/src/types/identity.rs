//! External-identity claim types (federated/institutional identities).

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of an external-identity claim on an account.
///
/// The upgrade path is strictly `Create → Link → Verified`; downgrades are
/// rejected by the linker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityStatus {
    /// The identity was asserted during account creation and is unverified.
    Create,
    /// The identity was linked to an existing account and is unverified.
    Link,
    /// The identity has been verified by its provider.
    Verified,
}

/// Error type for parsing IdentityStatus from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdentityStatusError(pub String);

impl std::fmt::Display for ParseIdentityStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid identity status: {}", self.0)
    }
}

impl std::error::Error for ParseIdentityStatusError {}

impl FromStr for IdentityStatus {
    type Err = ParseIdentityStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(IdentityStatus::Create),
            "LINK" => Ok(IdentityStatus::Link),
            "VERIFIED" => Ok(IdentityStatus::Verified),
            _ => Err(ParseIdentityStatusError(s.to_string())),
        }
    }
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Create => "CREATE",
            IdentityStatus::Link => "LINK",
            IdentityStatus::Verified => "VERIFIED",
        }
    }

    /// Position on the upgrade path; higher rank supersedes lower on merge.
    pub fn rank(&self) -> u8 {
        match self {
            IdentityStatus::Create => 0,
            IdentityStatus::Link => 1,
            IdentityStatus::Verified => 2,
        }
    }
}

/// A `(provider, external id)` tuple, e.g. `("orcid", "0000-0001-...")`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalIdentityClaim {
    pub provider: String,
    pub external_id: String,
}
