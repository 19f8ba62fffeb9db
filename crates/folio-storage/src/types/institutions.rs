//! Institution records.

use serde::{Deserialize, Serialize};

use super::InstitutionId;

/// An institution known to the platform, keyed for SSO by its entity
/// identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
    /// SSO entity identifier supplied by the identity provider.
    pub identifier: String,
}
