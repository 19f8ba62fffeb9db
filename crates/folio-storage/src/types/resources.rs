//! Resource and preprint records, as narrow as the account engine needs them.
//!
//! Project/registration/preprint domain logic lives elsewhere; the engine
//! only consumes these through ownership-transfer contracts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, PreprintId, ResourceId};

/// Kind of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    Project,
    /// A frozen registration of a project; blocks GDPR erasure.
    Registration,
}

/// Resource record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub title: String,
    pub kind: ResourceKind,
    pub is_public: bool,
    /// Soft-deletion timestamp; the row persists.
    pub deleted: Option<DateTime<Utc>>,
    pub creator: AccountId,
}

/// Preprint record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preprint {
    pub id: PreprintId,
    pub title: String,
    /// Once a preprint has ever been public, its contributors cannot be
    /// GDPR-erased.
    pub ever_public: bool,
}
