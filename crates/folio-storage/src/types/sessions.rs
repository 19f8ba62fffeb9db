//! Live session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, SessionId};

/// A live session. Only existence matters to the engine: disable, merge and
/// GDPR erasure revoke every live session of the affected account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
}
