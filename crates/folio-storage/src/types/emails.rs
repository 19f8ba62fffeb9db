//! Confirmed email addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AccountId;

/// A confirmed email address. The address is globally unique among confirmed
/// emails and owned by exactly one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedEmail {
    /// Normalized (lowercased, trimmed) address.
    pub address: String,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
}

/// Normalize an email address before any comparison or storage.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_trims() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
        assert_eq!(normalize_email("plain@example.com"), "plain@example.com");
    }
}
