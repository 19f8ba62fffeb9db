//! Contributor rows and their permission levels.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::AccountId;

/// Permission a contributor holds on a resource or preprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Admin,
    Write,
    Read,
}

/// Error type for parsing Permission from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePermissionError(pub String);

impl std::fmt::Display for ParsePermissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid permission: {}", self.0)
    }
}

impl std::error::Error for ParsePermissionError {}

impl FromStr for Permission {
    type Err = ParsePermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Permission::Admin),
            "write" => Ok(Permission::Write),
            "read" => Ok(Permission::Read),
            _ => Err(ParsePermissionError(s.to_string())),
        }
    }
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Admin => "admin",
            Permission::Write => "write",
            Permission::Read => "read",
        }
    }

    /// Check if this permission grants at least what another permission does
    pub fn includes(&self, other: &Permission) -> bool {
        match self {
            Permission::Admin => true, // Admin includes all permissions
            Permission::Write => matches!(other, Permission::Write | Permission::Read),
            Permission::Read => matches!(other, Permission::Read),
        }
    }

    /// The stronger of two permissions (used when contributor rows collide
    /// during an account merge).
    pub fn max(self, other: Permission) -> Permission {
        if self.includes(&other) {
            self
        } else {
            other
        }
    }
}

/// A contributor row on a resource or preprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub account_id: AccountId,
    pub permission: Permission,
    /// Whether the contributor appears in the public contributor list.
    pub visible: bool,
}
