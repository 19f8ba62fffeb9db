//! Account identity and merge engine for a multi-tenant research platform.
//!
//! The engine owns the account state machine, the time-limited verification
//! token subsystem, external-identity linking, the authentication gateway
//! and the merge algorithm that consolidates two accounts while preserving
//! referential integrity. Transport, persistence technology, mail delivery,
//! search indexing and third-party integrations stay behind narrow traits.

pub mod collab;
pub mod config;
mod engine;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod lifecycle;
pub mod locks;
pub mod mailer;
pub mod merge;
pub mod registry;
pub mod urls;
pub mod vault;

pub use engine::{AccountEngine, Collaborators};

#[cfg(test)]
mod tests;
