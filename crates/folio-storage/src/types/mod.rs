//! Type definitions for folio storage.

mod accounts;
mod collections;
mod contributors;
mod emails;
mod files;
mod groups;
mod identity;
mod ids;
mod institutions;
mod integrations;
mod resources;
mod sessions;

// Re-export all types from submodules
pub use accounts::*;
pub use collections::*;
pub use contributors::*;
pub use emails::*;
pub use files::*;
pub use groups::*;
pub use identity::*;
pub use ids::*;
pub use institutions::*;
pub use integrations::*;
pub use resources::*;
pub use sessions::*;
