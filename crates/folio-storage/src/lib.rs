//! Storage abstraction for folio.
//!
//! Backend crates (e.g., folio-store-memory) implement the repository traits
//! in [`store`] so the account engine doesn't depend on any specific database
//! engine or schema details. Domain records live in [`types`].

use thiserror::Error;

mod store;
pub mod types;

pub use store::*;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}
