//! Outbound mail for account flows.
//!
//! Delivery itself is an external collaborator; the engine builds template
//! content and hands it to a [`Mailer`]. Sends are scheduled after the
//! account write and are not part of any transactional boundary.

mod templates;

pub use templates::*;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Mail sending error
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Failed to send mail: {0}")]
    SendFailed(String),
}

/// A rendered outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Trait for mail delivery collaborators
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<(), MailError>;
}

/// Best-effort send: failures are logged, never propagated.
pub(crate) async fn send_best_effort(
    mailer: &Option<std::sync::Arc<dyn Mailer>>,
    mail: Mail,
) {
    if let Some(mailer) = mailer {
        if let Err(err) = mailer.send(&mail).await {
            warn!(to = %mail.to, error = %err, "failed to send mail");
        }
    }
}
