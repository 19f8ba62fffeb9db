//! Mail templates for account flows.

use super::Mail;

/// Confirmation mail for a newly added email address.
pub fn confirmation_mail(to: &str, fullname: &str, confirmation_url: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Confirm your email address".to_string(),
        body: format!(
            r#"Hello {},

Please confirm your email address by visiting:

{}

If you didn't create an account, please ignore this message.

--
The Folio Team"#,
            fullname, confirmation_url
        ),
    }
}

/// Sent when confirming an address would merge another account.
pub fn merge_confirmation_mail(to: &str, fullname: &str, other_email: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Confirm account merge".to_string(),
        body: format!(
            r#"Hello {},

The address you are confirming already belongs to another account
({}). Confirming it again with merge enabled will combine both
accounts' projects, files and settings into this one. This cannot be
undone.

--
The Folio Team"#,
            fullname, other_email
        ),
    }
}

/// Password reset link.
pub fn password_reset_mail(to: &str, fullname: &str, reset_url: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        body: format!(
            r#"Hello {},

A password reset was requested for your account. The link below
expires in 48 hours:

{}

If you didn't request this, please ignore this message.

--
The Folio Team"#,
            fullname, reset_url
        ),
    }
}

/// Claim invitation for an unregistered contributor.
pub fn claim_mail(to: &str, fullname: &str, claim_url: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "You have been added as a contributor".to_string(),
        body: format!(
            r#"Hello {},

You were added as a contributor on Folio. Claim your account to set a
password and manage your contributions:

{}

--
The Folio Team"#,
            fullname, claim_url
        ),
    }
}

/// Welcome notice for accounts provisioned through institution sign-on.
pub fn institution_welcome_mail(to: &str, fullname: &str, institution: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Welcome to Folio".to_string(),
        body: format!(
            r#"Hello {},

An account was created for you through {}'s sign-on service. You can
log in any time through your institution.

--
The Folio Team"#,
            fullname, institution
        ),
    }
}
