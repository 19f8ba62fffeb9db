//! Link builders for the flows the platform mails out.

use url::Url;

use folio_storage::{AccountId, ResourceId};

/// `{domain}confirm/{account_id}/{token}/[?destination=...]`
pub fn confirmation_url(
    domain: &Url,
    account_id: &AccountId,
    token: &str,
    destination: Option<&str>,
) -> String {
    let mut url = format!("{}confirm/{}/{}/", domain, account_id.0, token);
    if let Some(destination) = destination {
        url.push_str("?destination=");
        url.push_str(destination);
    }
    url
}

/// `{domain}user/{account_id}/{resource_id}/claim/?token={token}`
pub fn claim_url(
    domain: &Url,
    account_id: &AccountId,
    resource_id: &ResourceId,
    token: &str,
) -> String {
    format!(
        "{}user/{}/{}/claim/?token={}",
        domain, account_id.0, resource_id.0, token
    )
}

/// `{domain}resetpassword/{account_id}/{token}`
pub fn password_reset_url(domain: &Url, account_id: &AccountId, token: &str) -> String {
    format!("{}resetpassword/{}/{}", domain, account_id.0, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn domain() -> Url {
        Url::parse("https://folio.example/").unwrap()
    }

    #[test]
    fn test_confirmation_url_shape() {
        let id = AccountId(Uuid::new_v4());
        let url = confirmation_url(&domain(), &id, "tok123", None);
        assert_eq!(
            url,
            format!("https://folio.example/confirm/{}/tok123/", id.0)
        );
    }

    #[test]
    fn test_confirmation_url_with_destination() {
        let id = AccountId(Uuid::new_v4());
        let url = confirmation_url(&domain(), &id, "tok123", Some("dashboard"));
        assert!(url.ends_with("/?destination=dashboard"));
    }

    #[test]
    fn test_claim_url_shape() {
        let account = AccountId(Uuid::new_v4());
        let resource = ResourceId(Uuid::new_v4());
        let url = claim_url(&domain(), &account, &resource, "tok");
        assert_eq!(
            url,
            format!(
                "https://folio.example/user/{}/{}/claim/?token=tok",
                account.0, resource.0
            )
        );
    }

    #[test]
    fn test_reset_url_shape() {
        let id = AccountId(Uuid::new_v4());
        let url = password_reset_url(&domain(), &id, "tok");
        assert_eq!(
            url,
            format!("https://folio.example/resetpassword/{}/tok", id.0)
        );
    }
}
