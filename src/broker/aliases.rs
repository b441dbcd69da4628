use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

pub const AWS_SIGNIN_SAML_URL: &str = "https://signin.aws.amazon.com/saml";

static ACCOUNT_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Account: (.+?) \((\d{12})\)").expect("account heading pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum AliasLookupError {
    #[error("sign-in page request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Maps account ids appearing in an assertion to their human readable aliases.
pub trait ResolveAccountAliases {
    type Error: std::error::Error + Send + Sync;
    async fn resolve_aliases(&self, assertion: &str)
        -> Result<HashMap<String, String>, Self::Error>;
}

/// Scrapes the AWS role selection page, which labels each account as
/// `Account: <alias> (<account id>)` when it is fed the same SAML response.
pub struct SignInPageAliases {
    client: reqwest::Client,
    url: String,
}

impl SignInPageAliases {
    pub fn new() -> Self {
        Self::with_url(AWS_SIGNIN_SAML_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl ResolveAccountAliases for SignInPageAliases {
    type Error = AliasLookupError;

    async fn resolve_aliases(
        &self,
        assertion: &str,
    ) -> Result<HashMap<String, String>, Self::Error> {
        let page = self
            .client
            .post(&self.url)
            .form(&[("SAMLResponse", assertion), ("RelayState", "")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let aliases = parse_account_aliases(&page);
        debug!(count = aliases.len(), "resolved account aliases");
        Ok(aliases)
    }
}

pub fn parse_account_aliases(page: &str) -> HashMap<String, String> {
    ACCOUNT_HEADING
        .captures_iter(page)
        .map(|caps| (caps[2].to_string(), caps[1].trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_aliases_from_signin_page() {
        let page = r#"
<fieldset>
  <div class="saml-account"><div class="saml-account-name">Account: prod-main (111111111111)</div></div>
  <div class="saml-account"><div class="saml-account-name">Account: dev (222222222222)</div></div>
  <div class="saml-account"><div class="saml-account-name">Account: 333333333333</div></div>
</fieldset>"#;
        let aliases = parse_account_aliases(page);
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases["111111111111"], "prod-main");
        assert_eq!(aliases["222222222222"], "dev");
    }

    #[test]
    fn test_parse_account_aliases_without_accounts() {
        assert!(parse_account_aliases("<html>Sign in</html>").is_empty());
    }
}
