use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Subset of the OIDC discovery document the client uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct OpenIdConfiguration {
    pub issuer: Url,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
}

impl OpenIdConfiguration {
    /// `{issuer}/.well-known/openid-configuration`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `issuer` cannot carry path segments.
    pub fn location(issuer: &Url) -> Result<Url, Error> {
        let mut url = issuer.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("issuer cannot be a base URL: {issuer}")))?
            .pop_if_empty()
            .extend([".well-known", "openid-configuration"]);
        Ok(url)
    }

    /// Whether the provider advertises S256 PKCE (absent list means unknown, assumed yes).
    #[must_use]
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported.is_empty()
            || self
                .code_challenge_methods_supported
                .iter()
                .any(|m| m == crate::pkce::CHALLENGE_METHOD)
    }
}
