use std::sync::Arc;

use url::Url;

use crate::error::Error;
use crate::oauth::{AuthClient, OAuthConfig};
use crate::store::{DEFAULT_KEY_PREFIX, Storage, TokenStore};

/// Client configuration plus the storage layout for tokens.
///
/// Use [`from_env()`](AuthConfig::from_env) for convention-based setup,
/// or [`new()`](AuthConfig::new) with `with_*` methods for full control.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    oauth: OAuthConfig,
    storage_prefix: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(oauth: OAuthConfig) -> Self {
        Self {
            oauth,
            storage_prefix: DEFAULT_KEY_PREFIX.into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `OIDC_ISSUER`: identity provider base URL
    /// - `OIDC_CLIENT_ID`: public client ID
    /// - `OIDC_REDIRECT_URI`: callback URI registered with the provider
    ///
    /// # Optional env vars
    /// - `OIDC_POST_LOGOUT_REDIRECT_URI`
    /// - `OIDC_AUTH_URL`, `OIDC_TOKEN_URL`, `OIDC_LOGOUT_URL`, `OIDC_USERINFO_URL`: endpoint overrides
    /// - `OIDC_SCOPES`: comma-separated scopes
    /// - `OIDC_STORAGE_PREFIX`: key prefix for stored tokens
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or URLs are invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required variables are missing or URLs are invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| Error::Config(format!("{key} is required")))
        };
        let parse_url = |key: &str, value: String| -> Result<Url, Error> {
            value
                .parse()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        };
        let optional_url = |key: &str| -> Result<Option<Url>, Error> {
            lookup(key).map(|v| parse_url(key, v)).transpose()
        };

        let client_id = required("OIDC_CLIENT_ID")?;
        let issuer = parse_url("OIDC_ISSUER", required("OIDC_ISSUER")?)?;
        let redirect_uri = parse_url("OIDC_REDIRECT_URI", required("OIDC_REDIRECT_URI")?)?;

        let mut oauth = OAuthConfig::new(client_id, issuer, redirect_uri)?;

        if let Some(url) = optional_url("OIDC_POST_LOGOUT_REDIRECT_URI")? {
            oauth = oauth.with_post_logout_redirect_uri(url);
        }
        if let Some(url) = optional_url("OIDC_AUTH_URL")? {
            oauth = oauth.with_auth_url(url);
        }
        if let Some(url) = optional_url("OIDC_TOKEN_URL")? {
            oauth = oauth.with_token_url(url);
        }
        if let Some(url) = optional_url("OIDC_LOGOUT_URL")? {
            oauth = oauth.with_logout_url(url);
        }
        if let Some(url) = optional_url("OIDC_USERINFO_URL")? {
            oauth = oauth.with_userinfo_url(url);
        }
        if let Some(scopes) = lookup("OIDC_SCOPES") {
            oauth = oauth.with_scopes(
                scopes
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        let mut config = Self::new(oauth);
        if let Some(prefix) = lookup("OIDC_STORAGE_PREFIX") {
            config = config.with_storage_prefix(prefix);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn oauth(&self) -> &OAuthConfig {
        &self.oauth
    }

    #[must_use]
    pub fn storage_prefix(&self) -> &str {
        &self.storage_prefix
    }

    #[must_use]
    pub fn client(&self) -> AuthClient {
        AuthClient::new(self.oauth.clone())
    }

    #[must_use]
    pub fn token_store(&self, storage: Arc<dyn Storage>) -> TokenStore {
        TokenStore::new(storage).with_prefix(self.storage_prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn base() -> HashMap<String, String> {
        vars(&[
            ("OIDC_ISSUER", "https://id.example.com/realms/estate"),
            ("OIDC_CLIENT_ID", "estate-app"),
            ("OIDC_REDIRECT_URI", "https://app.example.com/auth/callback"),
        ])
    }

    #[test]
    fn required_only() {
        let env = base();
        let config = AuthConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.oauth().client_id(), "estate-app");
        assert_eq!(
            config.oauth().token_url().as_str(),
            "https://id.example.com/realms/estate/token"
        );
        assert_eq!(config.oauth().post_logout_redirect_uri(), None);
        assert_eq!(config.storage_prefix(), DEFAULT_KEY_PREFIX);
    }

    #[test]
    fn optional_overrides() {
        let mut env = base();
        env.extend(vars(&[
            ("OIDC_POST_LOGOUT_REDIRECT_URI", "https://app.example.com/"),
            ("OIDC_LOGOUT_URL", "https://id.example.com/end-session"),
            ("OIDC_SCOPES", "openid, groups ,"),
            ("OIDC_STORAGE_PREFIX", "tenant1."),
        ]));
        let config = AuthConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(
            config.oauth().logout_url().as_str(),
            "https://id.example.com/end-session"
        );
        assert_eq!(config.oauth().scopes(), &["openid", "groups"]);
        assert_eq!(config.storage_prefix(), "tenant1.");
    }

    #[test]
    fn missing_required_named() {
        let mut env = base();
        env.remove("OIDC_CLIENT_ID");
        let err = AuthConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("OIDC_CLIENT_ID"));
    }

    #[test]
    fn invalid_url_named() {
        let mut env = base();
        env.insert("OIDC_TOKEN_URL".into(), "not a url".into());
        let err = AuthConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.starts_with("OIDC_TOKEN_URL")));
    }
}
