use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

use crate::claims::normalize_groups;
use crate::error::Error;
use crate::pkce;
use crate::well_known::OpenIdConfiguration;
use crate::zone::ZoneEndpoints;

const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_AUX_TIMEOUT: Duration = Duration::from_secs(5);

/// OIDC client configuration.
///
/// Required fields are constructor parameters; endpoints default to
/// `{issuer}/authorize`, `{issuer}/token`, `{issuer}/logout` and
/// `{issuer}/userinfo`.
///
/// ```rust,ignore
/// use estate_oidc::OAuthConfig;
///
/// let config = OAuthConfig::new(
///     "estate-app",
///     "https://id.example.com/oidc".parse()?,
///     "https://app.example.com/callback".parse()?,
/// )?
/// .with_post_logout_redirect_uri("https://app.example.com/".parse()?);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct OAuthConfig {
    pub(crate) client_id: String,
    pub(crate) issuer: Url,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) logout_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) redirect_uri: Url,
    pub(crate) post_logout_redirect_uri: Option<Url>,
    pub(crate) scopes: Vec<String>,
    pub(crate) exchange_timeout: Duration,
    pub(crate) aux_timeout: Duration,
}

impl OAuthConfig {
    /// Create a new OIDC client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `issuer` cannot carry path segments.
    pub fn new(
        client_id: impl Into<String>,
        issuer: Url,
        redirect_uri: Url,
    ) -> Result<Self, Error> {
        Ok(Self {
            client_id: client_id.into(),
            auth_url: issuer_endpoint(&issuer, "authorize")?,
            token_url: issuer_endpoint(&issuer, "token")?,
            logout_url: issuer_endpoint(&issuer, "logout")?,
            userinfo_url: issuer_endpoint(&issuer, "userinfo")?,
            issuer,
            redirect_uri,
            post_logout_redirect_uri: None,
            scopes: vec![
                "openid".into(),
                "profile".into(),
                "email".into(),
                "offline_access".into(),
            ],
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            aux_timeout: DEFAULT_AUX_TIMEOUT,
        })
    }

    /// Build the configuration for the endpoints of a network zone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the zone issuer cannot carry path segments.
    pub fn for_zone(client_id: impl Into<String>, endpoints: &ZoneEndpoints) -> Result<Self, Error> {
        Ok(
            Self::new(client_id, endpoints.issuer.clone(), endpoints.redirect_uri.clone())?
                .with_post_logout_redirect_uri(endpoints.post_logout_redirect_uri.clone()),
        )
    }

    /// Override endpoints with the ones advertised by a discovery document.
    #[must_use]
    pub fn with_discovery(mut self, doc: &OpenIdConfiguration) -> Self {
        self.auth_url = doc.authorization_endpoint.clone();
        self.token_url = doc.token_endpoint.clone();
        if let Some(url) = &doc.end_session_endpoint {
            self.logout_url = url.clone();
        }
        if let Some(url) = &doc.userinfo_endpoint {
            self.userinfo_url = url.clone();
        }
        self
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    #[must_use]
    pub fn with_logout_url(mut self, url: Url) -> Self {
        self.logout_url = url;
        self
    }

    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, url: Url) -> Self {
        self.post_logout_redirect_uri = Some(url);
        self
    }

    /// Override the scopes (default: `openid profile email offline_access`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Timeout for the code exchange and refresh requests (default 15 s).
    #[must_use]
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Timeout for userinfo and discovery requests (default 5 s).
    #[must_use]
    pub fn with_aux_timeout(mut self, timeout: Duration) -> Self {
        self.aux_timeout = timeout;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn logout_url(&self) -> &Url {
        &self.logout_url
    }

    #[must_use]
    pub fn userinfo_url(&self) -> &Url {
        &self.userinfo_url
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn post_logout_redirect_uri(&self) -> Option<&Url> {
        self.post_logout_redirect_uri.as_ref()
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Appends one path segment to the issuer URL.
fn issuer_endpoint(issuer: &Url, segment: &str) -> Result<Url, Error> {
    let mut url = issuer.clone();
    url.path_segments_mut()
        .map_err(|()| Error::Config(format!("issuer cannot be a base URL: {issuer}")))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

/// Authorization URL plus the flow-scoped secrets that must be kept until the callback.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub redirect_uri: Url,
}

/// Token response from the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: Some("Bearer".into()),
            id_token: None,
            refresh_token: None,
            expires_in: None,
        }
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    #[must_use]
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }
}

/// User info from the userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default, deserialize_with = "deserialize_groups")]
    pub groups: Vec<String>,
}

fn deserialize_groups<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(normalize_groups(value.as_ref()))
}

/// Error body returned by the token endpoint (RFC 6749 §5.2).
#[derive(Deserialize)]
struct ProviderErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP client for the identity provider.
pub struct AuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl AuthClient {
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Fetch `{issuer}/.well-known/openid-configuration`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure,
    /// [`Error::ExchangeFailed`] if the document cannot be fetched or parsed,
    /// or [`Error::Config`] if the provider does not offer S256 PKCE.
    pub async fn discover(&self) -> Result<OpenIdConfiguration, Error> {
        let url = OpenIdConfiguration::location(&self.config.issuer)?;
        let response = self
            .http
            .get(url)
            .timeout(self.config.aux_timeout)
            .send()
            .await?;
        let response = Self::ensure_success(response, "discovery").await?;
        let doc: OpenIdConfiguration = Self::read_json(response, "discovery").await?;

        if !doc.supports_s256() {
            tracing::error!(
                methods = ?doc.code_challenge_methods_supported,
                "Identity provider does not support S256 PKCE"
            );
            return Err(Error::Config(format!(
                "identity provider does not support {} PKCE",
                pkce::CHALLENGE_METHOD
            )));
        }
        Ok(doc)
    }

    /// Generate an authorization URL with fresh `state`, `nonce` and PKCE values.
    #[must_use]
    pub fn authorization_url(&self) -> AuthorizationRequest {
        let state = pkce::generate_state();
        let nonce = pkce::generate_nonce();
        let code_verifier = pkce::generate_code_verifier();
        let code_challenge = pkce::generate_code_challenge(&code_verifier);
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &scope)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", pkce::CHALLENGE_METHOD)
            .append_pair("response_mode", "query");

        AuthorizationRequest {
            url,
            state,
            nonce,
            code_verifier,
            redirect_uri: self.config.redirect_uri.clone(),
        }
    }

    /// Exchange an authorization code for tokens using PKCE.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure or timeout, or
    /// [`Error::ExchangeFailed`] on a non-2xx status or unreadable body.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        self.token_request(&params, "token exchange").await
    }

    /// Exchange a refresh token for a new token response.
    ///
    /// # Errors
    ///
    /// Same as [`exchange_code`](Self::exchange_code); callers fold every
    /// failure into [`Error::TokenExpired`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&params, "token refresh").await
    }

    /// Fetch user info using an access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::ExchangeFailed`] if the userinfo endpoint returns an error.
    pub async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, Error> {
        let response = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token)
            .timeout(self.config.aux_timeout)
            .send()
            .await?;

        let response = Self::ensure_success(response, "userinfo request").await?;
        Self::read_json(response, "userinfo request").await
    }

    /// Build the end-session URL with `id_token_hint` and `post_logout_redirect_uri`.
    #[must_use]
    pub fn end_session_url(&self, id_token_hint: Option<&str>) -> Url {
        let mut url = self.config.logout_url.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
            if let Some(redirect) = &self.config.post_logout_redirect_uri {
                query.append_pair("post_logout_redirect_uri", redirect.as_str());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, Error> {
        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(params)
            .timeout(self.config.exchange_timeout)
            .send()
            .await?;

        let response = Self::ensure_success(response, operation).await?;
        Self::read_json(response, operation).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<T, Error> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::ExchangeFailed {
            operation,
            status: Some(status),
            detail: format!("malformed response body: {e}"),
        })
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<ProviderErrorBody>(&body) {
            Ok(err) => match err.error_description {
                Some(desc) => format!("{}: {desc}", err.error),
                None => err.error,
            },
            Err(_) => body,
        };
        Err(Error::ExchangeFailed {
            operation,
            status: Some(status),
            detail,
        })
    }
}
