use std::sync::Arc;

use time::OffsetDateTime;
use url::Url;

use super::callback::{CallbackParams, strip_callback_params};
use super::transaction::PendingAuthTransaction;
use super::{AuthenticatedSession, LoginOutcome, OidcDataSource, refresh_bundle};
use crate::error::Error;
use crate::oauth::{AuthClient, UserInfo};
use crate::roles::RoleMapper;
use crate::store::{DEFAULT_KEY_PREFIX, Storage};
use crate::token::TokenBundle;

/// The browser window the app runs in.
pub trait Browser: Send + Sync {
    /// The current page URL, including the query string.
    fn current_url(&self) -> Result<Url, Error>;

    /// Rewrite the visible URL without navigating (`history.replaceState`).
    fn replace_url(&self, url: &Url);

    /// Full-page navigation; the current page is unloaded.
    fn navigate(&self, url: &Url);
}

/// Web variant: full-page redirect out, callback handled on return.
pub struct WebDataSource {
    client: Arc<AuthClient>,
    browser: Arc<dyn Browser>,
    session_storage: Arc<dyn Storage>,
    key_prefix: String,
    roles: Arc<dyn RoleMapper>,
}

impl WebDataSource {
    #[must_use]
    pub fn new(
        client: Arc<AuthClient>,
        browser: Arc<dyn Browser>,
        session_storage: Arc<dyn Storage>,
        roles: Arc<dyn RoleMapper>,
    ) -> Self {
        Self {
            client,
            browser,
            session_storage,
            key_prefix: DEFAULT_KEY_PREFIX.into(),
            roles,
        }
    }

    /// Key prefix for the pending transaction in tab storage.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Persist a fresh transaction and navigate to the identity provider.
    async fn begin_login(&self) -> Result<LoginOutcome, Error> {
        let request = self.client.authorization_url();
        PendingAuthTransaction::new(&request, OffsetDateTime::now_utc())
            .save(self.session_storage.as_ref(), &self.key_prefix)
            .await?;

        tracing::info!("Redirecting to identity provider");
        self.browser.navigate(&request.url);
        Ok(LoginOutcome::Redirecting)
    }

    /// Complete the flow from the authorization response on `current_url`.
    ///
    /// # Errors
    ///
    /// [`Error::Provider`], [`Error::StateMismatch`], [`Error::FlowCorrupted`],
    /// [`Error::ExchangeFailed`], [`Error::Http`], [`Error::MalformedToken`],
    /// [`Error::NonceMismatch`] or [`Error::AccessDenied`].
    pub async fn handle_callback(
        &self,
        params: CallbackParams,
        current_url: &Url,
    ) -> Result<Arc<AuthenticatedSession>, Error> {
        // Consume the transaction and scrub the URL before anything can fail,
        // so a replayed callback finds nothing to reuse.
        let pending =
            PendingAuthTransaction::take(self.session_storage.as_ref(), &self.key_prefix).await;
        self.browser.replace_url(&strip_callback_params(current_url));
        let pending = pending?;

        if let Some(error) = params.error {
            let description = params
                .error_description
                .unwrap_or_else(|| "Unknown error".to_string());
            tracing::warn!(error = %error, description = %description, "OIDC error from identity provider");
            return Err(Error::Provider { error, description });
        }

        let Some(returned_state) = params.state else {
            tracing::warn!("OIDC callback without state");
            return Err(Error::StateMismatch);
        };
        let Some(pending) = pending else {
            return Err(Error::FlowCorrupted("no pending login transaction".into()));
        };
        if returned_state != pending.state {
            tracing::warn!("OIDC state mismatch");
            return Err(Error::StateMismatch);
        }
        if pending.is_expired(OffsetDateTime::now_utc()) {
            return Err(Error::FlowCorrupted("login transaction expired".into()));
        }
        let code = params
            .code
            .ok_or_else(|| Error::FlowCorrupted("callback without authorization code".into()))?;

        let response = self
            .client
            .exchange_code(&code, &pending.code_verifier)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Token exchange failed"))?;

        let tokens = TokenBundle::from_response(&response, OffsetDateTime::now_utc())?;
        let session =
            AuthenticatedSession::establish(tokens, Some(&pending.nonce), self.roles.as_ref())?;

        tracing::info!(
            subject = %session.claims.subject,
            role = %session.role,
            "Web OIDC login successful"
        );
        Ok(Arc::new(session))
    }
}

#[async_trait::async_trait]
impl OidcDataSource for WebDataSource {
    async fn login(&self) -> Result<LoginOutcome, Error> {
        let current_url = self.browser.current_url()?;
        match CallbackParams::from_url(&current_url, self.client.config().redirect_uri()) {
            Some(params) => self
                .handle_callback(params, &current_url)
                .await
                .map(LoginOutcome::Authenticated),
            None => self.begin_login().await,
        }
    }

    async fn refresh_token(&self, current: &TokenBundle) -> Result<TokenBundle, Error> {
        refresh_bundle(&self.client, current).await
    }

    /// Navigates away to the end-session endpoint; there is nothing to wait for.
    async fn logout(&self, id_token_hint: Option<&str>) -> Result<(), Error> {
        let url = self.client.end_session_url(id_token_hint);
        tracing::info!("Redirecting to end-session endpoint");
        self.browser.navigate(&url);
        Ok(())
    }

    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, Error> {
        self.client.get_user_info(access_token).await
    }
}
