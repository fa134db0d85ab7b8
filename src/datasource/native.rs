use std::sync::Arc;

use time::OffsetDateTime;
use url::Url;

use super::{AuthenticatedSession, LoginOutcome, OidcDataSource, refresh_bundle};
use crate::error::Error;
use crate::oauth::{AuthClient, AuthorizationRequest, TokenResponse, UserInfo};
use crate::roles::RoleMapper;
use crate::token::TokenBundle;

/// Request handed to the platform end-session primitive.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct EndSessionRequest {
    /// Fully built end-session URL, hint and redirect included.
    pub url: Url,
    pub id_token_hint: Option<String>,
    pub post_logout_redirect_uri: Option<Url>,
}

/// Platform "authorize and exchange code" primitive (secure in-app browser).
///
/// The agent opens `request.url`, captures the redirect to
/// `request.redirect_uri`, checks the returned `state` against
/// `request.state`, and redeems the code with `request.code_verifier`.
#[async_trait::async_trait]
pub trait AuthorizationAgent: Send + Sync {
    /// Returns [`Error::UserCancelled`] when the user closes the browser.
    async fn authorize_and_exchange_code(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<TokenResponse, Error>;

    async fn end_session(&self, request: &EndSessionRequest) -> Result<(), Error>;
}

/// Native/desktop variant: the agent owns the browser round trip.
pub struct NativeDataSource {
    client: Arc<AuthClient>,
    agent: Arc<dyn AuthorizationAgent>,
    roles: Arc<dyn RoleMapper>,
}

impl NativeDataSource {
    #[must_use]
    pub fn new(
        client: Arc<AuthClient>,
        agent: Arc<dyn AuthorizationAgent>,
        roles: Arc<dyn RoleMapper>,
    ) -> Self {
        Self {
            client,
            agent,
            roles,
        }
    }
}

#[async_trait::async_trait]
impl OidcDataSource for NativeDataSource {
    async fn login(&self) -> Result<LoginOutcome, Error> {
        let request = self.client.authorization_url();

        let response = match self.agent.authorize_and_exchange_code(&request).await {
            Ok(response) => response,
            Err(Error::UserCancelled) => {
                tracing::info!("Login cancelled by user");
                return Err(Error::UserCancelled);
            }
            Err(e) => {
                tracing::error!(error = %e, "Native authorization failed");
                return Err(e);
            }
        };

        let tokens = TokenBundle::from_response(&response, OffsetDateTime::now_utc())?;
        let session =
            AuthenticatedSession::establish(tokens, Some(&request.nonce), self.roles.as_ref())?;

        tracing::info!(
            subject = %session.claims.subject,
            role = %session.role,
            "Native OIDC login successful"
        );
        Ok(LoginOutcome::Authenticated(Arc::new(session)))
    }

    async fn refresh_token(&self, current: &TokenBundle) -> Result<TokenBundle, Error> {
        refresh_bundle(&self.client, current).await
    }

    async fn logout(&self, id_token_hint: Option<&str>) -> Result<(), Error> {
        let request = EndSessionRequest {
            url: self.client.end_session_url(id_token_hint),
            id_token_hint: id_token_hint.map(str::to_owned),
            post_logout_redirect_uri: self.client.config().post_logout_redirect_uri().cloned(),
        };
        if let Err(e) = self.agent.end_session(&request).await {
            tracing::warn!(error = %e, "End-session request failed, continuing logout");
        }
        Ok(())
    }

    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, Error> {
        self.client.get_user_info(access_token).await
    }
}
