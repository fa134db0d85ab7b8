//! Platform data sources for the OIDC authorization-code + PKCE flow.
//!
//! One capability, [`OidcDataSource`], with a variant per deployment target:
//!
//! - [`NativeDataSource`]: drives a platform [`AuthorizationAgent`] (secure
//!   in-app browser) that returns tokens directly.
//! - [`WebDataSource`]: full-page redirect to the identity provider; the
//!   callback is handled on the page the provider redirects back to.
//!
//! The variant is chosen once at startup with [`data_source`].
//!
//! ```rust,ignore
//! use estate_oidc::datasource::{AuthConfig, PlatformBackend, data_source};
//!
//! let config = AuthConfig::from_env()?;
//! let source = data_source(
//!     &config,
//!     Arc::new(GroupRoleMapper::default()),
//!     PlatformBackend::Web { browser, session_storage },
//! );
//! ```

mod callback;
mod config;
#[cfg(feature = "native")]
mod native;
mod transaction;
#[cfg(feature = "web")]
mod web;

use std::sync::Arc;

use time::OffsetDateTime;

use crate::claims::{IdentityClaims, parse_id_token};
use crate::error::Error;
use crate::oauth::{AuthClient, UserInfo};
use crate::roles::RoleMapper;
#[cfg(feature = "web")]
use crate::store::Storage;
use crate::token::TokenBundle;
use crate::types::Role;

pub use callback::{CallbackParams, strip_callback_params};
pub use config::AuthConfig;
#[cfg(feature = "native")]
pub use native::{AuthorizationAgent, EndSessionRequest, NativeDataSource};
pub use transaction::PendingAuthTransaction;
#[cfg(feature = "web")]
pub use web::{Browser, WebDataSource};
#[cfg(all(test, feature = "web"))]
pub(crate) use web::tests as web_tests;

/// The operations every platform variant provides.
#[async_trait::async_trait]
pub trait OidcDataSource: Send + Sync {
    /// Run (or, on web, continue) the interactive login.
    async fn login(&self) -> Result<LoginOutcome, Error>;

    /// Exchange the bundle's refresh token for a new bundle.
    ///
    /// Every failure is reported as [`Error::TokenExpired`].
    async fn refresh_token(&self, current: &TokenBundle) -> Result<TokenBundle, Error>;

    /// Best-effort remote session termination. Never fails on provider errors.
    async fn logout(&self, id_token_hint: Option<&str>) -> Result<(), Error>;

    async fn get_user_info(&self, access_token: &str) -> Result<UserInfo, Error>;
}

/// Result of [`OidcDataSource::login`].
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// The whole exchange and access check succeeded.
    Authenticated(Arc<AuthenticatedSession>),
    /// The page is navigating to the identity provider; login continues on
    /// the callback page.
    Redirecting,
}

/// Tokens plus the identity and role derived from them.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthenticatedSession {
    pub tokens: TokenBundle,
    pub claims: IdentityClaims,
    pub role: Role,
}

impl AuthenticatedSession {
    /// Parse the id token, check the nonce when one is expected, and require
    /// application access.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedToken`], [`Error::NonceMismatch`] or [`Error::AccessDenied`].
    pub fn establish(
        tokens: TokenBundle,
        expected_nonce: Option<&str>,
        roles: &dyn RoleMapper,
    ) -> Result<Self, Error> {
        let claims = parse_id_token(&tokens.id_token)?;

        if let Some(expected) = expected_nonce {
            if claims.nonce.as_deref() != Some(expected) {
                tracing::warn!(subject = %claims.subject, "Identity token nonce mismatch");
                return Err(Error::NonceMismatch);
            }
        }

        if !roles.has_app_access(&claims.groups) {
            tracing::warn!(
                subject = %claims.subject,
                groups = ?claims.groups,
                "No application access for user groups"
            );
            return Err(Error::AccessDenied {
                groups: claims.groups,
            });
        }

        let role = roles.map_groups_to_role(&claims.groups);
        Ok(Self {
            tokens,
            claims,
            role,
        })
    }
}

/// Platform collaborators, one variant per deployment target.
pub enum PlatformBackend {
    #[cfg(feature = "native")]
    Native(Arc<dyn AuthorizationAgent>),
    #[cfg(feature = "web")]
    Web {
        browser: Arc<dyn Browser>,
        /// Tab-scoped storage for the pending login transaction.
        session_storage: Arc<dyn Storage>,
    },
}

/// Build the data source for the current platform.
///
/// The web variant keys its pending transaction under the configured
/// storage prefix.
#[must_use]
pub fn data_source(
    config: &AuthConfig,
    roles: Arc<dyn RoleMapper>,
    backend: PlatformBackend,
) -> Arc<dyn OidcDataSource> {
    let client = Arc::new(config.client());
    match backend {
        #[cfg(feature = "native")]
        PlatformBackend::Native(agent) => Arc::new(NativeDataSource::new(client, agent, roles)),
        #[cfg(feature = "web")]
        PlatformBackend::Web {
            browser,
            session_storage,
        } => Arc::new(
            WebDataSource::new(client, browser, session_storage, roles)
                .with_key_prefix(config.storage_prefix()),
        ),
    }
}

/// Refresh shared by both variants; all failures collapse into `TokenExpired`.
pub(crate) async fn refresh_bundle(
    client: &AuthClient,
    current: &TokenBundle,
) -> Result<TokenBundle, Error> {
    let Some(refresh_token) = current.refresh_token.as_deref() else {
        tracing::debug!("No refresh token available");
        return Err(Error::TokenExpired);
    };

    match client.refresh(refresh_token).await {
        Ok(response) => Ok(current.refreshed(&response, OffsetDateTime::now_utc())),
        Err(e) => {
            tracing::warn!(error = %e, "Token refresh failed");
            Err(Error::TokenExpired)
        }
    }
}
