use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::datasource::{AuthenticatedSession, LoginOutcome, OidcDataSource};
use crate::error::Error;
use crate::oauth::UserInfo;
use crate::roles::RoleMapper;
use crate::store::TokenStore;
use crate::token::TokenBundle;

/// Process-wide session state on top of an [`OidcDataSource`].
///
/// Only login and refresh install tokens. Reads take an immutable snapshot
/// and never wait on a flow in progress.
pub struct SessionManager {
    source: Arc<dyn OidcDataSource>,
    tokens: TokenStore,
    roles: Arc<dyn RoleMapper>,
    current: RwLock<Option<Arc<AuthenticatedSession>>>,
    // One login, refresh or logout at a time.
    flight: Mutex<()>,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        source: Arc<dyn OidcDataSource>,
        tokens: TokenStore,
        roles: Arc<dyn RoleMapper>,
    ) -> Self {
        Self {
            source,
            tokens,
            roles,
            current: RwLock::new(None),
            flight: Mutex::new(()),
        }
    }

    /// Snapshot of the installed session, expired or not.
    #[must_use]
    pub fn current(&self) -> Option<Arc<AuthenticatedSession>> {
        self.current.read().clone()
    }

    /// Whether a session is installed and its tokens have not expired.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current().is_some_and(|s| s.tokens.is_valid())
    }

    /// Run the platform login. Nothing is installed unless it fully succeeds.
    ///
    /// On web this either redirects away ([`LoginOutcome::Redirecting`]) or,
    /// on the callback page, completes the login.
    ///
    /// # Errors
    ///
    /// Any error from the data source, or a storage failure while saving.
    pub async fn login(&self) -> Result<LoginOutcome, Error> {
        let _flight = self.flight.lock().await;

        let outcome = self.source.login().await;
        if let Err(e) = &outcome {
            if e.is_user_cancelled() {
                tracing::debug!("Login abandoned");
            } else {
                tracing::warn!(error = %e, "Login failed");
            }
        }

        match outcome? {
            LoginOutcome::Authenticated(session) => {
                self.persist(&session.tokens).await?;
                self.install(Some(session.clone()));
                Ok(LoginOutcome::Authenticated(session))
            }
            LoginOutcome::Redirecting => Ok(LoginOutcome::Redirecting),
        }
    }

    /// Reinstall a stored session at startup, refreshing it if expired.
    ///
    /// Returns `None` when nothing usable is stored.
    ///
    /// # Errors
    ///
    /// [`Error::AccessDenied`] if the stored identity no longer has access,
    /// or a storage failure.
    pub async fn restore(&self) -> Result<Option<Arc<AuthenticatedSession>>, Error> {
        let _flight = self.flight.lock().await;

        let Some(bundle) = self.tokens.load().await? else {
            return Ok(None);
        };

        if !bundle.is_valid() {
            return match self.refresh_locked(&bundle).await {
                Ok(session) => Ok(Some(session)),
                Err(Error::TokenExpired) => Ok(None),
                Err(e) => Err(e),
            };
        }

        match AuthenticatedSession::establish(bundle, None, self.roles.as_ref()) {
            Ok(session) => {
                let session = Arc::new(session);
                tracing::info!(subject = %session.claims.subject, "Session restored");
                self.install(Some(session.clone()));
                Ok(Some(session))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stored session rejected");
                self.drop_local_state().await;
                match e {
                    Error::AccessDenied { .. } => Err(e),
                    _ => Ok(None),
                }
            }
        }
    }

    /// A currently valid access token, refreshing once if needed.
    ///
    /// # Errors
    ///
    /// [`Error::TokenExpired`] when there is no session or the refresh fails;
    /// local state is cleared and the caller should start a new login.
    pub async fn access_token(&self) -> Result<String, Error> {
        if let Some(token) = self.valid_access_token() {
            return Ok(token);
        }

        let _flight = self.flight.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.valid_access_token() {
            return Ok(token);
        }
        let Some(session) = self.current() else {
            return Err(Error::TokenExpired);
        };
        let session = self.refresh_locked(&session.tokens).await?;
        Ok(session.tokens.access_token.clone())
    }

    /// # Errors
    ///
    /// Same as [`access_token`](Self::access_token), plus userinfo request failures.
    pub async fn user_info(&self) -> Result<UserInfo, Error> {
        let token = self.access_token().await?;
        self.source.get_user_info(&token).await
    }

    /// Local cleanup followed by best-effort remote logout.
    ///
    /// Local state goes first: on web the remote logout navigates away and
    /// nothing after it is guaranteed to run.
    ///
    /// # Errors
    ///
    /// Only a failure to clear stored tokens is reported, after the remote
    /// logout has been attempted.
    pub async fn logout(&self) -> Result<(), Error> {
        let _flight = self.flight.lock().await;

        let id_token = match self.current() {
            Some(session) => Some(session.tokens.id_token.clone()),
            None => self
                .tokens
                .load()
                .await
                .unwrap_or_default()
                .map(|bundle| bundle.id_token),
        };

        self.install(None);
        let cleared = self.tokens.clear().await;
        if let Err(e) = &cleared {
            tracing::error!(error = %e, "Failed to clear stored tokens on logout");
        }

        tracing::info!("Logged out");
        if let Err(e) = self.source.logout(id_token.as_deref()).await {
            tracing::warn!(error = %e, "Remote logout failed, local session already cleared");
        }
        cleared
    }

    fn valid_access_token(&self) -> Option<String> {
        self.current()
            .filter(|s| s.tokens.is_valid())
            .map(|s| s.tokens.access_token.clone())
    }

    fn install(&self, session: Option<Arc<AuthenticatedSession>>) {
        *self.current.write() = session;
    }

    /// Save, clearing any partial write on failure.
    async fn persist(&self, bundle: &TokenBundle) -> Result<(), Error> {
        if let Err(e) = self.tokens.save(bundle).await {
            tracing::error!(error = %e, "Failed to persist tokens");
            if let Err(clear) = self.tokens.clear().await {
                tracing::warn!(error = %clear, "Failed to clear partial token write");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn drop_local_state(&self) {
        self.install(None);
        if let Err(e) = self.tokens.clear().await {
            tracing::warn!(error = %e, "Failed to clear stored tokens");
        }
    }

    /// Refresh with the flight lock held. On failure local state is dropped.
    async fn refresh_locked(
        &self,
        current: &TokenBundle,
    ) -> Result<Arc<AuthenticatedSession>, Error> {
        let result = async {
            let bundle = self.source.refresh_token(current).await?;
            let session = AuthenticatedSession::establish(bundle, None, self.roles.as_ref())
                .map_err(|e| match e {
                    Error::AccessDenied { .. } => e,
                    other => {
                        tracing::warn!(error = %other, "Refreshed id token unusable");
                        Error::TokenExpired
                    }
                })?;
            self.persist(&session.tokens).await?;
            Ok::<_, Error>(Arc::new(session))
        }
        .await;

        match result {
            Ok(session) => {
                tracing::debug!(subject = %session.claims.subject, "Session refreshed");
                self.install(Some(session.clone()));
                Ok(session)
            }
            Err(e) => {
                self.drop_local_state().await;
                Err(e)
            }
        }
    }
}
