/// Authentication error returned by every login, refresh and logout operation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The user closed the login or logout UI before it finished.
    #[error("Authentication cancelled by user")]
    UserCancelled,

    /// The `state` returned on the callback does not match the stored one.
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// Flow-scoped values (verifier, nonce, code) are missing or stale.
    #[error("Authentication flow corrupted: {0}")]
    FlowCorrupted(String),

    /// The identity provider redirected back with an `error` parameter.
    #[error("Identity provider error ({error}): {description}")]
    Provider { error: String, description: String },

    /// The token endpoint rejected the request or returned an unreadable body.
    #[error("{operation} failed{}: {detail}", status_suffix(.status))]
    ExchangeFailed {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// Tokens were issued but none of the user's groups grants application access.
    #[error("You do not have permission to use this application")]
    AccessDenied { groups: Vec<String> },

    /// No usable session remains; the caller must start a new login.
    #[error("Session expired, please sign in again")]
    TokenExpired,

    /// The identity token could not be decoded.
    #[error("Malformed identity token: {0}")]
    MalformedToken(String),

    /// The `nonce` claim of the identity token does not match the login transaction.
    #[error("Identity token nonce mismatch")]
    NonceMismatch,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

impl Error {
    /// HTTP-like status code for surfacing the failure to the application.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UserCancelled => None,
            Self::StateMismatch | Self::FlowCorrupted(_) | Self::Provider { .. } => Some(400),
            Self::ExchangeFailed { status, .. } => Some(status.unwrap_or(502)),
            Self::AccessDenied { .. } => Some(403),
            Self::TokenExpired | Self::MalformedToken(_) | Self::NonceMismatch => Some(401),
            Self::Http(e) => Some(e.status().map_or(503, |s| s.as_u16())),
            Self::Config(_) | Self::Storage(_) => Some(500),
        }
    }

    /// Cancellation is a normal way out of the flow, not a failure to report.
    #[must_use]
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }

    /// Whether the caller should drop local state and prompt a fresh login.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired | Self::MalformedToken(_) | Self::FlowCorrupted(_)
        )
    }
}
