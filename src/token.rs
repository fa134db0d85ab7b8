use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::oauth::TokenResponse;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Tokens issued by one code exchange or refresh.
///
/// A bundle whose `expires_at` is not in the future must be treated as absent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: String,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
}

// Tokens stay out of logs.
impl std::fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBundle")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl TokenBundle {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        id_token: impl Into<String>,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            id_token: id_token.into(),
            expires_at,
        }
    }

    /// Bundle from a code-exchange response received at `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExchangeFailed`] if the response carries no `id_token`.
    pub fn from_response(response: &TokenResponse, issued_at: OffsetDateTime) -> Result<Self, Error> {
        let id_token = response
            .id_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::ExchangeFailed {
                operation: "token exchange",
                status: None,
                detail: "response did not include an id_token".into(),
            })?;

        Ok(Self {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            id_token,
            expires_at: expiry(response, issued_at),
        })
    }

    /// Successor bundle after a refresh; omitted tokens carry over from `self`.
    #[must_use]
    pub fn refreshed(&self, response: &TokenResponse, issued_at: OffsetDateTime) -> Self {
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response
                .refresh_token
                .clone()
                .or_else(|| self.refresh_token.clone()),
            id_token: response
                .id_token
                .clone()
                .unwrap_or_else(|| self.id_token.clone()),
            expires_at: expiry(response, issued_at),
        }
    }

    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }

    /// Remaining lifetime, zero once expired.
    #[must_use]
    pub fn expires_in(&self, now: OffsetDateTime) -> Duration {
        (self.expires_at - now).max(Duration::ZERO)
    }
}

/// Upper bound on `expires_in`; keeps the expiry arithmetic in range.
const MAX_EXPIRES_IN_SECS: i64 = 366 * 24 * 3600;

fn expiry(response: &TokenResponse, issued_at: OffsetDateTime) -> OffsetDateTime {
    let secs = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let secs = i64::try_from(secs).map_or(MAX_EXPIRES_IN_SECS, |s| s.min(MAX_EXPIRES_IN_SECS));
    issued_at + Duration::seconds(secs)
}
