//! The access/refresh token pair that authorizes YouTube API calls.

use jiff::{SignedDuration, Timestamp};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Safety margin subtracted from the server-reported token lifetime.
const EXPIRY_BUFFER: SignedDuration = SignedDuration::from_secs(300);

/// Lifetime assumed when the authorization server does not report one (55 minutes).
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3300);

/// An access credential, as persisted in the credential store.
///
/// `expiry` already includes a safety buffer, so a credential is usable exactly when the current
/// time is before it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expiry: Timestamp,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
}

// Tokens are secrets, keep them out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credential {
    /// Builds a credential from a token endpoint response received at `now`.
    ///
    /// When the response carries no scope list, `requested` is recorded instead, since the
    /// server only omits scopes when it granted exactly what was asked for.
    pub fn from_token_response(
        token: &BasicTokenResponse,
        requested: &[String],
        now: Timestamp,
    ) -> Self {
        let scopes = match token.scopes() {
            Some(granted) => granted.iter().map(|s| s.as_str().to_owned()).collect(),
            None => requested.iter().cloned().collect(),
        };
        Self {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()),
            expiry: Self::calculate_expiry(token.expires_in(), now),
            scopes,
        }
    }

    /// Computes when a token issued at `now` should be considered expired.
    fn calculate_expiry(expires_in: Option<Duration>, now: Timestamp) -> Timestamp {
        let Some(expires_in) = expires_in else {
            return now.checked_add(DEFAULT_LIFETIME).unwrap_or(now);
        };
        now.checked_add(expires_in)
            .and_then(|t| t.checked_sub(EXPIRY_BUFFER))
            .unwrap_or(now)
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.expiry
    }

    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// The state of whatever the credential store held, as of one instant.
///
/// Exactly one classification applies: an unexpired credential is `Valid` regardless of its
/// refresh token, an expired one is `Refreshable` only if it can be refreshed, and everything
/// else (no credential, or an expired one without a refresh token) is `Absent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Valid(Credential),
    Refreshable(Credential),
    Absent,
}

impl CredentialState {
    pub fn classify(stored: Option<Credential>, now: Timestamp) -> Self {
        match stored {
            Some(c) if !c.is_expired_at(now) => CredentialState::Valid(c),
            Some(c) if c.is_refreshable() => CredentialState::Refreshable(c),
            Some(_) => {
                tracing::debug!("stored credential expired and has no refresh token");
                CredentialState::Absent
            }
            None => CredentialState::Absent,
        }
    }
}
