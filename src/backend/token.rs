//! Backend authentication token and the per-call auth context derived from it.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Seconds before the backend's deadline at which a token counts as expired.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Credential issued by the backend login endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Token {
    #[serde(rename = "token")]
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Whether the token can still be presented at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Snapshot of the current token, attached to every outgoing backend call.
///
/// Taken once per request so that a refresh racing with an in-flight call
/// cannot swap the credential out from under it.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    token: Option<String>,
}

impl AuthContext {
    pub fn new(token: Option<&Token>) -> Self {
        Self {
            token: token.map(|t| t.value.clone()),
        }
    }

    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
