use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Email/password pair submitted by the login form.
///
/// Fields default to empty strings; the provider decides whether they are valid.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignUpOptions {
    /// Where the confirmation email link should send the user back to.
    pub email_redirect_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_confirmed_at: Option<String>,
}

/// Provider-issued session as stored in the auth cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fill `expires_at` from `expires_in` when the provider left it out.
    #[must_use]
    pub fn with_expiry_from(mut self, now_unix: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(now_unix + self.expires_in);
        }
        self
    }

    /// Whether the access token is expired or will be within `margin_seconds`.
    ///
    /// Sessions without any expiry information are treated as expired so the
    /// next call refreshes them.
    #[must_use]
    pub fn expires_within(&self, now_unix: i64, margin_seconds: i64) -> bool {
        self.expires_at
            .is_none_or(|expires_at| expires_at <= now_unix + margin_seconds)
    }
}

/// Body of a sign-up response: a full session when the provider auto-confirms
/// new users, otherwise the user awaiting email confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SignUpOutcome {
    Session(Session),
    PendingConfirmation(User),
}

pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
