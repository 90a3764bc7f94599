use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider answered with a non-success status; the message is its own.
    #[error("{message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },
    #[error("Auth provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid auth provider response: {0}")]
    InvalidResponse(String),
    #[error("Auth session missing!")]
    SessionMissing,
    #[error("PKCE code verifier not found in storage")]
    CodeVerifierMissing,
    #[error("Invalid auth provider configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    /// Build an `Api` error from a provider error body.
    ///
    /// The provider has used several shapes over time (`msg`/`error_code`,
    /// `error_description`/`error`, `message`); the first present one wins.
    pub(crate) fn from_body(status: StatusCode, body: &str) -> Self {
        let json = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
        let field = |name: &str| json.get(name).and_then(Value::as_str).map(str::to_string);

        let message = field("msg")
            .or_else(|| field("error_description"))
            .or_else(|| field("message"))
            .or_else(|| field("error"))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("Unknown error").to_string()
                } else {
                    body.trim().to_string()
                }
            });
        let code = field("error_code").or_else(|| field("error"));

        Self::Api {
            status,
            code,
            message,
        }
    }

    /// Provider rejected the credentials carried by the request (token revoked,
    /// user deleted, refresh token already used).
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::Api { status, .. }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
