use crate::{
    api::state::AppState,
    supabase::{create_server_client, RequestCookies},
    GIT_COMMIT_HASH,
};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info_span, warn, Instrument};

static X_APP: HeaderName = HeaderName::from_static("x-app");

#[derive(Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    provider: String,
}

impl Health {
    /// `name:version:shorthash`, the hash left empty when unknown.
    fn x_app(&self) -> String {
        let short_hash = self.commit.get(..7).filter(|_| self.commit.len() > 7);
        format!(
            "{}:{}:{}",
            self.name,
            self.version,
            short_hash.unwrap_or_default()
        )
    }
}

/// Liveness of this service plus reachability of the auth provider.
pub async fn health(method: Method, state: Extension<Arc<AppState>>) -> impl IntoResponse {
    let cookies = RequestCookies::default();
    let probe_span = info_span!("provider.health", url = %state.provider().base_url());
    let result = create_server_client(state.provider(), &cookies)
        .health()
        .instrument(probe_span)
        .await;

    let status = match &result {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            error!("Auth provider health check failed: {err}");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: if result.is_ok() { "ok" } else { "error" }.to_string(),
    };

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&health.x_app()) {
        Ok(value) => {
            headers.insert(X_APP.clone(), value);
        }
        Err(err) => warn!("Invalid X-App header value: {err}"),
    }

    let body: Response = if method == Method::HEAD {
        Body::empty().into_response()
    } else {
        Json(&health).into_response()
    };

    (status, headers, body)
}
