use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use super::{
    cookies::CookieStore,
    pkce,
    storage::{self, code_verifier_key},
    types::now_unix,
    AuthError, AuthProvider, Credentials, Session, SignUpOptions, SignUpOutcome, User,
};

/// Refresh access tokens that expire within this many seconds.
const EXPIRY_MARGIN_SECONDS: i64 = 10;

/// Provider client bound to one cookie accessor.
///
/// Provider errors are returned unmodified; nothing is retried.
pub struct SessionClient<'a> {
    provider: &'a AuthProvider,
    cookies: &'a dyn CookieStore,
}

impl<'a> SessionClient<'a> {
    pub fn new(provider: &'a AuthProvider, cookies: &'a dyn CookieStore) -> Self {
        Self { provider, cookies }
    }

    fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        let anon_key = self.provider.anon_key();
        self.provider
            .http()
            .request(method, self.provider.endpoint(path))
            .header("apikey", anon_key)
            .bearer_auth(bearer.unwrap_or(anon_key))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, AuthError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::from_body(status, &body));
        }
        serde_json::from_str(&body).map_err(|err| AuthError::InvalidResponse(err.to_string()))
    }

    async fn send_empty(request: RequestBuilder) -> Result<(), AuthError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Err(AuthError::from_body(status, &body))
    }

    fn save_session(&self, session: &Session) -> Result<(), AuthError> {
        storage::save_session(
            self.cookies,
            self.provider.storage_key(),
            session,
            self.provider.cookie_options(),
        )
    }

    fn remove_session(&self) {
        storage::remove_chunked(
            self.cookies,
            self.provider.storage_key(),
            self.provider.cookie_options(),
        );
    }

    fn remove_code_verifier(&self) {
        let key = code_verifier_key(self.provider.storage_key());
        if self.cookies.get(&key).is_some() {
            self.cookies.remove(&key, self.provider.cookie_options());
        }
    }

    /// Sign in with email and password; the session is stored on success.
    ///
    /// # Errors
    /// Returns the provider error when the credentials are rejected.
    #[instrument(skip_all, fields(email = %credentials.email))]
    pub async fn sign_in_with_password(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, AuthError> {
        let request = self
            .request(Method::POST, "token", None)
            .query(&[("grant_type", "password")])
            .json(&json!({
                "email": credentials.email,
                "password": credentials.password,
            }));

        let session = Self::send::<Session>(request)
            .await?
            .with_expiry_from(now_unix());
        self.save_session(&session)?;
        debug!("signed in");

        Ok(session)
    }

    /// Register a new user.
    ///
    /// A `PKCE` verifier is kept in a cookie so the confirmation link can later
    /// be exchanged for a session on this site.
    ///
    /// # Errors
    /// Returns the provider error when the sign-up is rejected.
    #[instrument(skip_all, fields(email = %credentials.email))]
    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        options: &SignUpOptions,
    ) -> Result<SignUpOutcome, AuthError> {
        let verifier = pkce::generate_verifier()?;

        let mut request = self.request(Method::POST, "signup", None);
        if let Some(redirect_to) = &options.email_redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        let request = request.json(&json!({
            "email": credentials.email,
            "password": credentials.password,
            "code_challenge": pkce::challenge(&verifier),
            "code_challenge_method": pkce::CHALLENGE_METHOD,
        }));

        let outcome = Self::send::<SignUpOutcome>(request).await?;
        match outcome {
            SignUpOutcome::Session(session) => {
                let session = session.with_expiry_from(now_unix());
                self.save_session(&session)?;
                self.remove_code_verifier();
                debug!("signed up and confirmed");
                Ok(SignUpOutcome::Session(session))
            }
            SignUpOutcome::PendingConfirmation(user) => {
                self.cookies.set(
                    &code_verifier_key(self.provider.storage_key()),
                    &verifier,
                    self.provider.cookie_options(),
                );
                debug!("signed up, awaiting email confirmation");
                Ok(SignUpOutcome::PendingConfirmation(user))
            }
        }
    }

    /// Revoke the session at the provider and drop the session cookies.
    ///
    /// Cookies are cleared even when the provider call fails; a session the
    /// provider no longer knows (401/403/404) is not an error.
    ///
    /// # Errors
    /// Returns any other provider or transport error.
    #[instrument(skip_all)]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = match storage::load_session(self.cookies, self.provider.storage_key()) {
            Some(session) => {
                let request = self
                    .request(Method::POST, "logout", Some(&session.access_token))
                    .query(&[("scope", "global")]);
                match Self::send_empty(request).await {
                    Err(err)
                        if err.is_unauthorized() || err.status() == Some(StatusCode::NOT_FOUND) =>
                    {
                        debug!("session already gone at provider: {err}");
                        Ok(())
                    }
                    other => other,
                }
            }
            None => Ok(()),
        };

        self.remove_session();
        self.remove_code_verifier();

        result
    }

    /// Current session from the cookies, refreshed when about to expire.
    ///
    /// # Errors
    /// Returns the provider error when the refresh token is rejected; the
    /// stored session is removed in that case.
    pub async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = storage::load_session(self.cookies, self.provider.storage_key())
        else {
            return Ok(None);
        };

        if !session.expires_within(now_unix(), EXPIRY_MARGIN_SECONDS) {
            return Ok(Some(session));
        }

        self.refresh_session(&session.refresh_token).await.map(Some)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let request = self
            .request(Method::POST, "token", None)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));

        match Self::send::<Session>(request).await {
            Ok(session) => {
                let session = session.with_expiry_from(now_unix());
                self.save_session(&session)?;
                debug!("session refreshed");
                Ok(session)
            }
            Err(err) => {
                if err.status().is_some_and(|status| status.is_client_error()) {
                    self.remove_session();
                }
                Err(err)
            }
        }
    }

    /// Ask the provider who owns the current session.
    ///
    /// # Errors
    /// Returns [`AuthError::SessionMissing`] without a stored session, or the
    /// provider error; a rejected access token also removes the session.
    #[instrument(skip_all)]
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.get_session().await?.ok_or(AuthError::SessionMissing)?;

        let request = self.request(Method::GET, "user", Some(&session.access_token));
        match Self::send::<User>(request).await {
            Ok(user) => Ok(user),
            Err(err) => {
                if err.is_unauthorized() {
                    self.remove_session();
                }
                Err(err)
            }
        }
    }

    /// Trade the one-time code from an email link for a session.
    ///
    /// # Errors
    /// Returns [`AuthError::CodeVerifierMissing`] when this browser never
    /// started the flow, or the provider error for an invalid/expired code.
    #[instrument(skip_all)]
    pub async fn exchange_code_for_session(&self, code: &str) -> Result<Session, AuthError> {
        let key = code_verifier_key(self.provider.storage_key());
        let verifier = self
            .cookies
            .get(&key)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::CodeVerifierMissing)?;

        let request = self
            .request(Method::POST, "token", None)
            .query(&[("grant_type", "pkce")])
            .json(&json!({
                "auth_code": code,
                "code_verifier": verifier,
            }));

        let result = Self::send::<Session>(request).await;
        self.cookies.remove(&key, self.provider.cookie_options());

        let session = result?.with_expiry_from(now_unix());
        self.save_session(&session)?;
        debug!("code exchanged for session");

        Ok(session)
    }

    /// Provider liveness probe.
    ///
    /// # Errors
    /// Returns an error when the provider is unreachable or unhealthy.
    pub async fn health(&self) -> Result<(), AuthError> {
        Self::send_empty(self.request(Method::GET, "health", None)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::supabase::{create_browser_client, BrowserCookies, CookieOptions};
    use anyhow::Result;
    use secrecy::SecretString;
    use serde_json::Value;
    use std::net::TcpListener;
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const USER_ID: &str = "9f3c2a4e-6b1d-4c8e-9a0f-2d7e5b3c1a90";

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn provider(server: &MockServer) -> AuthProvider {
        AuthProvider::new(
            Url::parse(&server.uri()).unwrap(),
            SecretString::from("anon-key"),
            CookieOptions::default(),
        )
        .unwrap()
    }

    fn session_body(access_token: &str, refresh_token: &str) -> Value {
        json!({
            "access_token": access_token,
            "refresh_token": refresh_token,
            "token_type": "bearer",
            "expires_in": 3600,
            "user": { "id": USER_ID, "email": "reader@example.com" }
        })
    }

    fn credentials() -> Credentials {
        Credentials {
            email: "reader@example.com".to_string(),
            password: "correct horse".to_string(),
        }
    }

    fn stored_session(provider: &AuthProvider, cookies: &BrowserCookies) -> Option<Session> {
        storage::load_session(cookies, provider.storage_key())
    }

    #[tokio::test]
    async fn sign_in_stores_session_cookie() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon-key"))
            .and(body_partial_json(json!({ "email": "reader@example.com" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("a1", "r1")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let client = create_browser_client(&provider, &cookies);
        let session = client.sign_in_with_password(&credentials()).await?;

        assert_eq!(session.access_token, "a1");
        assert!(session.expires_at.is_some());
        let stored = stored_session(&provider, &cookies).unwrap();
        assert_eq!(stored.refresh_token, "r1");
        Ok(())
    }

    #[tokio::test]
    async fn sign_in_passes_provider_error_through() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 400,
                "error_code": "invalid_credentials",
                "msg": "Invalid login credentials"
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let client = create_browser_client(&provider, &cookies);
        let result = client.sign_in_with_password(&credentials()).await;

        match result {
            Err(AuthError::Api { status, message, .. }) => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Invalid login credentials");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(cookies.names().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_keeps_code_verifier_until_confirmation() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(query_param("redirect_to", "https://astewai.dev/auth/callback"))
            .and(body_partial_json(json!({ "code_challenge_method": "s256" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": USER_ID, "email": "reader@example.com" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let client = create_browser_client(&provider, &cookies);
        let outcome = client
            .sign_up(
                &credentials(),
                &SignUpOptions {
                    email_redirect_to: Some("https://astewai.dev/auth/callback".to_string()),
                },
            )
            .await?;

        assert!(matches!(outcome, SignUpOutcome::PendingConfirmation(ref user)
            if user.id == Uuid::parse_str(USER_ID).unwrap()));
        let verifier = cookies.get(&code_verifier_key(provider.storage_key()));
        assert_eq!(verifier.map(|v| v.len()), Some(43));
        assert!(stored_session(&provider, &cookies).is_none());

        // The challenge sent to the provider matches the stored verifier.
        let requests = server.received_requests().await.unwrap_or_default();
        let body: Value = serde_json::from_slice(&requests[0].body)?;
        let verifier = cookies
            .get(&code_verifier_key(provider.storage_key()))
            .unwrap();
        assert_eq!(body["code_challenge"], json!(pkce::challenge(&verifier)));
        Ok(())
    }

    #[tokio::test]
    async fn exchange_code_uses_and_clears_verifier() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "pkce"))
            .and(body_partial_json(
                json!({ "auth_code": "one-time", "code_verifier": "verifier" }),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("a2", "r2")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        cookies.set(
            &code_verifier_key(provider.storage_key()),
            "verifier",
            provider.cookie_options(),
        );
        let client = create_browser_client(&provider, &cookies);
        let session = client.exchange_code_for_session("one-time").await?;

        assert_eq!(session.access_token, "a2");
        assert!(cookies
            .get(&code_verifier_key(provider.storage_key()))
            .is_none());
        assert_eq!(stored_session(&provider, &cookies).map(|s| s.access_token), Some("a2".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn exchange_code_without_verifier_never_calls_provider() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let client = create_browser_client(&provider, &cookies);
        let result = client.exchange_code_for_session("one-time").await;
        assert!(matches!(result, Err(AuthError::CodeVerifierMissing)));
        Ok(())
    }

    #[tokio::test]
    async fn get_user_without_session_is_missing() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let client = create_browser_client(&provider, &cookies);
        assert!(matches!(
            client.get_user().await,
            Err(AuthError::SessionMissing)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn get_user_refreshes_expired_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(body_partial_json(json!({ "refresh_token": "old-refresh" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("fresh", "new-refresh")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": USER_ID, "email": "reader@example.com" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let expired = Session {
            access_token: "stale".to_string(),
            refresh_token: "old-refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            expires_at: Some(now_unix() - 60),
            user: None,
        };
        storage::save_session(&cookies, provider.storage_key(), &expired, provider.cookie_options())?;

        let client = create_browser_client(&provider, &cookies);
        let user = client.get_user().await?;

        assert_eq!(user.email.as_deref(), Some("reader@example.com"));
        let stored = stored_session(&provider, &cookies).unwrap();
        assert_eq!(stored.refresh_token, "new-refresh");
        Ok(())
    }

    #[tokio::test]
    async fn rejected_refresh_token_clears_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid Refresh Token: Already Used"
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let expired = Session {
            access_token: "stale".to_string(),
            refresh_token: "used".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            expires_at: Some(0),
            user: None,
        };
        storage::save_session(&cookies, provider.storage_key(), &expired, provider.cookie_options())?;

        let client = create_browser_client(&provider, &cookies);
        let result = client.get_user().await;
        assert!(matches!(result, Err(AuthError::Api { status, .. }) if status == StatusCode::BAD_REQUEST));
        assert!(stored_session(&provider, &cookies).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_outage_keeps_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({ "msg": "upstream unavailable" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let expired = Session {
            access_token: "stale".to_string(),
            refresh_token: "still-valid".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            expires_at: Some(0),
            user: None,
        };
        storage::save_session(&cookies, provider.storage_key(), &expired, provider.cookie_options())?;

        let client = create_browser_client(&provider, &cookies);
        let result = client.get_user().await;
        assert!(matches!(result, Err(AuthError::Api { status, .. }) if status == StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(
            stored_session(&provider, &cookies).map(|s| s.refresh_token),
            Some("still-valid".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn revoked_access_token_clears_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": 401,
                "msg": "invalid JWT: unable to parse or verify signature"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let session: Session = serde_json::from_value(session_body("a1", "r1"))?;
        storage::save_session(&cookies, provider.storage_key(), &session.with_expiry_from(now_unix()), provider.cookie_options())?;

        let client = create_browser_client(&provider, &cookies);
        let result = client.get_user().await;
        assert!(matches!(&result, Err(err) if err.is_unauthorized()));
        assert!(stored_session(&provider, &cookies).is_none());
        assert!(cookies.names().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn auto_confirmed_sign_up_stores_session_without_verifier() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("a1", "r1")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let client = create_browser_client(&provider, &cookies);
        let outcome = client
            .sign_up(&credentials(), &SignUpOptions::default())
            .await?;

        assert!(matches!(outcome, SignUpOutcome::Session(ref session) if session.access_token == "a1"));
        assert_eq!(
            stored_session(&provider, &cookies).map(|s| s.access_token),
            Some("a1".to_string())
        );
        assert!(cookies
            .get(&code_verifier_key(provider.storage_key()))
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_clears_cookies_even_when_token_is_revoked() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(query_param("scope", "global"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": 401,
                "msg": "invalid JWT"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let session: Session = serde_json::from_value(session_body("a1", "r1"))?;
        storage::save_session(&cookies, provider.storage_key(), &session.with_expiry_from(now_unix()), provider.cookie_options())?;

        let client = create_browser_client(&provider, &cookies);
        client.sign_out().await?;

        assert!(cookies.names().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_without_session_is_a_no_op() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let provider = provider(&server);
        let cookies = BrowserCookies::new();
        let client = create_browser_client(&provider, &cookies);
        client.sign_out().await?;
        Ok(())
    }
}
