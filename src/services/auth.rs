// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Backend authentication.
//!
//! Handles:
//! - Registration and login
//! - The `x-api-key` header on every request
//! - Bearer tokens on authenticated requests
//! - Access token refresh on 401 (once per request)

use crate::config::Config;
use crate::error::{AuthError, NetworkError};
use crate::models::auth::{
    AccessTokenRequest, AccessTokenResponse, LoginRequest, LoginResponse, RegisterRequest,
};
use crate::models::AuthInfo;
use crate::services::session::SessionStorage;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use tokio::sync::Mutex;
use validator::Validate;

const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client for the run backend with token management.
pub struct AuthedHttpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    session: Arc<dyn SessionStorage>,
    /// Serializes token refreshes so concurrent 401s refresh once.
    refresh_lock: Mutex<()>,
}

impl AuthedHttpClient {
    pub fn new(config: &Config, session: Arc<dyn SessionStorage>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            session,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &Arc<dyn SessionStorage> {
        &self.session
    }

    /// Unauthenticated request with the API key attached.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)
    }

    /// Send an authenticated request, refreshing the access token once on 401.
    ///
    /// `build` is called again for the retry, so it must be able to rebuild
    /// the request (multipart bodies can't be cloned).
    pub async fn send_authed<F>(&self, build: F) -> Result<Response, NetworkError>
    where
        F: Fn(&Self) -> Result<RequestBuilder, NetworkError>,
    {
        let token = self.session.get().await.map(|s| s.access_token);
        let response = self.send_with_token(&build, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!("Access token rejected, refreshing");
        match self.refresh_access_token(token.as_deref()).await {
            Some(new_token) => self.send_with_token(&build, Some(&new_token)).await,
            None => Err(NetworkError::Unauthorized),
        }
    }

    async fn send_with_token<F>(&self, build: &F, token: Option<&str>) -> Result<Response, NetworkError>
    where
        F: Fn(&Self) -> Result<RequestBuilder, NetworkError>,
    {
        let mut request = build(self)?;
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(|e| NetworkError::from_transport(&e))
    }

    /// Get a fresh access token after `stale` was rejected.
    ///
    /// Returns `None` if there is no session or the refresh failed. A refresh
    /// the server rejects clears the session.
    async fn refresh_access_token(&self, stale: Option<&str>) -> Option<String> {
        let _guard = self.refresh_lock.lock().await;

        let session = self.session.get().await?;
        // Another request may have refreshed while we waited for the lock
        if Some(session.access_token.as_str()) != stale {
            return Some(session.access_token);
        }

        let body = AccessTokenRequest {
            refresh_token: session.refresh_token.clone(),
            user_id: session.user_id.clone(),
        };
        let result = self
            .request(Method::POST, "/accessToken")
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Token refresh rejected, clearing session");
            if let Err(e) = self.session.set(None).await {
                tracing::error!(error = %e, "Failed to clear session");
            }
            return None;
        }

        let refreshed: AccessTokenResponse = match response.json().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed token refresh response");
                return None;
            }
        };

        let updated = AuthInfo {
            access_token: refreshed.access_token.clone(),
            ..session
        };
        if let Err(e) = self.session.set(Some(updated)).await {
            tracing::error!(error = %e, "Failed to store refreshed session");
        }
        tracing::info!("Access token refreshed");
        Some(refreshed.access_token)
    }
}

/// Map a non-success response to a network error.
pub fn check_status(response: Response) -> Result<Response, NetworkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!("Backend rate limit hit (429)");
    }
    Err(NetworkError::from_status(status.as_u16()))
}

/// Registration and login against the backend.
pub struct AuthService {
    client: Arc<AuthedHttpClient>,
}

impl AuthService {
    pub fn new(client: Arc<AuthedHttpClient>) -> Self {
        Self { client }
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let request = RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        request.validate()?;

        let response = self
            .client
            .request(Method::POST, "/register")
            .json(&request)
            .send()
            .await
            .map_err(|e| NetworkError::from_transport(&e))?;

        match response.status() {
            s if s.is_success() => {
                tracing::info!("Registered new account");
                Ok(())
            }
            StatusCode::CONFLICT => Err(AuthError::EmailConflict),
            s => Err(NetworkError::from_status(s.as_u16()).into()),
        }
    }

    /// Sign in and store the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthInfo, AuthError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };

        let response = self
            .client
            .request(Method::POST, "/login")
            .json(&request)
            .send()
            .await
            .map_err(|e| NetworkError::from_transport(&e))?;

        let response = match response.status() {
            s if s.is_success() => response,
            StatusCode::UNAUTHORIZED => return Err(AuthError::InvalidCredentials),
            s => return Err(NetworkError::from_status(s.as_u16()).into()),
        };

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| NetworkError::from_transport(&e))?;

        let info = AuthInfo {
            access_token: login.access_token,
            refresh_token: login.refresh_token,
            user_id: login.user_id,
        };
        self.client
            .session()
            .set(Some(info.clone()))
            .await
            .map_err(|e| AuthError::Session(e.to_string()))?;

        tracing::info!(user_id = %info.user_id, "Signed in");
        Ok(info)
    }

    pub async fn is_logged_in(&self) -> bool {
        self.client.session().get().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session::InMemorySessionStorage;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(access_token: &str) -> AuthInfo {
        AuthInfo {
            access_token: access_token.to_string(),
            refresh_token: "refresh".to_string(),
            user_id: "user-1".to_string(),
        }
    }

    fn test_client(server: &MockServer, info: Option<AuthInfo>) -> Arc<AuthedHttpClient> {
        let config = Config {
            api_base_url: server.uri(),
            ..Config::test_default()
        };
        Arc::new(AuthedHttpClient::new(
            &config,
            Arc::new(InMemorySessionStorage::new(info)),
        ))
    }

    #[tokio::test]
    async fn test_refresh_on_401_then_retry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/runs"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/accessToken"))
            .and(header("x-api-key", "test_api_key"))
            .and(body_json(serde_json::json!({
                "refreshToken": "refresh",
                "userId": "user-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "fresh",
                "expirationTimestamp": 0
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/runs"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = test_client(&server, Some(session("stale")));
        let response = client
            .send_authed(|c| Ok(c.request(Method::GET, "/runs")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            client.session().get().await.unwrap().access_token,
            "fresh"
        );
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/runs"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/accessToken"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = test_client(&server, Some(session("stale")));
        let result = client
            .send_authed(|c| Ok(c.request(Method::GET, "/runs")))
            .await;

        assert_eq!(result.unwrap_err(), NetworkError::Unauthorized);
        assert_eq!(client.session().get().await, None);
    }

    #[tokio::test]
    async fn test_login_stores_session() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "a",
                "refreshToken": "r",
                "accessTokenExpirationTimestamp": 0,
                "userId": "user-9"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server, None);
        let auth = AuthService::new(client.clone());
        assert!(!auth.is_logged_in().await);

        let info = auth.login("runner@example.com", "Secret123x").await.unwrap();
        assert_eq!(info.user_id, "user-9");
        assert!(auth.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let auth = AuthService::new(test_client(&server, None));
        let result = auth.login("runner@example.com", "wrong").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_register_validates_before_sending() {
        let server = MockServer::start().await;
        let auth = AuthService::new(test_client(&server, None));

        let result = auth.register("not-an-email", "Secret123x").await;
        assert!(matches!(result, Err(AuthError::InvalidInput(_))));

        let result = auth.register("runner@example.com", "short").await;
        assert!(matches!(result, Err(AuthError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let auth = AuthService::new(test_client(&server, None));
        let result = auth.register("runner@example.com", "Secret123x").await;
        assert!(matches!(result, Err(AuthError::EmailConflict)));
    }
}
