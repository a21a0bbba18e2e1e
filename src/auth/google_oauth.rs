//! Google OAuth 2.0 sign-in (Authorization Code + PKCE).
//!
//! The browser is sent to Google's consent page, comes back to
//! `/login/google/authorized` with a one-time code, and the code is exchanged
//! server-side for an access token. The token is then used to read the
//! user's profile from the userinfo endpoint.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::common::generate_pkce;
use crate::config::Config;
use crate::session::{AccessToken, PendingLogin, UserProfile};

/// Google OAuth 2.0 authorization URL.
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Google OAuth 2.0 token exchange URL.
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Profile endpoint (id, email, name, picture).
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("OAuth client is not configured: missing {0}")]
    NotConfigured(&'static str),
    #[error("no login in progress for this session")]
    NoPendingLogin,
    #[error("OAuth state mismatch")]
    StateMismatch,
    #[error("identity provider denied the login: {0}")]
    Denied(String),
    #[error("authorization code missing from callback")]
    MissingCode,
    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("access token rejected by identity provider")]
    TokenRejected,
}

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CallbackParams {
    /// Check the callback against the login it should answer and return the
    /// code plus PKCE verifier to redeem.
    pub fn verify(&self, pending: Option<PendingLogin>) -> Result<(&str, String), AuthError> {
        if let Some(error) = self.error.as_deref() {
            return Err(AuthError::Denied(error.to_string()));
        }
        let pending = pending.ok_or(AuthError::NoPendingLogin)?;
        if self.state.as_deref() != Some(pending.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }
        let code = self
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCode)?;
        Ok((code, pending.verifier))
    }
}

/// Absolute expiry for a provider-reported lifetime. Lifetimes that are not
/// positive or do not fit a timestamp are treated as unknown.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Option<DateTime<Utc>> {
    if expires_in <= 0 {
        return None;
    }
    Duration::try_seconds(expires_in).and_then(|lifetime| now.checked_add_signed(lifetime))
}

/// Endpoints the gateway talks to. Overridable so tests can point at a mock.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorize: String,
    pub token: String,
    pub userinfo: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorize: AUTH_URL.to_string(),
            token: TOKEN_URL.to_string(),
            userinfo: USERINFO_URL.to_string(),
        }
    }
}

/// Identity gateway backed by Google accounts.
pub struct GoogleIdentity {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
    endpoints: OAuthEndpoints,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleIdentity {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes,
            endpoints: OAuthEndpoints::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        let client_id = config
            .oauth
            .client_id
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(AuthError::NotConfigured("client id"))?;
        let client_secret = config
            .oauth
            .client_secret
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(AuthError::NotConfigured("client secret"))?;
        Ok(Self::new(
            client_id,
            client_secret,
            config.oauth_redirect_uri(),
            config.oauth.scopes.clone(),
            std::time::Duration::from_secs(config.oauth.timeout_secs),
        ))
    }

    pub fn with_endpoints(mut self, endpoints: OAuthEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Start a login: returns the consent-page URL and the state to keep in
    /// the session until the callback arrives.
    pub fn begin_login(&self) -> (String, PendingLogin) {
        let pkce = generate_pkce();
        let scopes = self.scopes.join(" ");
        let url = format!(
            "{base}?\
            response_type=code\
            &client_id={client_id}\
            &redirect_uri={redirect}\
            &scope={scope}\
            &code_challenge={challenge}\
            &code_challenge_method=S256\
            &state={state}\
            &access_type=online\
            &prompt=select_account",
            base = self.endpoints.authorize,
            client_id = urlencoding::encode(&self.client_id),
            redirect = urlencoding::encode(&self.redirect_uri),
            scope = urlencoding::encode(&scopes),
            challenge = pkce.challenge,
            state = pkce.state,
        );
        (
            url,
            PendingLogin {
                state: pkce.state,
                verifier: pkce.verifier,
            },
        )
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<AccessToken, AuthError> {
        let resp = self
            .client
            .post(&self.endpoints.token)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", verifier),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Provider { status, body });
        }

        let token: TokenResponse = resp.json().await?;
        let now = Utc::now();
        let expires_at = token.expires_in.and_then(|secs| {
            let expiry = expiry_after(now, secs);
            if expiry.is_none() {
                tracing::warn!("ignoring unusable token lifetime from provider: {secs}");
            }
            expiry
        });
        Ok(AccessToken::new(token.access_token, expires_at))
    }

    /// Finish a login: validate the callback against the pending handshake and
    /// redeem the code.
    pub async fn complete_login(
        &self,
        pending: Option<PendingLogin>,
        params: &CallbackParams,
    ) -> Result<AccessToken, AuthError> {
        let (code, verifier) = params.verify(pending)?;
        self.exchange_code(code, &verifier).await
    }

    /// Read the signed-in user's profile.
    pub async fn fetch_profile(&self, token: &AccessToken) -> Result<UserProfile, AuthError> {
        let resp = self
            .client
            .get(&self.endpoints.userinfo)
            .bearer_auth(&token.secret)
            .send()
            .await?;

        match resp.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AuthError::TokenRejected);
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                return Err(AuthError::Provider {
                    status: status.as_u16(),
                    body,
                });
            }
        }

        let info: UserInfoResponse = resp.json().await?;
        Ok(UserProfile {
            id: info.id,
            email: info.email,
            name: info.name,
            picture: info.picture,
        })
    }
}
