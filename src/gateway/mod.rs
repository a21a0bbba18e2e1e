//! HTTP gateway for the TravelBuddy web app.
//!
//! Routes:
//! - `GET  /`                         → redirect to `/dashboard`
//! - `GET  /dashboard`                → travel facts + tips
//! - `GET  /chat`, `POST /chat`       → travel chat with session history
//! - `GET  /plan`, `POST /plan`       → itinerary generator
//! - `POST /download_plan`            → itinerary as PDF
//! - `GET  /logout`                   → drop the session
//! - `GET  /login/google[/authorized]`→ Google sign-in
//! - `GET  /health`                   → component health (public)

mod login;
mod pages;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::assistant::TravelAssistant;
use crate::auth::{GoogleIdentity, is_authenticated};
use crate::config::{Config, GatewayConfig};
use crate::health::{COMPONENT_GATEWAY, COMPONENT_OAUTH, COMPONENT_RENDERER, HealthRegistry};
use crate::providers;
use crate::render::PdfRenderer;
use crate::session::{Session, SessionStore, UserProfile};
use crate::templates::Templates;

pub const LOGIN_PATH: &str = "/login/google";
pub const CALLBACK_PATH: &str = "/login/google/authorized";

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub identity: Arc<GoogleIdentity>,
    pub assistant: Arc<TravelAssistant>,
    pub renderer: Arc<PdfRenderer>,
    pub templates: Arc<Templates>,
    pub health: Arc<HealthRegistry>,
}

impl AppState {
    pub fn new(
        sessions: SessionStore,
        identity: GoogleIdentity,
        assistant: TravelAssistant,
        renderer: PdfRenderer,
        templates: Arc<Templates>,
        health: Arc<HealthRegistry>,
    ) -> Self {
        Self {
            sessions: Arc::new(sessions),
            identity: Arc::new(identity),
            assistant: Arc::new(assistant),
            renderer: Arc::new(renderer),
            templates,
            health,
        }
    }

    /// Build every service from config. Fails on missing secrets or an
    /// unresolvable PDF converter.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let health = Arc::new(HealthRegistry::new());
        let templates = Arc::new(Templates::new().context("Failed to compile page templates")?);
        let sessions =
            SessionStore::from_config(&config.session).context("Invalid session configuration")?;
        let identity = GoogleIdentity::from_config(config).context("Invalid OAuth configuration")?;
        let provider = providers::create_provider(&config.ai)?;
        let assistant = TravelAssistant::new(
            provider,
            config.ai.model.clone(),
            config.ai.temperature,
            health.clone(),
        );
        let renderer = PdfRenderer::from_config(&config.renderer, templates.clone())
            .context("PDF rendering is unavailable")?;
        health.mark_component_ok(COMPONENT_RENDERER);

        Ok(Self::new(
            sessions, identity, assistant, renderer, templates, health,
        ))
    }
}

/// Assemble the router with request limits applied.
pub fn router(state: AppState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(pages::handle_index))
        .route("/dashboard", get(pages::handle_dashboard))
        .route(
            "/chat",
            get(pages::handle_chat_page).post(pages::handle_chat_message),
        )
        .route(
            "/plan",
            get(pages::handle_plan_page).post(pages::handle_plan_request),
        )
        .route("/download_plan", post(pages::handle_download_plan))
        .route("/logout", get(login::handle_logout))
        .route(LOGIN_PATH, get(login::handle_login))
        .route(CALLBACK_PATH, get(login::handle_callback))
        .route("/health", get(handle_health))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
}

/// Run the HTTP gateway until Ctrl+C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    // ── Security: refuse public bind without explicit opt-in ──
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "🛑 Refusing to bind to {host}: the app would be exposed to the network.\n\
             Fix: use --host 127.0.0.1 (default), or set\n\
             [gateway] allow_public_bind = true in config.toml."
        );
    }

    let state = AppState::from_config(&config)?;
    let health = state.health.clone();
    let app = router(state, &config.gateway);

    let listener = TcpListener::bind(format!("{host}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let actual_port = listener.local_addr()?.port();

    println!("🧳 TravelBuddy listening on http://{host}:{actual_port}");
    println!("  OAuth redirect URI: {}", config.oauth_redirect_uri());
    println!("  Model: {}", config.ai.model);
    println!("  GET  /health    health check");
    println!("  Press Ctrl+C to stop.\n");

    health.mark_component_ok(COMPONENT_GATEWAY);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

/// True for any host other than loopback.
pub fn is_public_bind(host: &str) -> bool {
    !matches!(host, "127.0.0.1" | "localhost" | "::1" | "[::1]") && !host.starts_with("127.")
}

/// GET /health: always public
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.snapshot_json())
}

// ── Session plumbing ─────────────────────────────────────────────

/// Session id from the request cookie, if the signature checks out.
fn session_id_from_headers(sessions: &SessionStore, headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .filter(|(name, _)| *name == sessions.cookie_name())
        .find_map(|(_, value)| sessions.verify(value))
}

/// A request that passed the authentication check.
pub(crate) struct SignedIn {
    pub id: String,
    pub session: Session,
    pub user: UserProfile,
}

fn redirect_to_login() -> Response {
    Redirect::to(LOGIN_PATH).into_response()
}

/// Authentication check shared by every protected route. Loads the profile
/// into the session on first use; any failure sends the browser to login.
pub(crate) async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<SignedIn, Response> {
    let id = session_id_from_headers(&state.sessions, headers).ok_or_else(redirect_to_login)?;
    let session = state.sessions.get(&id).ok_or_else(redirect_to_login)?;
    if !is_authenticated(&session) {
        return Err(redirect_to_login());
    }

    if let Some(user) = session.user.clone() {
        return Ok(SignedIn { id, session, user });
    }

    let Some(token) = session.token.as_ref() else {
        return Err(redirect_to_login());
    };
    match state.identity.fetch_profile(token).await {
        Ok(user) => {
            state.health.mark_component_ok(COMPONENT_OAUTH);
            let cached = user.clone();
            state.sessions.update(&id, move |s| s.user = Some(cached));
            let mut session = session;
            session.user = Some(user.clone());
            Ok(SignedIn { id, session, user })
        }
        Err(e) => {
            tracing::warn!("profile fetch failed, restarting login: {e}");
            state.health.mark_component_error(COMPONENT_OAUTH, &e);
            state.sessions.update(&id, |s| s.sign_out());
            Err(redirect_to_login())
        }
    }
}

/// Render a page, or a bare 500 if the template itself is broken.
fn render_page<S: Serialize>(state: &AppState, name: &str, ctx: S) -> Response {
    match state.templates.render(name, ctx) {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            tracing::error!("template {name} failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Duration as ChronoDuration;

    fn store() -> SessionStore {
        SessionStore::new("secret", "travelbuddy_session", ChronoDuration::hours(1), false)
            .unwrap()
    }

    #[test]
    fn public_bind_detection() {
        assert!(!is_public_bind("127.0.0.1"));
        assert!(!is_public_bind("localhost"));
        assert!(!is_public_bind("::1"));
        assert!(!is_public_bind("127.0.1.1"));
        assert!(is_public_bind("0.0.0.0"));
        assert!(is_public_bind("192.168.1.10"));
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let store = store();
        let id = store.create();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!(
                "theme=dark; travelbuddy_session={}; lang=en",
                store.sign(&id)
            ))
            .unwrap(),
        );
        assert_eq!(session_id_from_headers(&store, &headers), Some(id));
    }

    #[test]
    fn unsigned_cookie_is_ignored() {
        let store = store();
        let id = store.create();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("travelbuddy_session={id}")).unwrap(),
        );
        assert!(session_id_from_headers(&store, &headers).is_none());
    }

    #[test]
    fn missing_cookie_header_yields_none() {
        assert!(session_id_from_headers(&store(), &HeaderMap::new()).is_none());
    }
}
