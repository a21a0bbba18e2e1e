//! Google sign-in handshake and logout.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};

use super::{AppState, session_id_from_headers};
use crate::auth::{AuthError, CallbackParams};
use crate::health::COMPONENT_OAUTH;

pub const LOGIN_DENIED: &str = "Sign-in was cancelled or denied.";
pub const STATE_MISMATCH: &str = "Sign-in state mismatch. Please try signing in again.";
pub const MISSING_CODE: &str = "Sign-in response was missing the authorization code.";
pub const EXCHANGE_FAILED: &str = "Could not complete sign-in with Google. Please try again.";

/// GET /login/google: start the handshake and bounce to Google.
pub async fn handle_login(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let existing = session_id_from_headers(&state.sessions, &headers)
        .filter(|id| state.sessions.get(id).is_some());
    let id = existing.unwrap_or_else(|| state.sessions.create());

    let (url, pending) = state.identity.begin_login();
    if state
        .sessions
        .update(&id, move |s| s.pending_login = Some(pending))
        .is_none()
    {
        // Expired between lookup and update; the next attempt gets a fresh one.
        return Redirect::to(super::LOGIN_PATH).into_response();
    }

    tracing::debug!("redirecting to Google sign-in");
    (
        [(header::SET_COOKIE, state.sessions.set_cookie_header(&id))],
        Redirect::to(&url),
    )
        .into_response()
}

/// Status and page text for a failed callback.
fn callback_failure(state: &AppState, err: &AuthError) -> Response {
    match err {
        AuthError::Denied(reason) => {
            tracing::warn!("Google sign-in returned error: {reason}");
            (StatusCode::UNAUTHORIZED, LOGIN_DENIED).into_response()
        }
        AuthError::NoPendingLogin | AuthError::StateMismatch => {
            tracing::warn!("sign-in callback rejected: {err}");
            (StatusCode::BAD_REQUEST, STATE_MISMATCH).into_response()
        }
        AuthError::MissingCode => (StatusCode::BAD_REQUEST, MISSING_CODE).into_response(),
        _ => {
            tracing::error!("authorization code exchange failed: {err}");
            state.health.mark_component_error(COMPONENT_OAUTH, err);
            (StatusCode::BAD_GATEWAY, EXCHANGE_FAILED).into_response()
        }
    }
}

/// GET /login/google/authorized: finish the handshake.
pub async fn handle_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    let id = session_id_from_headers(&state.sessions, &headers);

    // One-shot: the pending login is consumed whatever happens next.
    let pending = id
        .as_deref()
        .and_then(|id| state.sessions.update(id, |s| s.pending_login.take()))
        .flatten();

    let token = match state.identity.complete_login(pending, &params).await {
        Ok(token) => token,
        Err(e) => return callback_failure(&state, &e),
    };

    // The pre-login id was handed out to an anonymous browser; never let it
    // become an authenticated one.
    let Some(id) = id.and_then(|old| state.sessions.rotate(&old)) else {
        return callback_failure(&state, &AuthError::NoPendingLogin);
    };

    // Profile fetch failures are retried by the auth check on the next page.
    let profile = match state.identity.fetch_profile(&token).await {
        Ok(profile) => {
            state.health.mark_component_ok(COMPONENT_OAUTH);
            Some(profile)
        }
        Err(e) => {
            tracing::warn!("profile fetch after sign-in failed: {e}");
            state.health.mark_component_error(COMPONENT_OAUTH, &e);
            None
        }
    };

    if let Some(user) = &profile {
        tracing::info!(user_id = %user.id, "user signed in");
    }
    state.sessions.update(&id, move |s| {
        s.token = Some(token);
        s.user = profile;
    });

    (
        [(header::SET_COOKIE, state.sessions.set_cookie_header(&id))],
        Redirect::to("/dashboard"),
    )
        .into_response()
}

/// GET /logout
pub async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id_from_headers(&state.sessions, &headers) {
        if state.sessions.destroy(&id) {
            tracing::info!("user signed out");
        }
    }
    (
        [(header::SET_COOKIE, state.sessions.clear_cookie_header())],
        Redirect::to("/"),
    )
        .into_response()
}
