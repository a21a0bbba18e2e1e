//! Signed-in pages: dashboard, chat, itinerary planner and PDF download.

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;
use serde::Deserialize;

use super::{AppState, render_page, require_user};
use crate::assistant::ItineraryRequest;
use crate::health::COMPONENT_RENDERER;
use crate::render::RenderError;
use crate::templates::{CHAT, DASHBOARD, PLAN};
use crate::util::truncate_with_ellipsis;

pub const TRAVEL_TIPS: [&str; 3] = [
    "Always carry a backup power bank.",
    "Use Google Maps offline when roaming.",
    "Check weather before planning your outfits.",
];

pub const MISSING_FIELDS: &str = "Please fill all the fields.";
pub const NO_ITINERARY: &str = "No itinerary provided.";
pub const RENDER_FAILED: &str = "Could not render the PDF. Please try again.";

#[derive(Debug, Default, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanForm {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub days: Option<String>,
    #[serde(default)]
    pub interests: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadForm {
    #[serde(default)]
    pub itinerary: Option<String>,
}

/// GET /
pub async fn handle_index() -> Redirect {
    Redirect::to("/dashboard")
}

/// GET /dashboard
pub async fn handle_dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let signed_in = match require_user(&state, &headers).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    let facts = state.assistant.generate_facts().await;
    render_page(
        &state,
        DASHBOARD,
        context! {
            user => &signed_in.user,
            user_name => signed_in.user.display_name(),
            facts => facts,
            tips => TRAVEL_TIPS,
        },
    )
}

/// GET /chat
pub async fn handle_chat_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let signed_in = match require_user(&state, &headers).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    render_page(
        &state,
        CHAT,
        context! {
            user => &signed_in.user,
            user_name => signed_in.user.display_name(),
            chat_history => &signed_in.session.chat_history,
        },
    )
}

/// POST /chat: history shown is what preceded this message; the new reply
/// is rendered separately as `ai_response`.
pub async fn handle_chat_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Response {
    let signed_in = match require_user(&state, &headers).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };
    let history = &signed_in.session.chat_history;

    let message = form
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty());

    let Some(message) = message else {
        return render_page(
            &state,
            CHAT,
            context! {
                user => &signed_in.user,
                user_name => signed_in.user.display_name(),
                chat_history => history,
            },
        );
    };

    tracing::info!(
        turns = history.len(),
        "chat message: {}",
        truncate_with_ellipsis(message, 80)
    );
    let reply = state.assistant.chat(history, message).await;
    if reply.is_generated() {
        let (user_turn, assistant_turn) = (message.to_string(), reply.text().to_string());
        state
            .sessions
            .update(&signed_in.id, move |s| s.push_exchange(user_turn, assistant_turn));
    }

    render_page(
        &state,
        CHAT,
        context! {
            user => &signed_in.user,
            user_name => signed_in.user.display_name(),
            chat_history => history,
            ai_response => reply.text(),
        },
    )
}

/// GET /plan
pub async fn handle_plan_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let signed_in = match require_user(&state, &headers).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    render_page(
        &state,
        PLAN,
        context! {
            user => &signed_in.user,
            user_name => signed_in.user.display_name(),
        },
    )
}

/// POST /plan
pub async fn handle_plan_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<PlanForm>,
) -> Response {
    let signed_in = match require_user(&state, &headers).await {
        Ok(s) => s,
        Err(redirect) => return redirect,
    };

    let destination = form.destination.as_deref().unwrap_or_default();
    let days = form.days.as_deref().unwrap_or_default();
    let interests = form.interests.as_deref().unwrap_or_default();

    let Some(request) = ItineraryRequest::new(destination, days, interests) else {
        return render_page(
            &state,
            PLAN,
            context! {
                user => &signed_in.user,
                user_name => signed_in.user.display_name(),
                error => MISSING_FIELDS,
                destination => destination,
                days => days,
                interests => interests,
            },
        );
    };

    tracing::info!(destination = %request.destination, days = %request.days, "itinerary requested");
    let reply = state.assistant.plan(&request).await;

    render_page(
        &state,
        PLAN,
        context! {
            user => &signed_in.user,
            user_name => signed_in.user.display_name(),
            destination => &request.destination,
            days => &request.days,
            interests => &request.interests,
            itinerary => reply.text(),
            downloadable => reply.is_generated(),
        },
    )
}

/// POST /download_plan
pub async fn handle_download_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<DownloadForm>,
) -> Response {
    if let Err(redirect) = require_user(&state, &headers).await {
        return redirect;
    }

    match state.renderer.render_pdf(form.itinerary.as_deref()).await {
        Ok(pdf) => {
            state.health.mark_component_ok(COMPONENT_RENDERER);
            (
                [
                    (header::CONTENT_TYPE, "application/pdf"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=trip_plan.pdf",
                    ),
                ],
                pdf,
            )
                .into_response()
        }
        Err(RenderError::MissingItinerary) => {
            (StatusCode::BAD_REQUEST, NO_ITINERARY).into_response()
        }
        Err(e) => {
            tracing::error!("PDF rendering failed: {e}");
            state.health.mark_component_error(COMPONENT_RENDERER, &e);
            (StatusCode::BAD_GATEWAY, RENDER_FAILED).into_response()
        }
    }
}
