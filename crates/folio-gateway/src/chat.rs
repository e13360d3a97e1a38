//! `POST /api/chat` handler

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use folio_core::{ConfigError, resolve};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::protocol::{
    ChatReply, ChatRequest, ERR_EMPTY_LAST_MESSAGE, ERR_NO_MESSAGES, ErrorBody,
};
use crate::server::GatewayState;

pub async fn chat_handler(State(state): State<GatewayState>, body: Bytes) -> Response {
    let span = info_span!("chat", request_id = %Uuid::new_v4());
    handle_chat(&state, &body).instrument(span).await
}

fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}

/// Validate the request, resolve providers and dispatch
pub async fn handle_chat(state: &GatewayState, body: &[u8]) -> Response {
    let request = match ChatRequest::from_json(body) {
        Ok(r) => r,
        Err(e) => {
            error!("Unexpected error in chat handler: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::unexpected(e.to_string()),
            );
        }
    };

    let messages = request.into_messages();
    let Some(last) = messages.last() else {
        return error_response(StatusCode::BAD_REQUEST, ErrorBody::new(ERR_NO_MESSAGES));
    };
    if last.content.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, ErrorBody::new(ERR_EMPTY_LAST_MESSAGE));
    }

    let env = state.env.snapshot();
    let resolution = match resolve(&env, state.profile.as_deref(), state.router.order()) {
        Ok(r) => r,
        Err(e) => {
            error!("Provider configuration failed: {}", e);
            let body = ErrorBody::unexpected(e.to_string());
            let body = match e {
                ConfigError::NoProviders { errors } => body.with_config_errors(errors),
                _ => body,
            };
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, body);
        }
    };

    info!(
        "Available providers: [{}]",
        resolution
            .configured()
            .iter()
            .map(|k| k.id())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if !resolution.errors.is_empty() {
        warn!("Provider configuration warnings: {:?}", resolution.errors);
    }

    match state.router.dispatch(&resolution, &last.content).await {
        Ok(answer) => {
            let id = chrono::Utc::now().timestamp_millis();
            (StatusCode::OK, Json(ChatReply::from_answer(answer, id))).into_response()
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::all_failed(&e)),
    }
}
