use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Router, body::Bytes};
use glbtrace_core::error::GlbError;
use tower_http::trace::TraceLayer;
use tracing::Level;

use crate::mapper::SpanMapper;

pub const PUSH_PATH: &str = "/pubsub_message";

pub fn router(mapper: SpanMapper) -> Router {
    Router::new()
        .route(PUSH_PATH, post(receive_push))
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(mapper)
}

async fn receive_push(State(mapper): State<SpanMapper>, body: Bytes) -> StatusCode {
    match mapper.process_push(&body) {
        Ok(()) => {
            tracing::debug!(bytes = body.len(), "push message mapped to span");
            StatusCode::OK
        }
        Err(err) => {
            tracing::warn!(error = %err, "push message rejected");
            status_for(&err)
        }
    }
}

/// Bad upstream data is acknowledged with a client error so the subscription
/// does not redeliver it; a refused handoff asks for redelivery.
pub fn status_for(err: &GlbError) -> StatusCode {
    if err.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::BAD_REQUEST
    }
}
