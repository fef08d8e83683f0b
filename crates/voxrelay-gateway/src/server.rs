//! Axum-based HTTP + WebSocket server.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use voxrelay_core::protocol::{ErrorBody, StartConversationRequest, StartConversationResponse};

use crate::connection::handle_ws_connection;
use crate::lifecycle;
use crate::state::GatewayState;
use crate::sweeper::IdleSweeper;

const STARTED_MESSAGE: &str = "Conversation started. Connect to WebSocket to continue.";

/// Build the HTTP router.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/start-conversation", post(start_conversation_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway and serve until Ctrl-C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{port}", state.config.gateway_bind());
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");
    serve(state, listener, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// The idle sweeper runs for the lifetime of the server.
pub async fn serve(
    state: Arc<GatewayState>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let sweeper = IdleSweeper::new(
        state.registry.clone(),
        state.settings.sweep_interval(),
        state.settings.idle_timeout(),
    )
    .start(cancel.clone());

    let result = axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown)
        .await;

    cancel.cancel();
    let _ = sweeper.await;
    state.registry.clear().await;
    info!("Gateway stopped");

    result?;
    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn start_conversation_handler(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<StartConversationRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected start-conversation body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    match lifecycle::start_conversation(&state, &request.prompt).await {
        Ok(connection_id) => Json(StartConversationResponse {
            connection_id,
            message: STARTED_MESSAGE.into(),
        })
        .into_response(),
        Err(e) => {
            let status = if e.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                error!(error = %e, "Failed to start conversation");
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, e.client_message())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsParams {
    connection_id: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let Some(session_id) = params.connection_id.filter(|id| !id.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "connectionId is required");
    };

    // Unknown ids are refused before the handshake completes
    if !state.registry.contains(&session_id).await {
        warn!(session_id = %session_id, "Upgrade for unknown session refused");
        return error_response(StatusCode::NOT_FOUND, "Connection not found");
    }

    info!(session_id = %session_id, "WebSocket client connected");
    ws.on_upgrade(move |socket| handle_ws_connection(state, session_id, socket))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.len().await,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(%e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
