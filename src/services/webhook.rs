//! HTTP listener: Telegram webhook plus a plain liveness answer
//!
//! `POST /webhook` always answers 200 so Telegram never redelivers; any other
//! request gets `Bot running`.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::CommandHandler;
use crate::adapters::Update;
use crate::error::{Result, TwodError};

pub const WEBHOOK_PATH: &str = "/webhook";
const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared state for the webhook server
pub struct WebhookState {
    /// `None` when updates arrive by long polling
    pub handler: Option<Arc<CommandHandler>>,
    pub secret: Option<String>,
}

impl WebhookState {
    pub fn new(handler: Option<Arc<CommandHandler>>, secret: Option<String>) -> Self {
        Self { handler, secret }
    }

    fn secret_matches(&self, headers: &HeaderMap) -> bool {
        match &self.secret {
            None => true,
            Some(expected) => headers
                .get(SECRET_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v == expected)
                .unwrap_or(false),
        }
    }
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(webhook_handler).fallback(liveness_handler))
        .fallback(liveness_handler)
        .with_state(state)
}

pub struct WebhookServer {
    state: Arc<WebhookState>,
    port: u16,
}

impl WebhookServer {
    pub fn new(state: Arc<WebhookState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let app = router(Arc::clone(&self.state));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting HTTP server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| TwodError::Internal(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

async fn webhook_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !state.secret_matches(&headers) {
        warn!("Webhook call with wrong secret token ignored");
        return StatusCode::OK;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Unreadable webhook update: {}", e);
            return StatusCode::OK;
        }
    };

    match &state.handler {
        Some(handler) => {
            handler.handle_update(&update).await;
        }
        None => debug!(update_id = update.update_id, "Webhook update without handler"),
    }
    StatusCode::OK
}

async fn liveness_handler() -> &'static str {
    "Bot running"
}
