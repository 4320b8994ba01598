use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;
use uuid::Uuid;

use store::GraphStore;

use crate::handler::Reply;
use crate::metrics::{Metrics, MetricsSnapshot};

/// One message delivered on the import subject.
#[derive(Debug)]
pub struct InboundMessage {
    pub id: Uuid,
    pub data: Bytes,
    pub reply: Option<oneshot::Sender<Reply>>,
}

impl InboundMessage {
    pub fn new(data: Bytes, reply: Option<oneshot::Sender<Reply>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            reply,
        }
    }
}

#[derive(Clone)]
pub struct IngressState {
    sender: mpsc::Sender<InboundMessage>,
    store: Arc<dyn GraphStore>,
    metrics: Arc<Metrics>,
}

impl IngressState {
    pub fn new(
        sender: mpsc::Sender<InboundMessage>,
        store: Arc<dyn GraphStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            sender,
            store,
            metrics,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    store: String,
}

/// `POST /{topic}` waits for the reply, `POST /{topic}/publish` does not.
pub fn router(topic: &str, state: IngressState) -> Router {
    Router::new()
        .route(&format!("/{topic}"), post(request))
        .route(&format!("/{topic}/publish"), post(publish))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .with_state(Arc::new(state))
}

fn reply_response(status: StatusCode, reply: Reply) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.to_bytes(),
    )
        .into_response()
}

async fn request(State(state): State<Arc<IngressState>>, body: Bytes) -> Response {
    let (tx, rx) = oneshot::channel();
    let message = InboundMessage::new(body, Some(tx));
    let id = message.id;

    if state.sender.send(message).await.is_err() {
        warn!(%id, "Importer is shutting down, rejecting message");
        return reply_response(StatusCode::SERVICE_UNAVAILABLE, Reply { ok: false });
    }

    match rx.await {
        Ok(reply) => reply_response(StatusCode::OK, reply),
        Err(_) => {
            warn!(%id, "Message dropped without a reply");
            reply_response(StatusCode::INTERNAL_SERVER_ERROR, Reply { ok: false })
        }
    }
}

async fn publish(State(state): State<Arc<IngressState>>, body: Bytes) -> StatusCode {
    let message = InboundMessage::new(body, None);
    if state.sender.send(message).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

async fn health_check(
    State(state): State<Arc<IngressState>>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let store_status = match state.store.ping().await {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        store: store_status,
    }))
}

async fn get_metrics(State(state): State<Arc<IngressState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
