//! server
//!
//! Axum HTTP gateway in front of the branch mutation engine.
//!
//! # Routes
//!
//! | Route | Gated | Engine operation |
//! |---|---|---|
//! | `GET /health` | no | none |
//! | `POST /create-branch` | yes | [`Engine::create_branch`] |
//! | `POST /upsert-file` | yes | [`Engine::upsert_file`] |
//! | `POST /bulk-upsert` | yes | [`Engine::commit_files`] |
//!
//! Gated routes require the shared secret (see [`auth`]). Failures other
//! than authentication are answered with 400 and an [`payloads::ErrorBody`].
//! Each request runs inside a span carrying a fresh request id.

pub mod auth;
pub mod payloads;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::engine::{Engine, MutationError};
use auth::SharedSecret;
use payloads::{
    ApiError, BulkUpsertBody, BulkUpsertResponse, CreateBranchBody, CreateBranchResponse,
    HealthResponse, UpsertFileBody, UpsertFileResponse,
};

/// Shared server state injected into all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub engine: Engine,
    pub secret: Arc<SharedSecret>,
}

impl AppState {
    pub fn new(engine: Engine, secret: &str) -> Self {
        Self {
            engine,
            secret: Arc::new(SharedSecret::new(secret)),
        }
    }
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    let gated = Router::new()
        .route("/create-branch", post(create_branch))
        .route("/upsert-file", post(upsert_file))
        .route("/bulk-upsert", post(bulk_upsert))
        .route_layer(middleware::from_fn_with_state(
            state.secret.clone(),
            auth::require_secret,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "gateway listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn trace_request(request: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    );
    async move {
        let started = Instant::now();
        let response = next.run(request).await;
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Unwrap a JSON body, turning extractor rejections into validation errors.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError(MutationError::Validation(rejection.body_text())))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn create_branch(
    State(state): State<AppState>,
    payload: Result<Json<CreateBranchBody>, JsonRejection>,
) -> Result<Json<CreateBranchResponse>, ApiError> {
    let request = body(payload)?.into_request()?;
    let outcome = state.engine.create_branch(request).await?;
    Ok(Json(outcome.into()))
}

async fn upsert_file(
    State(state): State<AppState>,
    payload: Result<Json<UpsertFileBody>, JsonRejection>,
) -> Result<Json<UpsertFileResponse>, ApiError> {
    let request = body(payload)?.into_request()?;
    let outcome = state.engine.upsert_file(request).await?;
    Ok(Json(outcome.into()))
}

async fn bulk_upsert(
    State(state): State<AppState>,
    payload: Result<Json<BulkUpsertBody>, JsonRejection>,
) -> Result<Json<BulkUpsertResponse>, ApiError> {
    let request = body(payload)?.into_request()?;
    let outcome = state.engine.commit_files(request).await?;
    Ok(Json(outcome.into()))
}
