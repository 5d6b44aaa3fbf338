//! HTTP surface. axum accepts connections; every request is handed to
//! [routes::route_request] on the blocking pool, since boss mutations take
//! std locks and may back off under contention.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::{error, info};

use crate::engine::BossEngine;

pub mod api;
pub mod routes;

/// Header set by the upstream auth layer.
pub const CALLER_HEADER: &str = "x-user-id";

pub fn run_server(engine: Arc<BossEngine>, bind_addr: &str) -> std::io::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        info!(bind_addr, "bossraid server listening");
        axum::serve(listener, build_router(engine)).await
    })
}

pub fn build_router(engine: Arc<BossEngine>) -> Router {
    Router::new().fallback(dispatch).with_state(engine)
}

pub fn caller_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}

async fn dispatch(
    State(engine): State<Arc<BossEngine>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
    let caller = caller_id(&headers);
    let method = method.as_str().to_string();

    let routed = tokio::task::spawn_blocking(move || {
        routes::route_request(&engine, &method, &path, &body, caller)
    })
    .await;

    match routed {
        Ok(response) => (
            StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(header::CONTENT_TYPE, response.content_type)],
            response.body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "request handler panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}
