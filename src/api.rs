//! HTTP surface: three GET routes over one shared engine.
//!
//! Every failure on the read path collapses to a plain-text 404, keeping
//! the error taxonomy out of the wire contract.

use crate::engine::Engine;
use crate::error::Result;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

/// Build the application router.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/search/:search", get(search))
        .route("/all/:field/:value", get(get_all))
        .route("/:field/:value", get(get_one))
        .with_state(AppState { engine })
}

/// Bind the listener and serve requests until shutdown.
pub async fn serve(engine: Arc<Engine>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "api listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

async fn search(
    State(state): State<AppState>,
    Path(search): Path<String>,
) -> std::result::Result<impl IntoResponse, (StatusCode, String)> {
    match state.engine.search(&search).await {
        Ok(record) => Ok(json_body(record)),
        Err(e) => {
            warn!(search = %search, error = %e, "search failed");
            Err((StatusCode::NOT_FOUND, e.to_string()))
        }
    }
}

async fn get_one(
    State(state): State<AppState>,
    Path((field, value)): Path<(String, String)>,
) -> std::result::Result<impl IntoResponse, (StatusCode, String)> {
    match state.engine.get_one(&field, &value).await {
        Ok(record) => Ok(json_body(record)),
        Err(e) => {
            warn!(field = %field, value = %value, error = %e, "get failed");
            Err((StatusCode::NOT_FOUND, e.to_string()))
        }
    }
}

async fn get_all(
    State(state): State<AppState>,
    Path((field, value)): Path<(String, String)>,
) -> std::result::Result<impl IntoResponse, (StatusCode, String)> {
    match state.engine.get_many(&field, &value).await {
        Ok(records) => Ok(json_body(records)),
        Err(e) => {
            warn!(field = %field, value = %value, error = %e, "get all failed");
            Err((StatusCode::NOT_FOUND, e.to_string()))
        }
    }
}

fn json_body(bytes: Vec<u8>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], bytes)
}
