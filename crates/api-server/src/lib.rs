//! HTTP serving layer: streams torrent files with range support.

mod error;

pub use error::ApiError;

use application::ClientSession;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use domain::{StreamRange, TorrentFile, TorrentStats};
use serde::Serialize;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

#[derive(Clone)]
pub struct AppState {
    session: Arc<ClientSession>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    stats: TorrentStats,
    percentage: f64,
    ready: bool,
    stream_path: Option<String>,
    version: String,
}

pub fn router(session: Arc<ClientSession>) -> Router {
    Router::new()
        .route("/", get(stream_largest_file))
        .route("/api/status", get(get_status))
        .route("/:name", get(stream_named_file))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState { session })
}

/// Serves the router on `listener` until the future is dropped.
pub async fn serve(listener: TcpListener, session: Arc<ClientSession>) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!("🌐 Streaming server listening on http://{}", addr);
    axum::serve(listener, router(session)).await
}

async fn stream_largest_file(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let file = state.session.client().largest_file()?;
    stream_file(&state.session, file, &headers).await
}

async fn stream_named_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let file = state.session.client().find_file(&name)?;
    stream_file(&state.session, file, &headers).await
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let client = state.session.client();
    let stats = client.stats();
    Json(StatusResponse {
        percentage: stats.percentage(),
        stats,
        ready: client.ready_for_playback(),
        stream_path: state.session.stream_path().ok(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn stream_file(
    session: &ClientSession,
    file: TorrentFile,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let range = match headers.get(header::RANGE).and_then(|h| h.to_str().ok()) {
        Some(value) => StreamRange::parse(value, file.length)?,
        None => None,
    };

    let metadata = session.client().metadata()?;
    let mut reader = session.client().open_file(&file).await?;

    let (status, start, length) = match &range {
        Some(range) => (StatusCode::PARTIAL_CONTENT, range.start, range.length()),
        None => (StatusCode::OK, 0, file.length),
    };
    if start > 0 {
        reader.seek(SeekFrom::Start(start)).await?;
    }

    debug!(
        file = %file.path,
        start,
        length,
        partial = range.is_some(),
        "streaming file"
    );

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, file.mime_type())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&metadata.name),
        );
    if let Some(range) = &range {
        builder = builder.header(header::CONTENT_RANGE, range.content_range_header());
    }

    // The body owns the reader; it is closed when the stream ends or is dropped.
    let body = Body::from_stream(reader.into_stream(length));
    builder
        .body(body)
        .map_err(|e| ApiError(domain::DomainError::IoError(e.to_string())))
}

fn content_disposition(name: &str) -> String {
    let name: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    format!("attachment; filename=\"{name}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_strips_quotes_and_controls() {
        assert_eq!(
            content_disposition("My \"Movie\"\n"),
            "attachment; filename=\"My Movie\""
        );
    }
}
