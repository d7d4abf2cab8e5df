use api_server::router;
use application::ClientSession;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use config::ClientConfig;
use domain::{EngineConfig, Torrent};
use infrastructure::{HttpFetcher, MemoryEngine, MemoryTorrent};
use std::sync::Arc;
use tower::ServiceExt;

const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn session() -> (Arc<ClientSession>, MemoryTorrent) {
    let config = ClientConfig {
        torrent: format!("magnet:?xt=urn:btih:{HASH}"),
        http_port: 0,
        engine: EngineConfig {
            listen_port: 0,
            ..EngineConfig::default()
        },
        player: None,
    };
    let engine = MemoryEngine::start(config.engine.clone()).await.unwrap();
    let session = ClientSession::with_engine(config, engine.clone(), Arc::new(HttpFetcher::default()))
        .await
        .unwrap();
    let torrent = engine.torrent(HASH).unwrap();
    (session, torrent)
}

/// A resolved torrent with one 1000-byte file in two pieces, fully downloaded.
async fn downloaded_session() -> (Arc<ClientSession>, Vec<u8>) {
    let (session, torrent) = session().await;
    let data = content(1000);
    torrent
        .resolve(
            Torrent::new(
                HASH.into(),
                "Big Buck Bunny".into(),
                512,
                vec![
                    ("Big Buck Bunny/notes.txt".into(), 0),
                    ("Big Buck Bunny/movie.mp4".into(), 1000),
                ],
            )
            .unwrap(),
        )
        .unwrap();
    torrent.store_piece(0, data[..512].to_vec()).unwrap();
    torrent.store_piece(1, data[512..].to_vec()).unwrap();
    (session, data)
}

async fn get(session: &Arc<ClientSession>, uri: &str, range: Option<&str>) -> Response {
    let mut request = Request::builder().uri(uri);
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }
    router(session.clone())
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn serves_largest_file_in_full() {
    let (session, data) = downloaded_session().await;
    let response = get(&session, "/", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(headers[header::CONTENT_LENGTH], "1000");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Big Buck Bunny\""
    );
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn range_request_gets_partial_content() {
    let (session, data) = downloaded_session().await;
    let response = get(&session, "/", Some("bytes=500-999")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 500-999/1000");
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "500");
    assert_eq!(body_bytes(response).await, data[500..].to_vec());
}

#[tokio::test]
async fn suffix_and_open_ended_ranges() {
    let (session, data) = downloaded_session().await;

    let response = get(&session, "/", Some("bytes=-10")).await;
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 990-999/1000");
    assert_eq!(body_bytes(response).await, data[990..].to_vec());

    let response = get(&session, "/", Some("bytes=510-")).await;
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 510-999/1000");
    assert_eq!(body_bytes(response).await, data[510..].to_vec());
}

#[tokio::test]
async fn unsatisfiable_range_is_416() {
    let (session, _) = downloaded_session().await;
    let response = get(&session, "/", Some("bytes=1000-")).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
}

#[tokio::test]
async fn multi_range_falls_back_to_full_body() {
    let (session, data) = downloaded_session().await;
    let response = get(&session, "/", Some("bytes=0-1,5-6")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, data);
}

#[tokio::test]
async fn serves_file_by_name() {
    let (session, data) = downloaded_session().await;

    let response = get(&session, "/movie.mp4", Some("bytes=0-9")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(body_bytes(response).await, data[..10].to_vec());

    let encoded = "/Big%20Buck%20Bunny%2Fmovie%2Emp4";
    let response = get(&session, encoded, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&session, &session.stream_path().unwrap(), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_file_is_404() {
    let (session, _) = downloaded_session().await;
    let response = get(&session, "/missing.mkv", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unresolved_metadata_is_503() {
    let (session, _) = session().await;
    let response = get(&session, "/", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn closed_session_is_503() {
    let (session, _) = downloaded_session().await;
    session.close().await;
    let response = get(&session, "/", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn status_reports_progress_and_readiness() {
    let (session, _) = downloaded_session().await;
    let response = get(&session, "/api/status", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let status: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(status["name"], "Big Buck Bunny");
    assert_eq!(status["total_length"], 1000);
    assert_eq!(status["bytes_completed"], 1000);
    assert_eq!(status["ready"], true);
    assert_eq!(status["stream_path"], "/Big%20Buck%20Bunny%2Fmovie.mp4");
}

#[tokio::test]
async fn dropping_a_response_releases_the_reader() {
    let (session, torrent) = session().await;
    torrent
        .resolve(Torrent::new(HASH.into(), "Clip".into(), 512, vec![("clip.mkv".into(), 1000)]).unwrap())
        .unwrap();

    // Nothing downloaded: the body would block, so drop it unread.
    let response = get(&session, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(torrent.open_readers(), 1);
    drop(response);
    assert_eq!(torrent.open_readers(), 0);
}
