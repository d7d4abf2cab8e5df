use domain::DomainError;
use flate2::write::GzEncoder;
use flate2::Compression;
use infrastructure::{BlocklistLoader, BLOCKLIST_CACHE_NAME};
use std::io::Write;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serves `body` with a 200 once and returns the URL to request.
async fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}/biglist.p2p.gz")
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn downloaded_list_is_cached_once_it_decodes() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join(BLOCKLIST_CACHE_NAME);
    let url = serve_once(gzip("Bad Range:5.6.7.0-5.6.7.255\n")).await;

    let blocklist = BlocklistLoader::new(&url, cache.clone())
        .unwrap()
        .load()
        .await
        .unwrap();
    assert!(blocklist.contains("5.6.7.8".parse().unwrap()));

    // The second load is served from the cache; the server is gone.
    let again = BlocklistLoader::new(&url, cache).unwrap().load().await.unwrap();
    assert_eq!(again.num_ranges(), 1);
}

#[tokio::test]
async fn undecodable_download_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join(BLOCKLIST_CACHE_NAME);
    let url = serve_once(b"<html>captive portal</html>".to_vec()).await;

    let result = BlocklistLoader::new(&url, cache.clone())
        .unwrap()
        .load()
        .await;
    assert!(matches!(result, Err(DomainError::Blocklist(_))));
    assert!(!cache.exists());
    // No staging files are left behind either.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
