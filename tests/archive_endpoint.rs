//! End-to-end tests for the HTTP surface.
//!
//! Routing cases go through the router in-process with a counting archiver.
//! Streaming cases start a real listener and run the real `zip` program; they
//! are skipped when `zip` is not installed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use tokio::sync::watch;
use tower::ServiceExt;
use zipstream::{AppState, ArchiveError, ArchiveIndex, ArchiveSource, Archiver, Config, build_router};

/// Serves a fixed payload and counts how often it was started
#[derive(Default)]
struct CountingArchiver {
    starts: AtomicUsize,
}

struct FixedSource(Option<Bytes>);

#[async_trait]
impl ArchiveSource for FixedSource {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, ArchiveError> {
        Ok(self.0.take())
    }

    async fn terminate(&mut self) -> Result<(), ArchiveError> {
        self.0 = None;
        Ok(())
    }
}

impl Archiver for CountingArchiver {
    fn start(&self, _dir: &Path) -> Result<Box<dyn ArchiveSource>, ArchiveError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixedSource(Some(Bytes::from_static(b"PK-fake")))))
    }
}

fn photo_root() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    let album = root.path().join("abc123");
    std::fs::create_dir(&album).unwrap();
    std::fs::write(album.join("a.jpg"), [0xAA; 10]).unwrap();
    std::fs::write(album.join("b.jpg"), [0xBB; 20]).unwrap();
    root
}

fn counting_state(config: Config) -> (AppState, Arc<CountingArchiver>) {
    let archiver = Arc::new(CountingArchiver::default());
    let (_tx, shutdown) = watch::channel(false);
    let state = AppState::with_archiver(config, archiver.clone(), shutdown);
    (state, archiver)
}

async fn get(state: AppState, uri: &str) -> (StatusCode, header::HeaderMap, Bytes) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = build_router(state).oneshot(req).await.unwrap();
    let (parts, body) = resp.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    (parts.status, parts.headers, body)
}

#[tokio::test]
async fn missing_archive_is_404_without_spawning() {
    let root = photo_root();
    let (state, archiver) = counting_state(Config::with_root(root.path()));

    let (status, _, body) = get(state, "/archive/doesnotexist/").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8_lossy(&body).contains("doesn't exist"));
    assert_eq!(archiver.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn traversal_identifiers_are_404_without_spawning() {
    let root = photo_root();

    for uri in [
        "/archive/..%2F..%2Fetc/",
        "/archive/..%2F/",
        "/archive/abc%20123/",
        "/archive/.../",
        "/archive/%FF/",
    ] {
        let (state, archiver) = counting_state(Config::with_root(root.path()));
        let (status, _, _) = get(state, uri).await;

        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(archiver.starts.load(Ordering::SeqCst), 0, "{uri}");
    }
}

#[tokio::test]
async fn existing_archive_streams_with_zip_headers() {
    let root = photo_root();
    let (state, archiver) = counting_state(Config::with_root(root.path()));

    let (status, headers, body) = get(state, "/archive/abc123/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"archive.zip\""
    );
    assert_eq!(body, "PK-fake");
    assert_eq!(archiver.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn index_page_is_served_as_html() {
    let root = photo_root();
    let index = root.path().join("index.html");
    std::fs::write(&index, "<h1>Photos</h1>").unwrap();
    let config = Config {
        index,
        ..Config::with_root(root.path())
    };
    let (state, _) = counting_state(config);

    let (status, headers, body) = get(state, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    assert_eq!(body, "<h1>Photos</h1>");
}

#[tokio::test]
async fn missing_index_page_is_a_server_error() {
    let root = photo_root();
    let config = Config {
        index: root.path().join("missing.html"),
        ..Config::with_root(root.path())
    };
    let (state, _) = counting_state(config);

    let (status, _, _) = get(state, "/").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

fn zip_available() -> bool {
    std::process::Command::new("zip")
        .arg("-v")
        .stdout(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Run the real server on an ephemeral port; returns its base URL
async fn spawn_server(root: PathBuf) -> (String, watch::Sender<bool>) {
    spawn_server_with(Config {
        chunk_size: 8,
        ..Config::with_root(root)
    })
    .await
}

async fn spawn_server_with(config: Config) -> (String, watch::Sender<bool>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router = build_router(AppState::new(config, shutdown_rx));

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), shutdown_tx)
}

fn file_sizes(archive: &[u8]) -> Vec<(String, usize)> {
    let index = ArchiveIndex::parse(archive).unwrap();
    let mut files: Vec<_> = index
        .entries()
        .iter()
        .map(|entry| (entry.file_name.clone(), index.read(entry).unwrap().len()))
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn real_zip_archive_contains_exactly_the_directory_files() {
    if !zip_available() {
        eprintln!("zip not installed, skipping");
        return;
    }

    let root = photo_root();
    let (base, _shutdown) = spawn_server(root.path().to_path_buf()).await;

    let resp = reqwest::get(format!("{base}/archive/abc123/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/zip");
    assert!(resp.headers().get("content-length").is_none());

    let body = resp.bytes().await.unwrap();
    assert_eq!(
        file_sizes(&body),
        [("a.jpg".to_string(), 10), ("b.jpg".to_string(), 20)]
    );
}

#[tokio::test]
async fn real_zip_archive_is_flattened() {
    if !zip_available() {
        eprintln!("zip not installed, skipping");
        return;
    }

    let root = photo_root();
    let nested = root.path().join("abc123").join("2024").join("summer");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(nested.join("c.jpg"), [0xCC; 5]).unwrap();
    let (base, _shutdown) = spawn_server(root.path().to_path_buf()).await;

    let body = reqwest::get(format!("{base}/archive/abc123/"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    let index = ArchiveIndex::parse(&body).unwrap();
    assert!(index.entries().iter().all(|entry| !entry.is_directory()));

    let files = file_sizes(&body);
    assert_eq!(
        files,
        [
            ("a.jpg".to_string(), 10),
            ("b.jpg".to_string(), 20),
            ("c.jpg".to_string(), 5)
        ]
    );
    assert!(files.iter().all(|(name, _)| !name.contains('/')));
}

#[tokio::test]
async fn real_zip_empty_directory_is_an_empty_download() {
    if !zip_available() {
        eprintln!("zip not installed, skipping");
        return;
    }

    let root = photo_root();
    std::fs::create_dir(root.path().join("empty")).unwrap();
    let (base, _shutdown) = spawn_server(root.path().to_path_buf()).await;

    let resp = reqwest::get(format!("{base}/archive/empty/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert!(resp.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn real_server_missing_archive_is_404() {
    let root = photo_root();
    let (base, _shutdown) = spawn_server(root.path().to_path_buf()).await;

    let resp = reqwest::get(format!("{base}/archive/doesnotexist/")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    assert!(resp.text().await.unwrap().contains("doesn't exist"));
}

fn pgrep_available() -> bool {
    std::process::Command::new("pgrep")
        .arg("-V")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Whether any process has `pattern` on its command line
fn process_running(pattern: &str) -> bool {
    std::process::Command::new("pgrep")
        .args(["-f", pattern])
        .stdout(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Incompressible bytes, so zip cannot shrink the album below the pipe buffer
fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x9e37_79b9_7f4a_7c15_u64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

#[tokio::test]
async fn client_disconnect_stops_the_zip_process() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    if !zip_available() || !pgrep_available() {
        eprintln!("zip or pgrep not installed, skipping");
        return;
    }

    let root = tempfile::tempdir().unwrap();
    let album = root.path().join("big");
    std::fs::create_dir(&album).unwrap();
    std::fs::write(album.join("noise.bin"), noise(4 * 1024 * 1024)).unwrap();
    let album = album.to_string_lossy().into_owned();

    let (base, _shutdown) = spawn_server_with(Config {
        chunk_size: 1024,
        delay: Some(Duration::from_millis(50)),
        ..Config::with_root(root.path())
    })
    .await;
    let addr = base.trim_start_matches("http://");

    let mut socket = tokio::net::TcpStream::connect(addr).await.unwrap();
    socket
        .write_all(b"GET /archive/big/ HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    // wait for the head and the first body bytes
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed the connection early");
            received.extend_from_slice(&buf[..n]);
            if let Some(head) = received.windows(4).position(|w| w == b"\r\n\r\n")
                && received.len() > head + 4
            {
                break;
            }
        }
    })
    .await
    .expect("no body bytes arrived");
    assert!(received.starts_with(b"HTTP/1.1 200 OK"));
    assert!(process_running(&album), "zip is not running mid-download");

    drop(socket);

    let mut gone = false;
    for _ in 0..100 {
        if !process_running(&album) {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(gone, "zip still running after the client went away");
}
