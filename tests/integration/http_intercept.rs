//! End-to-end HTTP intercept tests over loopback

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_test::{assert_err, assert_ok};

use astats_server::metrics::{Registry, ReloadCounters};
use astats_server::snapshot::{ConfigHolder, LoadOutcome};
use astats_server::{Config, Server};

struct TestServer {
    server: Arc<Server>,
    addr: SocketAddr,
    _dir: tempfile::TempDir,
}

async fn start(stats_config: &str) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let stats_path = dir.path().join("astats.config");
    std::fs::write(&stats_path, stats_config).unwrap();

    let config = Config::from_toml(&format!(
        r#"
        [server]
        bind_addr = "127.0.0.1:0"

        [system]
        sys_class_net = "{net}"
        proc_dir = "{proc}"

        [pool]
        buffer_count = 4
        buffer_size = 4096
        "#,
        net = dir.path().join("net").display(),
        proc = dir.path().join("proc").display(),
    ))
    .unwrap();

    let registry = Arc::new(Registry::new());
    registry
        .counter("proxy.process.http.completed_requests")
        .fetch_add(7, Ordering::Relaxed);
    registry.counter("plugin.remap.hits").fetch_add(3, Ordering::Relaxed);

    let holder = ConfigHolder::open(
        &stats_path,
        Duration::from_millis(10),
        Arc::new(ReloadCounters::new()),
    )
    .unwrap();

    let server = Arc::new(Server::new(Arc::new(config), Arc::new(holder), registry).unwrap());
    let addr = server.local_addr().unwrap();

    let running = server.clone();
    tokio::spawn(async move { running.run().await });

    TestServer {
        server,
        addr,
        _dir: dir,
    }
}

async fn get(addr: SocketAddr, target: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8(response).unwrap()
}

fn split_response(response: &str) -> (&str, serde_json::Value) {
    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    (head, serde_json::from_str(body).unwrap())
}

fn rewrite(path: &Path, text: &str) {
    std::fs::write(path, text).unwrap();
    let later = std::time::SystemTime::now() + Duration::from_secs(60);
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

#[tokio::test]
async fn test_intercepts_configured_path() {
    let server = start("path=_astats\n").await;

    let response = get(server.addr, "/_astats").await;
    let (head, body) = split_response(&response);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Type: application/json"));
    assert!(head.contains("Cache-Control: no-cache"));

    assert_eq!(body["ats"]["proxy.process.http.completed_requests"], 7);
    assert_eq!(body["ats"]["plugin.remap.hits"], 3);
    assert_eq!(body["ats"]["server"], astats_server::VERSION);
    assert!(body["ats"].get("proxy.config.astats.path").is_none());
    assert_eq!(body["system"]["configReloads"], 1);

    server.server.shutdown().await;
}

#[tokio::test]
async fn test_query_filters_output() {
    let server = start("path=_astats\n").await;

    let response = get(server.addr, "/_astats?application=remap&record.types=20").await;
    let (_, body) = split_response(&response);

    let ats = body["ats"].as_object().unwrap();
    assert_eq!(ats.len(), 2);
    assert_eq!(ats["plugin.remap.hits"], 3);
    assert!(body.get("system").is_none());
}

#[tokio::test]
async fn test_other_paths_pass_through() {
    let server = start("path=_astats\n").await;

    let response = get(server.addr, "/index.html").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.contains("Content-Length: 0"));

    let response = get(server.addr, "/_astats/extra").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[tokio::test]
async fn test_denied_client_passes_through() {
    let server = start("path=_astats\nallow_ip=192.168.0.0/16\n").await;

    let response = get(server.addr, "/_astats").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[tokio::test]
async fn test_reload_switches_path() {
    let server = start("path=_astats\n").await;
    let stats_path = server.server.holder().path().to_path_buf();

    rewrite(&stats_path, "path=stats\n");
    let outcome = assert_ok!(server.server.reload().await);
    assert_eq!(outcome, LoadOutcome::Reloaded);

    let response = get(server.addr, "/_astats").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

    let response = get(server.addr, "/stats?record.types=123").await;
    let (_, body) = split_response(&response);
    assert_eq!(body["ats"]["proxy.config.astats.path"], "stats");
    assert_eq!(body["system"]["configReloads"], 2);
}

#[tokio::test]
async fn test_bad_reload_keeps_serving() {
    let server = start("path=_astats\n").await;
    let stats_path = server.server.holder().path().to_path_buf();

    rewrite(&stats_path, "path=_astats\nrecord_types=ZZ\n");
    assert_err!(server.server.reload().await);

    let response = get(server.addr, "/_astats").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
}
