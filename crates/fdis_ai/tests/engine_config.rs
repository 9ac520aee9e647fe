use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use fdis_ai::config::{CacheBackend, EngineConfig};
use fdis_ai::index::FlatIndex;
use fdis_ai::QueryEngine;
use fdis_core::domain::ChunkRecord;

/// Answer every connection with `status_line` until the test process exits.
fn fake_ollama(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf);
            let body = r#"{"models":[]}"#;
            let _ = write!(
                stream,
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
        }
    });
    format!("http://127.0.0.1:{port}")
}

fn config_for(base_url: String, dir: &std::path::Path) -> EngineConfig {
    let index = FlatIndex::from_parts(
        "all-minilm",
        vec![ChunkRecord::new("a", "Barclays", 2024, "annual_report", "Credit risk rose.")],
        vec![vec![1.0, 0.0]],
    )
    .expect("index");
    index.save(&dir.join("index")).expect("save");

    let mut config = EngineConfig::default();
    config.ollama.base_url = base_url;
    config.retrieval.index_dir = dir.join("index");
    config.cache.backend = CacheBackend::None;
    config
}

#[test]
fn engine_from_config_reports_healthy_server() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = QueryEngine::from_config(&config_for(fake_ollama("200 OK"), dir.path())).expect("engine");
    engine.health_check().expect("healthy");
}

#[test]
fn engine_from_config_reports_unhealthy_server() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = QueryEngine::from_config(&config_for(fake_ollama("500 Internal Server Error"), dir.path()))
        .expect("engine");
    let err = engine.health_check().expect_err("unhealthy");
    assert_eq!(err.code, "AI_OLLAMA_UNHEALTHY");
}

#[test]
fn engine_from_config_rejects_remote_ollama() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = QueryEngine::from_config(&config_for("http://10.0.0.5:11434".to_string(), dir.path()))
        .err()
        .expect("remote rejected");
    assert_eq!(err.code, "AI_REMOTE_NOT_ALLOWED");
}

#[test]
fn engine_from_config_fails_on_missing_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config_for(fake_ollama("200 OK"), dir.path());
    config.retrieval.index_dir = dir.path().join("absent");
    let err = QueryEngine::from_config(&config).err().expect("missing index");
    assert_eq!(err.code, "INDEX_LOAD_FAILED");
}
