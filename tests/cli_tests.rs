use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::thread::JoinHandle;
use tempfile::TempDir;

/// Command isolated to a temporary home, cache and runtime directory
fn isolated_cmd(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_CACHE_HOME", home.join(".cache"))
        .env("XDG_RUNTIME_DIR", home.join("run"));
    cmd
}

fn write_config(home: &Path, base_url: &str) {
    let dir = home.join(".config").join("scattershot");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        format!("[api]\nbase_url = \"{}\"\n", base_url),
    )
    .unwrap();
}

/// Serve `connections` requests with the same stream body, then stop.
/// Returns the base URL and a handle yielding every request body seen.
fn serve_stream(body: &'static str, connections: usize) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = std::thread::spawn(move || {
        let mut requests = Vec::new();
        for stream in listener.incoming().take(connections) {
            let mut stream = stream.unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();
            requests.push(String::from_utf8(request_body).unwrap());

            write!(
                stream,
                "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{}",
                body
            )
            .unwrap();
        }
        requests
    });

    (base_url, handle)
}

const STORM_STREAM: &str = concat!(
    "data: {\"type\":\"status\",\"session_id\":\"s-1\"}\n",
    "data: {\"type\":\"suggestion\",\"data\":{\"word\":\"thunder\"}}\n",
    ": keepalive\n",
    "data: {\"type\":\"suggestion\",\"data\":{\"word\":\"Sorry, I cannot do that\"}}\n",
    "data: {\"type\":\"suggestion\",\"data\":{\"word\":\"lightning\"}}\n",
    "data: {\"type\":\"complete\",\"total\":2}\n",
);

#[test]
fn test_cli_help_flag() {
    cargo_bin_cmd!()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Streaming keyword search"));
}

#[test]
fn test_cli_version_flag() {
    cargo_bin_cmd!()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scattershot"));
}

#[test]
fn test_cli_without_arguments_fails() {
    let home = TempDir::new().unwrap();
    isolated_cmd(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to do"));
}

#[test]
fn test_cli_rejects_unknown_mode() {
    let home = TempDir::new().unwrap();
    isolated_cmd(home.path())
        .args(["p1", "storms", "--mode", "xor"])
        .assert()
        .failure();
}

#[test]
fn test_cli_stats_on_empty_cache() {
    let home = TempDir::new().unwrap();
    isolated_cmd(home.path())
        .arg("--stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("memory"))
        .stdout(predicate::str::contains("session"))
        .stdout(predicate::str::contains("durable"));
}

#[test]
fn test_cli_invalid_config_warns_and_continues() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config").join("scattershot");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), "[api\nbase_url = 1").unwrap();

    isolated_cmd(home.path())
        .arg("--stats")
        .assert()
        .success()
        .stderr(predicate::str::contains("Invalid config"));
}

#[test]
fn test_cli_unreachable_backend_fails() {
    let home = TempDir::new().unwrap();
    // Bind then drop to get a port nothing listens on
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    write_config(home.path(), &format!("http://127.0.0.1:{}", port));

    isolated_cmd(home.path())
        .args(["p1", "storms"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Search failed"));
}

#[test]
fn test_cli_streams_then_serves_from_cache() {
    let home = TempDir::new().unwrap();
    let (base_url, server) = serve_stream(STORM_STREAM, 1);
    write_config(home.path(), &base_url);

    isolated_cmd(home.path())
        .args(["p1", "storms", "--mode", "and"])
        .assert()
        .success()
        .stdout("thunder\nlightning\n");

    let requests = server.join().unwrap();
    let request: serde_json::Value = serde_json::from_str(&requests[0]).unwrap();
    assert_eq!(request["query"], "storms");
    assert_eq!(request["project_id"], "p1");
    assert_eq!(request["search_mode"], "and");

    // The server is gone; the same search must come from the cache
    isolated_cmd(home.path())
        .args(["p1", "  storms ", "--mode", "and"])
        .assert()
        .success()
        .stdout("thunder\nlightning\n")
        .stderr(predicate::str::contains("cached"));
}

#[test]
fn test_cli_clear_project_forgets_searches() {
    let home = TempDir::new().unwrap();
    let (base_url, server) = serve_stream(STORM_STREAM, 1);
    write_config(home.path(), &base_url);

    isolated_cmd(home.path())
        .args(["p1", "storms"])
        .assert()
        .success();
    server.join().unwrap();

    isolated_cmd(home.path())
        .args(["--clear-project", "p1"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed 1 cached searches"));

    isolated_cmd(home.path())
        .arg("--stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("durable      0 entries"));
}

#[test]
fn test_cli_load_more_refused_below_threshold() {
    let home = TempDir::new().unwrap();
    let (base_url, server) = serve_stream(STORM_STREAM, 1);
    write_config(home.path(), &base_url);

    isolated_cmd(home.path())
        .args(["p1", "storms", "--load-more", "2"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No more results available"));

    assert_eq!(server.join().unwrap().len(), 1);
}

#[test]
fn test_cli_unconfigured_backend_fails_the_search() {
    let home = TempDir::new().unwrap();
    write_config(home.path(), "");

    isolated_cmd(home.path())
        .args(["p1", "storms"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Search failed"))
        .stderr(predicate::str::contains("api.base_url is empty"));
}

#[test]
fn test_cli_unconfigured_backend_still_serves_cache() {
    let home = TempDir::new().unwrap();
    let (base_url, server) = serve_stream(STORM_STREAM, 1);
    write_config(home.path(), &base_url);

    isolated_cmd(home.path())
        .args(["p1", "storms"])
        .assert()
        .success();
    server.join().unwrap();

    write_config(home.path(), "");
    isolated_cmd(home.path())
        .args(["p1", "storms"])
        .assert()
        .success()
        .stdout("thunder\nlightning\n")
        .stderr(predicate::str::contains("cached"));
}
