// Shared bootstrap for integration tests: one race server per test binary.
#![allow(dead_code)]

use serde_json::Value;
use std::{
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

// Base URL of the shared race server, set once it has bound its port.
static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

/// Starts the race server on first use and returns its base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // The server gets its own OS thread so it outlives each `#[tokio::test]` runtime.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{addr}"));
                led_race::run(listener).await.expect("server failed");
            });
        });
        wait_until_accepting(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn wait_until_accepting(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server did not become ready in time");
}

pub async fn get_json(client: &reqwest::Client, url: String) -> Value {
    let res = client.get(url).send().await.expect("request should succeed");
    assert!(res.status().is_success(), "unexpected status {}", res.status());
    res.json().await.expect("json body")
}

pub async fn send_command(client: &reqwest::Client, base_url: &str, command: Value) {
    let res = client
        .post(format!("{base_url}/api/command"))
        .json(&command)
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);
}

/// Polls `/api/race` until the phase matches or the deadline passes.
pub async fn wait_for_phase(
    client: &reqwest::Client,
    base_url: &str,
    phase: &str,
    within: Duration,
) -> Value {
    let deadline = Instant::now() + within;
    loop {
        let race = get_json(client, format!("{base_url}/api/race")).await;
        if race["phase"] == phase {
            return race;
        }
        assert!(
            Instant::now() < deadline,
            "race never reached {phase}; last phase {}",
            race["phase"]
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
