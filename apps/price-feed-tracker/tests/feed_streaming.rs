//! Feed Streaming Integration Tests
//!
//! Runs the streaming client and tracker against a local WebSocket server
//! and a mocked REST seed endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use price_feed_tracker::{
    AssetId, AssetTracker, ConnectionState, FeedConnector, HeartbeatConfig, PriceHistoryStore,
    ReconnectConfig, RestSeedSource, StreamingClient, StreamingClientConfig, Tick, TokioDelay,
    WebSocketConnector,
};

/// Serve one script per accepted connection. Every connection but the last
/// is closed after its script; the last stays open until the client leaves.
async fn spawn_feed_server(scripts: Vec<Vec<&'static str>>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let scripts = Arc::new(scripts);

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let scripts = Arc::clone(&scripts);
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                let script = scripts.get(index).cloned().unwrap_or_default();
                for text in script {
                    ws.send(Message::Text(text.into())).await.unwrap();
                }
                if index + 1 < scripts.len() {
                    let _ = ws.close(None).await;
                } else {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });
        }
    });

    (format!("ws://{addr}/prices?assets={{asset}}"), accepted)
}

fn btc() -> AssetId {
    AssetId::new("bitcoin").unwrap()
}

fn fast_config(url_template: String) -> StreamingClientConfig {
    StreamingClientConfig {
        reconnect: ReconnectConfig::fixed(Duration::from_millis(50)),
        heartbeat: HeartbeatConfig::disabled(),
        ..StreamingClientConfig::new(url_template)
    }
}

fn prices(store: &PriceHistoryStore, asset: &AssetId) -> Vec<f64> {
    store.snapshot(asset).iter().map(Tick::price).collect()
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn streams_drops_bad_messages_and_reconnects() {
    let (url, accepted) = spawn_feed_server(vec![
        vec![
            r#"{"bitcoin":"100"}"#,
            "not json",
            r#"{"ethereum":"3000"}"#,
            r#"{"bitcoin":"-1"}"#,
            r#"{"bitcoin":"110"}"#,
        ],
        vec![r#"{"bitcoin":"120"}"#],
    ])
    .await;

    let asset = btc();
    let store = Arc::new(PriceHistoryStore::new(100));
    let client = Arc::new(StreamingClient::new(
        asset.clone(),
        fast_config(url).for_asset(&asset),
        Arc::clone(&store),
        Arc::new(WebSocketConnector::new()),
        Arc::new(TokioDelay),
        CancellationToken::new(),
    ));

    let handle = tokio::spawn(Arc::clone(&client).run());
    eventually(|| store.len(&asset) == 3).await;

    assert_eq!(prices(&store, &asset), vec![100.0, 110.0, 120.0]);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    eventually(|| client.state() == ConnectionState::Streaming).await;

    let report = client.status().report();
    assert!(report.total_reconnects >= 1);
    assert_eq!(report.messages_dropped, 3);

    client.stop();
    handle.await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Idle);
    assert_eq!(store.len(&asset), 3);
}

#[tokio::test]
async fn bounded_history_evicts_oldest() {
    let (url, _accepted) = spawn_feed_server(vec![vec![
        r#"{"bitcoin":"10"}"#,
        r#"{"bitcoin":"20"}"#,
        r#"{"bitcoin":"30"}"#,
        r#"{"bitcoin":"40"}"#,
    ]])
    .await;

    let asset = btc();
    let store = Arc::new(PriceHistoryStore::new(3));
    let client = Arc::new(StreamingClient::new(
        asset.clone(),
        fast_config(url).for_asset(&asset),
        Arc::clone(&store),
        Arc::new(WebSocketConnector::new()),
        Arc::new(TokioDelay),
        CancellationToken::new(),
    ));

    let handle = tokio::spawn(Arc::clone(&client).run());
    eventually(|| store.current_price(&asset) == Some(40.0)).await;

    assert_eq!(prices(&store, &asset), vec![20.0, 30.0, 40.0]);

    client.stop();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn unreachable_feed_keeps_retrying() {
    // Bind and drop to get a port nothing listens on.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let asset = btc();
    let store = Arc::new(PriceHistoryStore::new(10));
    let client = Arc::new(StreamingClient::new(
        asset.clone(),
        fast_config(format!("ws://127.0.0.1:{port}/prices")),
        Arc::clone(&store),
        Arc::new(WebSocketConnector::new()),
        Arc::new(TokioDelay),
        CancellationToken::new(),
    ));

    let handle = tokio::spawn(Arc::clone(&client).run());
    eventually(|| client.status().report().total_reconnects >= 3).await;

    let report = client.status().report();
    assert!(report.last_error.is_some());
    assert!(store.is_empty(&asset));

    client.stop();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn tracker_seeds_before_streaming() {
    let seed_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/assets/bitcoin"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"priceUsd": "99.5"}})),
        )
        .expect(1)
        .mount(&seed_server)
        .await;

    let (url, _accepted) = spawn_feed_server(vec![vec![r#"{"bitcoin":"101"}"#]]).await;

    let store = Arc::new(PriceHistoryStore::new(100));
    let connector: Arc<dyn FeedConnector> = Arc::new(WebSocketConnector::new());
    let seed = RestSeedSource::new(seed_server.uri(), Duration::from_secs(2)).unwrap();
    let tracker = AssetTracker::new(
        Arc::clone(&store),
        connector,
        fast_config(url),
        CancellationToken::new(),
    )
    .with_seed_source(Arc::new(seed), Duration::from_secs(2));

    assert!(tracker.track(btc()).await);
    assert!(!tracker.track(btc()).await, "second track is a no-op");

    eventually(|| store.len(&btc()) == 2).await;
    assert_eq!(prices(&store, &btc()), vec![99.5, 101.0]);

    tracker.shutdown().await;
    assert_eq!(store.len(&btc()), 2);
}
