//! Request and response bodies through content streams over real connections.

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, routing::post, Router};
use polyserve::binding::BindingCoordinator;
use polyserve::http::{body_from_stream, source_from_body};
use polyserve::lifecycle::{self, Shutdown};
use polyserve::services::PlainHttp;

mod common;

async fn serve(app: Router, max_buffered_frames: usize) -> (lifecycle::RunningServer, String) {
    let mut config = common::loopback_config();
    config.stream.max_buffered_frames = max_buffered_frames;
    let coordinator = BindingCoordinator::new().with(PlainHttp::new(app));
    let server = lifecycle::start(Arc::new(config), &coordinator, Shutdown::new())
        .await
        .unwrap();
    let url = server.service("http").unwrap().binding().unwrap().url().unwrap();
    (server, url.to_string())
}

#[tokio::test]
async fn large_body_survives_a_tiny_queue() {
    let (server, base) = serve(common::echo_app(), 1).await;
    let payload: Vec<u8> = (0..(2 * 1024 * 1024)).map(|i| (i % 251) as u8).collect();

    let response = reqwest::Client::new()
        .post(format!("{base}upload"))
        .body(payload.clone())
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let echoed = response.bytes().await.unwrap();
    assert_eq!(echoed.len(), payload.len());
    assert!(echoed == payload);

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn handlers_can_restream_bodies() {
    // A handler that pipes the request through one more stream of its own.
    let app = Router::new().route(
        "/pipe",
        post(|body: Body| async move { body_from_stream(source_from_body(body, 2)) }),
    );
    let (server, base) = serve(app, 4).await;

    let response = reqwest::Client::new()
        .post(format!("{base}pipe"))
        .body("through two streams")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "through two streams");

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn in_flight_request_drains_before_shutdown_completes() {
    let app = Router::new().route(
        "/slow",
        post(|| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            "done"
        }),
    );
    let (server, base) = serve(app, 4).await;

    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("{base}slow"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(server.shutdown(Duration::from_secs(2)).await);
    assert_eq!(request.await.unwrap(), "done");
}
