//! End-to-end binding tests: real sockets, real TLS, real requests.

use std::sync::Arc;
use std::time::Duration;

use polyserve::binding::{BindingCoordinator, BindingError, BindingScope};
use polyserve::lifecycle::{self, Shutdown};
use polyserve::net::transport::TransportRegistry;
use polyserve::net::BoundAddress;
use polyserve::services::{self, DiscardDatagrams, Http3, PlainHttp, SecureHttp};

mod common;

fn port_of(server: &lifecycle::RunningServer, label: &str) -> u16 {
    server
        .service(label)
        .and_then(|s| s.binding())
        .and_then(|b| b.address.inet())
        .map(|addr| addr.port())
        .unwrap()
}

#[tokio::test]
async fn plain_binds_while_secure_fails_without_certificate() {
    let mut config = common::loopback_config();
    config.tls = Some(polyserve::config::TlsConfig {
        cert_path: Some("/nonexistent/polyserve/cert.pem".into()),
        key_path: Some("/nonexistent/polyserve/key.pem".into()),
    });
    let coordinator = BindingCoordinator::new()
        .with(PlainHttp::new(common::echo_app()))
        .with(SecureHttp::new(common::echo_app()));

    let server = lifecycle::start(Arc::new(config), &coordinator, Shutdown::new())
        .await
        .unwrap();

    let services = server.services();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0].label, "http");
    assert!(services[0].is_bound());
    assert_eq!(services[1].label, "https");
    assert!(matches!(services[1].error(), Some(BindingError::Tls(_))));
    assert!(server.is_serving());
    assert!(server.scope().channel("http").is_some());
    assert!(server.scope().channel("https").is_none());

    let url = services[0].binding().unwrap().url().unwrap();
    let response = reqwest::Client::new()
        .post(url.join("echo").unwrap())
        .body("ping over a content stream")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "ping over a content stream");

    assert!(server.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn secure_service_advertises_http3_on_same_host() {
    let dir = common::temp_dir("alt-svc");
    let mut config = common::loopback_config();
    config.http.enabled = false;
    config.http3.enabled = true;
    config.http3.max_age_secs = 600;
    config.tls = Some(common::self_signed_tls(&dir));

    let datagrams = Arc::new(DiscardDatagrams::default());
    let coordinator = services::standard(common::echo_app(), datagrams.clone());
    let server = lifecycle::start(Arc::new(config), &coordinator, Shutdown::new())
        .await
        .unwrap();

    assert_eq!(server.services().len(), 2);
    let https_port = port_of(&server, "https");
    let h3_port = port_of(&server, "http3");

    let response = common::insecure_client()
        .get(format!("https://localhost:{https_port}/"))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["alt-svc"],
        format!("h3=\":{h3_port}\"; ma=600").as_str()
    );

    // The datagram loop is live behind the advertisement.
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket
        .send_to(b"initial", ("127.0.0.1", h3_port))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while datagrams.received() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    server.shutdown(Duration::from_secs(1)).await;
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn advertisement_can_be_disabled() {
    let dir = common::temp_dir("no-alt-svc");
    let mut config = common::loopback_config();
    config.http.enabled = false;
    config.http3.enabled = true;
    config.http3.advertise = false;
    config.tls = Some(common::self_signed_tls(&dir));

    let coordinator = BindingCoordinator::new()
        .with(SecureHttp::new(common::echo_app()))
        .with(Http3::default());
    let server = lifecycle::start(Arc::new(config), &coordinator, Shutdown::new())
        .await
        .unwrap();
    let https_port = port_of(&server, "https");

    let response = common::insecure_client()
        .get(format!("https://localhost:{https_port}/"))
        .send()
        .await
        .unwrap();
    assert!(response.headers().get("alt-svc").is_none());
    assert!(server.scope().alt_service("http3").is_none());

    server.shutdown(Duration::from_secs(1)).await;
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn secured_services_are_skipped_without_tls_material() {
    let mut config = common::loopback_config();
    config.http3.enabled = true;
    let coordinator = services::standard(common::echo_app(), Arc::new(DiscardDatagrams::default()));

    let server = lifecycle::start(Arc::new(config), &coordinator, Shutdown::new())
        .await
        .unwrap();
    let labels: Vec<_> = server.services().iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, ["http"]);

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn duplicate_labels_abort_the_bind_call() {
    let coordinator = BindingCoordinator::new()
        .with(PlainHttp::new(common::echo_app()))
        .with(PlainHttp::new(common::echo_app()));

    let err = lifecycle::start(
        Arc::new(common::loopback_config()),
        &coordinator,
        Shutdown::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        BindingError::DuplicateRegistration { registry: "transport", ref key } if key == "http"
    ));
}

#[tokio::test]
async fn aborted_bind_stops_listeners_already_issued() {
    let scope = Arc::new(BindingScope::new(
        Arc::new(common::loopback_config()),
        Arc::new(TransportRegistry::platform()),
        Shutdown::new(),
    ));
    let coordinator = BindingCoordinator::new()
        .with(PlainHttp::new(common::echo_app()))
        .with(PlainHttp::new(common::echo_app()));

    assert!(matches!(
        coordinator.bind(&scope),
        Err(BindingError::DuplicateRegistration { .. })
    ));
    assert!(scope.shutdown().is_triggered());

    // The first contributor's bind was issued before the conflict.
    let (channel, binding) = scope.pending("http").unwrap().await.unwrap();
    let port = binding.address.inet().unwrap().port();
    drop(channel);
    drop(scope);

    let refused = tokio::time::timeout(Duration::from_secs(2), async {
        while tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(refused.is_ok(), "listener on port {port} still accepting");
}

#[tokio::test]
async fn unresolvable_host_becomes_a_failed_entry() {
    let mut config = common::loopback_config();
    config.server.host = "polyserve.invalid".into();
    let coordinator = BindingCoordinator::new().with(PlainHttp::new(common::echo_app()));

    let server = lifecycle::start(Arc::new(config), &coordinator, Shutdown::new())
        .await
        .unwrap();
    assert!(matches!(
        server.service("http").unwrap().error(),
        Some(BindingError::InvalidAddress { .. })
    ));
    assert!(!server.is_serving());
    assert_eq!(server.scope().transport("http").unwrap().name(), "tcp");
    assert!(server.scope().channel("http").is_none());
}

#[tokio::test]
async fn missing_transport_becomes_a_failed_entry() {
    let scope = Arc::new(BindingScope::new(
        Arc::new(common::loopback_config()),
        Arc::new(TransportRegistry::new(Vec::new())),
        Shutdown::new(),
    ));
    let coordinator = BindingCoordinator::new().with(PlainHttp::new(common::echo_app()));

    let services = coordinator.bind(&scope).unwrap().await;
    assert_eq!(services.len(), 1);
    assert!(matches!(
        services[0].error(),
        Some(BindingError::NoCompatibleTransport { .. })
    ));
    assert!(scope.transport("http").is_none());
}

#[tokio::test]
async fn scope_exposes_groups_and_transports() {
    let mut config = common::loopback_config();
    config.server.max_connections = 7;
    // A datagram override cannot serve a stream socket; tcp is used instead.
    config.server.transport = polyserve::config::TransportPreference::Udp;
    let coordinator = BindingCoordinator::new().with(PlainHttp::new(common::echo_app()));

    let server = lifecycle::start(Arc::new(config), &coordinator, Shutdown::new())
        .await
        .unwrap();
    let scope = server.scope();

    assert_eq!(scope.transport("http").unwrap().name(), "tcp");
    assert_eq!(scope.group("http:child").unwrap().max_permits(), Some(7));
    assert_eq!(scope.group("http:parent").unwrap().max_permits(), None);
    assert!(scope.group("http").is_none());
    assert!(scope.pending("http").is_some());

    server.shutdown(Duration::from_secs(1)).await;
}

#[cfg(unix)]
#[tokio::test]
async fn plain_service_binds_domain_socket() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let dir = common::temp_dir("unix");
    let socket_path = dir.join("http.sock");
    let mut config = common::loopback_config();
    config.http.socket_path = Some(socket_path.clone());
    let coordinator = BindingCoordinator::new().with(PlainHttp::new(common::echo_app()));

    let server = lifecycle::start(Arc::new(config), &coordinator, Shutdown::new())
        .await
        .unwrap();
    let binding = server.service("http").unwrap().binding().unwrap().clone();
    assert_eq!(binding.address, BoundAddress::Unix(socket_path.clone()));
    assert_eq!(binding.url().unwrap().scheme(), "http+unix");

    let mut stream = tokio::net::UnixStream::connect(&socket_path).await.unwrap();
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4\r\nConnection: close\r\n\r\nunix")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("unix"));

    server.shutdown(Duration::from_secs(1)).await;
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let coordinator = BindingCoordinator::new().with(PlainHttp::new(common::echo_app()));
    let server = lifecycle::start(
        Arc::new(common::loopback_config()),
        &coordinator,
        Shutdown::new(),
    )
    .await
    .unwrap();
    let port = port_of(&server, "http");
    let scope = Arc::clone(server.scope());

    assert!(server.shutdown(Duration::from_secs(1)).await);
    assert_eq!(scope.connections().active_count(), 0);

    // The accept loop has exited; the listener goes away with the scope.
    drop(scope);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let result = tokio::time::timeout(
        Duration::from_millis(500),
        reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}/"))
            .send(),
    )
    .await;
    assert!(!matches!(result, Ok(Ok(response)) if response.status().is_success()));
}
