//! HTTP serving over bound stream channels.
//!
//! # Responsibilities
//! - Drive HTTP/1.1 and HTTP/2 connections via hyper-util's auto builder
//! - Terminate TLS for the secured service
//! - Wire up middleware (request ID, tracing, content streams, alt-svc)
//! - Drain connections gracefully on shutdown

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    Extension, Router,
};
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures_util::future::{BoxFuture, FutureExt};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::binding::contributor::StreamHandler;
use crate::binding::scope::BindingScope;
use crate::http::body::{body_from_stream, source_from_body};
use crate::lifecycle::Shutdown;
use crate::net::channel::{Connection, Peer};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Serves an application router on accepted connections.
#[derive(Clone)]
pub struct HttpHandler {
    service: &'static str,
    router: Router,
    tls: Option<RustlsAcceptor>,
}

impl HttpHandler {
    pub fn plain(service: &'static str, app: Router, max_buffered_frames: usize) -> Self {
        Self {
            service,
            router: build_router(app, max_buffered_frames),
            tls: None,
        }
    }

    /// TLS-terminating handler whose responses advertise the alternates
    /// `service` sponsors in `scope`.
    pub fn secure(
        service: &'static str,
        app: Router,
        max_buffered_frames: usize,
        tls: RustlsConfig,
        scope: Arc<BindingScope>,
    ) -> Self {
        let alt_svc = SetResponseHeaderLayer::if_not_present(
            header::ALT_SVC,
            move |_: &Response<Body>| scope.alt_svc_header(service),
        );
        Self {
            service,
            router: build_router(app, max_buffered_frames).layer(alt_svc),
            tls: Some(RustlsAcceptor::new(tls)),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }
}

/// Build the router with all middleware layers.
fn build_router(app: Router, max_buffered_frames: usize) -> Router {
    app.layer(middleware::from_fn_with_state(
        max_buffered_frames,
        stream_bodies,
    ))
    .layer(TraceLayer::new_for_http())
    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}

/// Pair the request and the response with their own content stream each.
async fn stream_bodies(
    State(max_buffered_frames): State<usize>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let request = Request::from_parts(
        parts,
        body_from_stream(source_from_body(body, max_buffered_frames)),
    );

    let response = next.run(request).await;
    let (mut parts, body) = response.into_parts();
    // The bridged body has no size hint; keep a known length on the wire.
    if let Some(length) = body.size_hint().exact() {
        if carries_body(parts.status) {
            parts
                .headers
                .entry(header::CONTENT_LENGTH)
                .or_insert_with(|| HeaderValue::from(length));
        }
    }
    Response::from_parts(
        parts,
        body_from_stream(source_from_body(body, max_buffered_frames)),
    )
}

fn carries_body(status: StatusCode) -> bool {
    !status.is_informational()
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
}

impl StreamHandler for HttpHandler {
    fn serve(&self, connection: Connection, peer: Peer, shutdown: Shutdown) -> BoxFuture<'static, ()> {
        let service = self.service;
        let router = self.router.clone().layer(Extension(peer));
        let tls = self.tls.clone();
        async move {
            match tls {
                None => serve_connection(service, connection, router, shutdown).await,
                Some(acceptor) => match acceptor.accept(connection, router).await {
                    Ok((stream, router)) => serve_connection(service, stream, router, shutdown).await,
                    Err(e) => {
                        tracing::debug!(service, peer = %peer, error = %e, "TLS handshake failed");
                    }
                },
            }
        }
        .boxed()
    }
}

async fn serve_connection<I>(service: &'static str, io: I, router: Router, shutdown: Shutdown)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let builder = auto::Builder::new(TokioExecutor::new());
    let connection =
        builder.serve_connection_with_upgrades(TokioIo::new(io), TowerToHyperService::new(router));
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.wait() => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };
    if let Err(e) = result {
        tracing::debug!(service, error = %e, "Connection ended with error");
    }
}
