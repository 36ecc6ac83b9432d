//! TLS-secured HTTP. Sponsors alternate-service advertisements.

use std::sync::Arc;

use axum::Router;
use futures_util::future::{BoxFuture, FutureExt};

use crate::binding::{BindingError, BindingScope, Scheme, ServiceContributor, ServiceHandler};
use crate::http::HttpHandler;
use crate::net::tls::load_tls_config;
use crate::net::transport::ServiceAddress;

pub struct SecureHttp {
    app: Router,
}

impl SecureHttp {
    pub const LABEL: &'static str = "https";

    pub fn new(app: Router) -> Self {
        Self { app }
    }
}

impl ServiceContributor for SecureHttp {
    fn label(&self) -> &'static str {
        Self::LABEL
    }

    fn scheme(&self) -> Scheme {
        Scheme::Https
    }

    /// Inapplicable without certificate material. Configured but unreadable
    /// material still participates and fails its bind.
    fn is_applicable(&self, scope: &BindingScope) -> bool {
        scope.config().https.enabled && scope.config().tls_material().is_some()
    }

    fn select_address(&self, scope: &BindingScope) -> ServiceAddress {
        let config = scope.config();
        let host = config.https.host.as_ref().unwrap_or(&config.server.host);
        ServiceAddress::inet(host.clone(), config.https.port)
    }

    fn prepare_handler(
        &self,
        scope: &Arc<BindingScope>,
    ) -> BoxFuture<'static, Result<ServiceHandler, BindingError>> {
        let app = self.app.clone();
        let scope = Arc::clone(scope);
        async move {
            let tls = scope.config().tls.clone().unwrap_or_default();
            let rustls = load_tls_config(&tls).await?;
            let max_buffered_frames = scope.config().stream.max_buffered_frames;
            let handler = HttpHandler::secure(Self::LABEL, app, max_buffered_frames, rustls, scope);
            Ok(ServiceHandler::Stream(Arc::new(handler)))
        }
        .boxed()
    }
}
