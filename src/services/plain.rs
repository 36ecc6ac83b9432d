//! Plaintext HTTP over TCP or a domain socket.

use std::sync::Arc;

use axum::Router;
use futures_util::future::{BoxFuture, FutureExt};

use crate::binding::{BindingError, BindingScope, Scheme, ServiceContributor, ServiceHandler};
use crate::http::HttpHandler;
use crate::net::transport::ServiceAddress;

pub struct PlainHttp {
    app: Router,
}

impl PlainHttp {
    pub const LABEL: &'static str = "http";

    pub fn new(app: Router) -> Self {
        Self { app }
    }
}

impl ServiceContributor for PlainHttp {
    fn label(&self) -> &'static str {
        Self::LABEL
    }

    fn scheme(&self) -> Scheme {
        Scheme::Http
    }

    fn is_applicable(&self, scope: &BindingScope) -> bool {
        scope.config().http.enabled
    }

    fn select_address(&self, scope: &BindingScope) -> ServiceAddress {
        let config = scope.config();
        match &config.http.socket_path {
            Some(path) => ServiceAddress::Domain(path.clone()),
            None => ServiceAddress::inet(config.server.host.clone(), config.http.port),
        }
    }

    fn prepare_handler(
        &self,
        scope: &Arc<BindingScope>,
    ) -> BoxFuture<'static, Result<ServiceHandler, BindingError>> {
        let handler = HttpHandler::plain(
            Self::LABEL,
            self.app.clone(),
            scope.config().stream.max_buffered_frames,
        );
        futures_util::future::ready(Ok(ServiceHandler::Stream(Arc::new(handler)))).boxed()
    }
}
