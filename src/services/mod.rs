//! Built-in service contributors.
//!
//! | label   | scheme | socket   | applicable when                     |
//! |---------|--------|----------|-------------------------------------|
//! | `http`  | http   | stream   | `http.enabled`                      |
//! | `https` | https  | stream   | `https.enabled` and TLS configured  |
//! | `http3` | https  | datagram | `http3.enabled` and TLS configured  |

pub mod http3;
pub mod plain;
pub mod secure;

use std::sync::Arc;

use axum::Router;

use crate::binding::{BindingCoordinator, DatagramService};

pub use http3::{DiscardDatagrams, Http3, ALPN_H3};
pub use plain::PlainHttp;
pub use secure::SecureHttp;

/// Coordinator with every built-in contributor serving `app`.
pub fn standard(app: Router, datagrams: Arc<dyn DatagramService>) -> BindingCoordinator {
    BindingCoordinator::new()
        .with(PlainHttp::new(app.clone()))
        .with(SecureHttp::new(app))
        .with(Http3::new(datagrams))
}
