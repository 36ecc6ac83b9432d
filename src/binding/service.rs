//! Service outcomes and alternate-service advertisements.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::binding::error::BindingError;
use crate::net::channel::BoundAddress;

/// URL scheme a bound service answers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a service ended up and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceBinding {
    pub address: BoundAddress,
    pub scheme: Scheme,
}

impl ServiceBinding {
    /// Domain sockets use `http+unix://` with the percent-encoded path as host.
    pub fn url(&self) -> Result<Url, url::ParseError> {
        match &self.address {
            BoundAddress::Inet(addr) => Url::parse(&format!("{}://{}/", self.scheme, addr)),
            BoundAddress::Unix(path) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(path.to_string_lossy().as_bytes()).collect();
                Url::parse(&format!("{}+unix://{}/", self.scheme, encoded))
            }
        }
    }
}

/// Finalized outcome of one contributor.
#[derive(Debug, Clone)]
pub struct Service {
    pub label: String,
    pub outcome: Result<ServiceBinding, Arc<BindingError>>,
}

impl Service {
    pub fn bound(label: impl Into<String>, binding: ServiceBinding) -> Self {
        Self {
            label: label.into(),
            outcome: Ok(binding),
        }
    }

    pub fn failed(label: impl Into<String>, error: impl Into<Arc<BindingError>>) -> Self {
        Self {
            label: label.into(),
            outcome: Err(error.into()),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn binding(&self) -> Option<&ServiceBinding> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&BindingError> {
        self.outcome.as_ref().err().map(|e| e.as_ref())
    }

    pub fn report(&self) -> ServiceReport {
        match &self.outcome {
            Ok(binding) => ServiceReport {
                label: self.label.clone(),
                status: "bound",
                address: Some(binding.address.clone()),
                url: binding.url().ok().map(String::from),
                error: None,
            },
            Err(e) => ServiceReport {
                label: self.label.clone(),
                status: "failed",
                address: None,
                url: None,
                error: Some(e.to_string()),
            },
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(binding) => match binding.url() {
                Ok(url) => write!(f, "{}: bound {}", self.label, url),
                Err(_) => write!(f, "{}: bound {}", self.label, binding.address),
            },
            Err(e) => write!(f, "{}: failed: {}", self.label, e),
        }
    }
}

/// Serializable view of a [`Service`] for startup reports.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub label: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<BoundAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A service advertised as an alternate endpoint of a sponsoring service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltServiceSource {
    /// ALPN protocol id, e.g. `h3`.
    pub protocol: String,
    /// Label of the service whose responses carry the advertisement.
    pub sponsor: String,
    /// Label of the advertised service.
    pub label: String,
    /// Host advertised when the two services are bound to different hosts.
    pub host: Option<String>,
    pub max_age_secs: u64,
}

impl AltServiceSource {
    /// One `alt-svc` entry, e.g. `h3=":8443"; ma=86400`.
    ///
    /// `None` unless the alternate is bound to an inet address.
    pub fn advertise(&self, sponsor: &ServiceBinding, alternate: &ServiceBinding) -> Option<String> {
        let alt = alternate.address.inet()?;
        let same_host = sponsor
            .address
            .inet()
            .is_some_and(|sponsor| sponsor.ip() == alt.ip());
        let authority = if same_host {
            format!(":{}", alt.port())
        } else {
            match &self.host {
                Some(host) => format!("{host}:{}", alt.port()),
                None => alt.to_string(),
            }
        };
        Some(format!(
            "{}=\"{}\"; ma={}",
            self.protocol, authority, self.max_age_secs
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inet(addr: &str, scheme: Scheme) -> ServiceBinding {
        ServiceBinding {
            address: BoundAddress::Inet(addr.parse().unwrap()),
            scheme,
        }
    }

    fn h3(host: Option<&str>) -> AltServiceSource {
        AltServiceSource {
            protocol: "h3".into(),
            sponsor: "https".into(),
            label: "http3".into(),
            host: host.map(String::from),
            max_age_secs: 86_400,
        }
    }

    #[test]
    fn same_host_advertises_port_only() {
        let sponsor = inet("127.0.0.1:8443", Scheme::Https);
        let alt = inet("127.0.0.1:9443", Scheme::Https);
        assert_eq!(
            h3(Some("example.test")).advertise(&sponsor, &alt).unwrap(),
            "h3=\":9443\"; ma=86400"
        );
    }

    #[test]
    fn different_host_is_included() {
        let sponsor = inet("127.0.0.1:8443", Scheme::Https);
        let alt = inet("127.0.0.2:9443", Scheme::Https);
        assert_eq!(
            h3(None).advertise(&sponsor, &alt).unwrap(),
            "h3=\"127.0.0.2:9443\"; ma=86400"
        );
        assert_eq!(
            h3(Some("edge.example.test")).advertise(&sponsor, &alt).unwrap(),
            "h3=\"edge.example.test:9443\"; ma=86400"
        );
    }

    #[test]
    fn unix_alternate_is_not_advertised() {
        let sponsor = inet("127.0.0.1:8443", Scheme::Https);
        let alt = ServiceBinding {
            address: BoundAddress::Unix("/tmp/h3.sock".into()),
            scheme: Scheme::Https,
        };
        assert!(h3(None).advertise(&sponsor, &alt).is_none());
    }

    #[test]
    fn urls_follow_the_bound_address() {
        let binding = inet("127.0.0.1:8080", Scheme::Http);
        assert_eq!(binding.url().unwrap().as_str(), "http://127.0.0.1:8080/");

        let binding = ServiceBinding {
            address: BoundAddress::Unix("/tmp/app.sock".into()),
            scheme: Scheme::Http,
        };
        let url = binding.url().unwrap();
        assert_eq!(url.scheme(), "http+unix");
        assert_eq!(url.as_str(), "http+unix://%2Ftmp%2Fapp.sock/");
    }

    #[test]
    fn report_carries_failure_reason() {
        let service = Service::failed("https", BindingError::Cancelled);
        let report = service.report();
        assert_eq!(report.status, "failed");
        assert_eq!(report.error.as_deref(), Some("bind cancelled"));
        assert!(!service.is_bound());
    }
}
