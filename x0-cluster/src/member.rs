use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, Version};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::error::UpstreamError;
use crate::health::{HealthCheckConfig, HealthMonitor};
use crate::scheduler::MemberSnapshot;

/// Fields loaded from a `[backend=NAME]` section (spec §6) plus the
/// per-operation timeouts inherited from `[director]` unless overridden.
#[derive(Debug, Clone)]
pub struct MemberConfig {
    pub name: String,
    pub address: SocketAddr,
    pub capacity: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

/// An upstream backend (spec component M "Cluster Member"). Owns its own
/// in-flight counter and enabled/protected flags as atomics so the
/// scheduler can read a consistent [`MemberSnapshot`] without locking the
/// cluster-wide state the shaper/queue live in (spec §5 "in-flight counts
/// are member-local atomics").
pub struct Member {
    config: MemberConfig,
    enabled: AtomicBool,
    /// A protected member is never auto-disabled by sticky-offline mode
    /// (spec §3 Member fields) — reserved for an operator-pinned backend.
    protected: AtomicBool,
    in_flight: AtomicU32,
    health: HealthMonitor,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl Member {
    pub fn new(config: MemberConfig, health_check: HealthCheckConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { config, enabled: AtomicBool::new(true), protected: AtomicBool::new(false), in_flight: AtomicU32::new(0), health: HealthMonitor::new(health_check), client }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    pub fn capacity(&self) -> u32 {
        self.config.capacity
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn protected(&self) -> bool {
        self.protected.load(Ordering::Acquire)
    }

    pub fn set_protected(&self, protected: bool) {
        self.protected.store(protected, Ordering::Release);
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// Spec §3 Member invariant: "in-flight <= capacity when enabled and
    /// online" — the scheduler is the only thing that grows `in_flight`
    /// (spec §4.8 "On Success the scheduler increments the member's
    /// in-flight count"), so this is where that increment actually lives.
    pub fn begin_request(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub fn end_request(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self, index: usize) -> MemberSnapshot {
        MemberSnapshot { index, capacity: self.config.capacity, in_flight: self.in_flight(), enabled: self.enabled(), online: self.health.is_online() }
    }

    /// Forwards `request` to this member over HTTP/1.x (spec component M /
    /// §4.9). Hop-by-hop headers are stripped in both directions and a
    /// `Via` header is prepended onto the response (spec §4.9, grounded on
    /// `original_source/src/x0d/modules/proxy/ProxyModule.cc`'s
    /// `isConnectionHeader`/`addVia`). The response body is fully buffered:
    /// component J's non-goal list excludes persisting bodies beyond
    /// buffering, and that's the contract this crate's `ResponseWriter`
    /// already assumes.
    pub async fn forward(&self, pseudonym: &str, inbound_version: Version, request: Request<Bytes>) -> Result<Response<Bytes>, UpstreamError> {
        let (parts, body) = request.into_parts();

        let mut uri_parts = http::uri::Parts::default();
        uri_parts.scheme = Some(http::uri::Scheme::HTTP);
        uri_parts.authority = Some(self.config.address.to_string().parse().map_err(|e: http::uri::InvalidUri| UpstreamError::Protocol(e.to_string()))?);
        uri_parts.path_and_query = parts.uri.path_and_query().cloned();
        let outbound_uri = http::Uri::from_parts(uri_parts).map_err(|e| UpstreamError::Protocol(e.to_string()))?;

        let mut builder = Request::builder().method(parts.method.clone()).uri(outbound_uri).version(Version::HTTP_11);
        for (name, value) in parts.headers.iter() {
            if !is_hop_by_hop(name) {
                builder = builder.header(name, value);
            }
        }
        builder = builder.header(http::header::CONTENT_LENGTH, body.len());
        let outbound = builder.body(Full::new(body)).map_err(|e| UpstreamError::Protocol(e.to_string()))?;

        // `connect_timeout` is nested inside `write_timeout`: the connector
        // itself also carries `connect_timeout` (`Member::new`'s
        // `set_connect_timeout`), but nesting here lets a stall that's still
        // within the connect phase be reported distinctly from one that
        // drags on past it while sending the request/waiting on the response
        // head; reading the body is bounded separately by `read_timeout`
        // below.
        let attempt = tokio::time::timeout(self.config.connect_timeout, self.client.request(outbound));
        let response = match tokio::time::timeout(self.config.write_timeout, attempt).await {
            Ok(Ok(Ok(resp))) => resp,
            Ok(Ok(Err(e))) => return Err(UpstreamError::Connect(e.to_string())),
            Ok(Err(_)) => return Err(UpstreamError::ConnectTimeout),
            Err(_) => return Err(UpstreamError::WriteTimeout),
        };

        let (resp_parts, body) = response.into_parts();
        let body = match tokio::time::timeout(self.config.read_timeout, body.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(_)) => return Err(UpstreamError::ClosedBeforeHeaders),
            Err(_) => return Err(UpstreamError::ReadTimeout),
        };

        let mut out = Response::builder().status(resp_parts.status);
        let headers = out.headers_mut().expect("builder has no prior error");
        for (name, value) in resp_parts.headers.iter() {
            if !is_hop_by_hop(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        prepend_via(headers, inbound_version, pseudonym);

        out.body(body).map_err(|e| UpstreamError::Protocol(e.to_string()))
    }
}

/// Spec §4.9 "Headers are forwarded except hop-by-hop fields (`Connection`,
/// `Content-Length` — rewritten, `Keep-Alive`, `TE`, `Trailer`,
/// `Transfer-Encoding`, `Upgrade`, `Close`)", plus `Via` itself so this
/// member's own pseudonym is the only one prepended per hop (grounded on
/// `ProxyModule.cc`'s `isConnectionHeader` list, which also excludes `Via`).
fn is_hop_by_hop(name: &HeaderName) -> bool {
    const HOP_BY_HOP: [&str; 8] = ["connection", "content-length", "close", "keep-alive", "te", "trailer", "transfer-encoding", "upgrade"];
    HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h)) || name == http::header::VIA
}

/// `"<http-version> <pseudonym>"`, prepended (RFC 7230 S5.7.1: the proxy
/// puts itself at the front of the `Via` list) rather than appended.
fn prepend_via(headers: &mut HeaderMap, inbound_version: Version, pseudonym: &str) {
    let version_str = match inbound_version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    };
    let mut value = format!("{version_str} {pseudonym}");
    if let Some(existing) = headers.remove(http::header::VIA) {
        value.push_str(", ");
        value.push_str(existing.to_str().unwrap_or_default());
    }
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(http::header::VIA, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn hop_by_hop_headers_are_recognized_case_insensitively() {
        assert!(is_hop_by_hop(&http::header::CONNECTION));
        assert!(is_hop_by_hop(&HeaderName::from_static("transfer-encoding")));
        assert!(is_hop_by_hop(&http::header::VIA));
        assert!(!is_hop_by_hop(&http::header::HOST));
        assert!(!is_hop_by_hop(&http::header::CONTENT_TYPE));
    }

    #[test]
    fn via_is_prepended_ahead_of_any_existing_via_chain() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::VIA, HeaderValue::from_static("1.0 upstream-proxy"));
        prepend_via(&mut headers, Version::HTTP_11, "x0d");
        assert_eq!(headers.get(http::header::VIA).unwrap(), "1.1 x0d, 1.0 upstream-proxy");
    }

    #[test]
    fn snapshot_reflects_atomics_without_locking_cluster_state() {
        let member = Member::new(
            MemberConfig { name: "a".into(), address: "127.0.0.1:8080".parse().unwrap(), capacity: 4, connect_timeout: Duration::from_secs(1), read_timeout: Duration::from_secs(1), write_timeout: Duration::from_secs(1) },
            HealthCheckConfig::default(),
        );
        member.begin_request();
        member.begin_request();
        let snap = member.snapshot(0);
        assert_eq!(snap.in_flight, 2);
        assert_eq!(snap.capacity, 4);
        assert!(!snap.online);
        member.end_request();
        assert_eq!(member.in_flight(), 1);
    }
}
