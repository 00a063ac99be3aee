use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

/// A decoded HTTP request plus the connection metadata the Flow builtin
/// surface exposes as read-only properties (spec §6 "request-time readable
/// properties"). The body is fully buffered: component J's non-goal list
/// excludes persisting request bodies beyond buffering, so there's no
/// streaming body type here, just `Bytes`.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub secure: bool,
}

impl RequestView {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn host(&self) -> Option<&str> {
        self.header("host").or_else(|| self.uri.host())
    }

    pub fn remote_ip(&self) -> IpAddr {
        self.remote_addr.ip()
    }

    pub fn local_ip(&self) -> IpAddr {
        self.local_addr.ip()
    }

    /// Parses the `Cookie` header into `(name, value)` pairs (spec §6
    /// "request ... cookie"), skipping malformed segments rather than
    /// failing the whole lookup.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let header = self.header("cookie")?;
        header.split(';').map(str::trim).find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then_some(v)
        })
    }
}
