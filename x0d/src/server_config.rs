//! The accumulator setup-only builtins write into (spec §6 "Setup-only
//! functions include `listen`, `ssl.listen`, `ssl.context`, `workers`,
//! `mimetypes`, `tcp_cork`, `max_connections`, resource limits, etc.").
//!
//! One [`ServerConfig`] is produced by running `setup` once, centrally, at
//! boot; the real listener `bind()`s happen from its contents (see
//! `crate::server`). Each worker OS thread then relinks its own copy of the
//! program and replays `setup` again on a throwaway context purely to
//! materialize its own thread-confined globals — that replay writes into a
//! fresh, per-worker `ServerConfig` that is simply discarded, since setup
//! builtins only ever accumulate into this struct and never perform a real
//! `bind()`/`listen()` syscall themselves.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Server-wide configuration materialized by running `setup` (spec §1 "a
/// 'setup' handler runs once at boot to materialize server state").
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listeners: Vec<SocketAddr>,
    pub workers: usize,
    pub default_docroot: Option<PathBuf>,
    /// Extension (without the leading dot) to MIME type, loaded from the
    /// `mimetypes` setup builtin's file argument.
    pub mimetypes: HashMap<String, String>,
    pub default_mimetype: String,
    pub tcp_cork: bool,
    pub max_connections: usize,
    pub max_request_body_size: u64,
    /// Status -> internal-redirect URI, shared across every request (spec
    /// §3 Request Context "error-page map"; spec §4.6 "falling back to a
    /// global map from the cluster configuration").
    pub error_pages: HashMap<u16, String>,
    pub max_internal_redirects: u32,
    /// Prepended to the `Via` header on proxied responses (spec glossary
    /// "Pseudonym"), set by the `proxy.pseudonym` setup builtin.
    pub pseudonym: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            workers: 1,
            default_docroot: None,
            mimetypes: HashMap::new(),
            default_mimetype: "application/octet-stream".to_string(),
            tcp_cork: false,
            max_connections: 1024,
            max_request_body_size: 2 * 1024 * 1024,
            error_pages: HashMap::new(),
            max_internal_redirects: 4,
            pseudonym: "x0d".to_string(),
        }
    }
}

impl ServerConfig {
    /// Looks up a file extension's MIME type, falling back to the
    /// configured default (spec §6 "physical file ... mimetype").
    pub fn mimetype_for(&self, path: &std::path::Path) -> String {
        path.extension().and_then(|e| e.to_str()).and_then(|ext| self.mimetypes.get(ext)).cloned().unwrap_or_else(|| self.default_mimetype.clone())
    }
}

/// Parses a `mimetypes`-style file: lines of `type/subtype  ext1 ext2 ...`,
/// blank lines and `#`-comments ignored — the same shape Apache's and the
/// original `mime.types` files use, which `CoreModule::mimetypes` loads.
pub fn parse_mimetypes(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(mimetype) = parts.next() else { continue };
        for ext in parts {
            map.insert(ext.to_string(), mimetype.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extension_to_mimetype_mappings() {
        let map = parse_mimetypes("# comment\ntext/html html htm\napplication/json json\n");
        assert_eq!(map.get("html"), Some(&"text/html".to_string()));
        assert_eq!(map.get("htm"), Some(&"text/html".to_string()));
        assert_eq!(map.get("json"), Some(&"application/json".to_string()));
    }

    #[test]
    fn mimetype_for_falls_back_to_the_default() {
        let mut config = ServerConfig::default();
        config.mimetypes.insert("json".to_string(), "application/json".to_string());
        assert_eq!(config.mimetype_for(std::path::Path::new("a.json")), "application/json");
        assert_eq!(config.mimetype_for(std::path::Path::new("a.bin")), "application/octet-stream");
    }
}
