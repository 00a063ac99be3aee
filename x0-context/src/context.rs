use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::StatusCode;

use crate::physical_file::PhysicalFile;
use crate::request::RequestView;
use crate::response::ResponseWriter;

/// Per-request scoped state (spec component J "Request Context"). Created
/// when the HTTP layer accepts a request, dropped when its response
/// completes — `x0d`'s server loop owns this lifetime; a [`flow_runtime::Runner`]
/// is built alongside it (not nested inside it: `Runner<'p, C>` is generic
/// over the context type it drives, so embedding one here would make
/// `Context` generic over itself).
pub struct Context {
    pub request: RequestView,
    pub response: ResponseWriter,
    created_at: Instant,
    /// Document root set by `docroot`/`alias` (spec §6).
    pub docroot: Option<PathBuf>,
    /// Path-info suffix past the matched physical file (PATH_INFO-style).
    pub path_info: String,
    pub physical_file: Option<PhysicalFile>,
    /// The path actually being routed on — starts as `request.path()`, and
    /// is rewritten on every internal redirect without touching the
    /// original request (spec §4.6 "rewrites the path").
    current_path: String,
    /// One entry per internal redirect taken so far, oldest first (spec §3
    /// "a request-path list tracking the internal-redirect chain").
    redirect_chain: Vec<String>,
    local_error_pages: HashMap<u16, String>,
    global_error_pages: Arc<HashMap<u16, String>>,
    max_internal_redirects: u32,
}

impl Context {
    pub fn new(request: RequestView, global_error_pages: Arc<HashMap<u16, String>>, max_internal_redirects: u32) -> Self {
        let current_path = request.path().to_string();
        Self {
            request,
            response: ResponseWriter::new(),
            created_at: Instant::now(),
            docroot: None,
            path_info: String::new(),
            physical_file: None,
            current_path,
            redirect_chain: Vec::new(),
            local_error_pages: HashMap::new(),
            global_error_pages,
            max_internal_redirects,
        }
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn set_document_root(&mut self, path: impl Into<PathBuf>) {
        self.docroot = Some(path.into());
    }

    pub fn set_path_info(&mut self, value: impl Into<String>) {
        self.path_info = value.into();
    }

    pub fn set_file(&mut self, file: PhysicalFile) {
        self.physical_file = Some(file);
    }

    /// Registers a per-request error-page mapping (the `errorpage` setup
    /// builtin installs these against `global_error_pages` instead; this is
    /// for a handler that wants to override just this request).
    pub fn set_error_page(&mut self, status: u16, uri: impl Into<String>) {
        self.local_error_pages.insert(status, uri.into());
    }

    /// Looks up an error-page URI for `status`, checking the per-request
    /// map before falling back to the cluster-wide one (spec §4.6 "falling
    /// back to a global map from the cluster configuration").
    fn error_page(&self, status: u16) -> Option<&str> {
        self.local_error_pages.get(&status).or_else(|| self.global_error_pages.get(&status)).map(String::as_str)
    }

    pub fn internal_redirect_count(&self) -> usize {
        self.redirect_chain.len()
    }

    pub fn redirect_chain(&self) -> &[String] {
        &self.redirect_chain
    }

    /// Attempts an internal redirect to `status`'s configured error page.
    /// `Some(uri)` means the caller should rewrite routing state and
    /// re-enter `main`; `None` means no mapping exists (or the redirect
    /// budget is exhausted) and the caller should finalize the response
    /// itself instead.
    pub fn begin_internal_redirect(&mut self, status: u16) -> Option<String> {
        if self.redirect_chain.len() >= self.max_internal_redirects as usize {
            return None;
        }
        let uri = self.error_page(status)?.to_string();
        self.redirect_chain.push(std::mem::replace(&mut self.current_path, uri.clone()));
        self.response.reset_body();
        Some(uri)
    }

    /// A minimal, self-contained response body for `status` (spec
    /// "sendTrivialResponse" — "simple content if content not forbidden").
    pub fn trivial_body(status: StatusCode) -> String {
        format!("{} {}\n", status.as_u16(), status.canonical_reason().unwrap_or("Error"))
    }
}
