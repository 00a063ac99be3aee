use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

/// Response state accumulated while a handler runs. Mirrors the original's
/// "set status, append to body, mark completed" response object rather than
/// a single `http::Response` built in one shot, since builtins (`echo`,
/// `redirect`, the internal-redirect error-page path) each touch it
/// incrementally over the lifetime of one handler invocation.
#[derive(Debug, Clone, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    completed: bool,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sets the status, but only if one hasn't already been set (spec's
    /// `echo` builtin: "if (!cx->response()->status()) setStatus(Ok)").
    pub fn set_status_if_unset(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn write(&mut self, chunk: impl AsRef<[u8]>) {
        self.body.extend_from_slice(chunk.as_ref());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Discards any body written so far — used when an internal redirect
    /// supersedes whatever the previous `main` pass had started writing.
    pub fn reset_body(&mut self) {
        self.body.clear();
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn complete(&mut self) {
        self.completed = true;
    }
}
