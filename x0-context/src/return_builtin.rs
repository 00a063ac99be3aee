use async_trait::async_trait;
use flow_runtime::{ReturnBuiltin, ReturnOutcome, RuntimeError};
use http::StatusCode;

use crate::context::Context;

/// The concrete `return(status, override)` policy (spec §4.6 "Internal
/// redirects"): consults the `Context`'s error-page map and, if a mapping
/// exists and the redirect budget isn't exhausted, rewrites the routing
/// path and tells [`flow_runtime::Runner`] to re-enter `main`; otherwise
/// finalizes the response itself with a synthesized minimal body.
///
/// `override_status`, when nonzero, is the status code actually sent to the
/// client once the response is finalized — `status` always drives the
/// error-page *lookup*, so a `return(404, 200)` can map 404 to a page that's
/// still served with a 200 if no error page is configured for 404 at all.
#[derive(Debug, Default)]
pub struct X0ReturnBuiltin;

impl X0ReturnBuiltin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl ReturnBuiltin<Context> for X0ReturnBuiltin {
    async fn finish(&self, status: i64, override_status: i64, ctx: &mut Context) -> Result<ReturnOutcome, RuntimeError> {
        let status16 = status.clamp(100, 599) as u16;

        if let Some(redirect_uri) = ctx.begin_internal_redirect(status16) {
            tracing::debug!(status = status16, target = %redirect_uri, redirect_count = ctx.internal_redirect_count(), "internal redirect to error page");
            return Ok(ReturnOutcome::InternalRedirect);
        }

        // `override_status` always wins when given. Otherwise, a status a
        // builtin already set on the response (`echo`'s `set_status_if_unset`,
        // `redirect`'s 3xx, ...) is the real outcome of the request; the
        // literal `status` argument only drives the error-page lookup above,
        // and the mandatory end-of-`main` patch (spec §4.4) calls this with
        // `(404, 0)` on every fallthrough path, not just genuinely-unhandled
        // ones, so it must not clobber a status a handler already committed to.
        let final_status = if override_status > 0 {
            override_status.clamp(100, 599) as u16
        } else {
            ctx.response.status().map(|s| s.as_u16()).unwrap_or(status16)
        };
        let code = StatusCode::from_u16(final_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        ctx.response.set_status(code);
        if ctx.response.body().is_empty() {
            ctx.response.write(Context::trivial_body(code));
        }
        ctx.response.complete();
        Ok(ReturnOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;

    use bytes::Bytes;
    use http::{HeaderMap, Method, Uri, Version};

    use super::*;
    use crate::request::RequestView;

    fn request(path: &str) -> RequestView {
        RequestView {
            method: Method::GET,
            uri: Uri::try_from(path).unwrap(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4242),
            local_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 80),
            secure: false,
        }
    }

    #[tokio::test]
    async fn finishes_directly_when_no_error_page_is_mapped() {
        let mut ctx = Context::new(request("/missing"), Arc::new(HashMap::new()), 4);
        let outcome = X0ReturnBuiltin::new().finish(404, 0, &mut ctx).await.unwrap();
        assert_eq!(outcome, ReturnOutcome::Done);
        assert_eq!(ctx.response.status(), Some(StatusCode::NOT_FOUND));
        assert!(!ctx.response.body().is_empty());
    }

    #[tokio::test]
    async fn redirects_internally_when_an_error_page_is_mapped() {
        let mut pages = HashMap::new();
        pages.insert(404, "/errors/404.flow".to_string());
        let mut ctx = Context::new(request("/missing"), Arc::new(pages), 4);

        let outcome = X0ReturnBuiltin::new().finish(404, 0, &mut ctx).await.unwrap();
        assert_eq!(outcome, ReturnOutcome::InternalRedirect);
        assert_eq!(ctx.current_path(), "/errors/404.flow");
        assert_eq!(ctx.internal_redirect_count(), 1);
        assert_eq!(ctx.redirect_chain(), ["/missing".to_string()]);
    }

    #[tokio::test]
    async fn exhausting_the_redirect_budget_finalizes_instead() {
        let mut pages = HashMap::new();
        pages.insert(404, "/errors/404.flow".to_string());
        let mut ctx = Context::new(request("/missing"), Arc::new(pages), 0);

        let outcome = X0ReturnBuiltin::new().finish(404, 0, &mut ctx).await.unwrap();
        assert_eq!(outcome, ReturnOutcome::Done);
        assert_eq!(ctx.response.status(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn override_status_is_sent_when_finalizing() {
        let mut ctx = Context::new(request("/missing"), Arc::new(HashMap::new()), 4);
        X0ReturnBuiltin::new().finish(404, 200, &mut ctx).await.unwrap();
        assert_eq!(ctx.response.status(), Some(StatusCode::OK));
    }
}
