//! End-to-end coverage of the concrete scenarios in spec §8: compile a
//! Flow source through `x0d`'s real builtin registry, run `main` with the
//! `Runner`, and assert on the resulting `HostContext::ctx.response`. No
//! socket is involved — this exercises compile -> link -> run without the
//! HTTP transport `server.rs` wraps around it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::sync::Arc;

use bytes::Bytes;
use flow_runtime::Runner;
use http::{HeaderMap, Method, Uri, Version};
use x0_context::{Context, RequestView};
use x0d::host_context::HostContext;
use x0d::server_config::ServerConfig;

fn request(path: &str) -> RequestView {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    RequestView {
        method: Method::GET,
        uri: path.parse::<Uri>().expect("valid test path"),
        version: Version::HTTP_11,
        headers: HeaderMap::new(),
        body: Bytes::new(),
        remote_addr: addr,
        local_addr: addr,
        secure: false,
    }
}

/// Compiles `source` with no cluster table, runs `setup` then `main`
/// against `path`, and returns the finished context for assertions.
async fn run_main(source: &str, path: &str) -> HostContext {
    let clusters = Arc::new(HashMap::new());
    let (_sources, compiled) = x0d::compile_source(source, clusters, flow::CompileOptions::default());
    let compiled = compiled.unwrap_or_else(|e| panic!("expected a successful compile: {e}"));

    let config = Rc::new(RefCell::new(ServerConfig::default()));
    let runner = Runner::new(&compiled.linked);

    let mut ctx = HostContext::new(Context::new(request(path), Arc::new(HashMap::new()), 8), Rc::clone(&config));
    runner.run_setup(&mut ctx).await.expect("setup runs");

    let mut ctx = HostContext::new(Context::new(request(path), Arc::new(HashMap::new()), 8), config);
    runner.run_main(&mut ctx).await.expect("main runs");
    ctx
}

fn body_str(ctx: &HostContext) -> String {
    String::from_utf8_lossy(ctx.ctx.response.body()).to_string()
}

// Spec §8 scenario 1: `if 1 + "a" then blank;` fails to parse with a type
// error naming the `+` operator and the mismatched operand types.
#[tokio::test]
async fn operator_typing_rejects_number_plus_string() {
    let clusters = Arc::new(HashMap::new());
    let source = r#"handler setup { }; handler main { if 1 + "a" then blank; };"#;
    let (_sources, compiled) = x0d::compile_source(source, clusters, flow::CompileOptions::default());
    let err = compiled.expect_err("adding a Number to a String must not type-check");
    let rendered = err.to_string();
    assert!(rendered.contains('+'), "error should name the offending operator: {rendered}");
}

// Spec §8 scenario 2: an interpolated string evaluates its embedded
// expression and casts the Number result to String before concatenating.
#[tokio::test]
async fn interpolated_string_evaluates_embedded_expression() {
    let source = r#"handler setup { }; handler main { var s = "hi #{1+2}"; echo s; return(200, 0); };"#;
    let ctx = run_main(source, "/").await;
    assert_eq!(body_str(&ctx), "hi 3\n");
    assert_eq!(ctx.ctx.response.status(), Some(http::StatusCode::OK));
}

// Spec §8 scenario 3: `match req.path =^ { ... }` dispatches on a
// head/prefix match over the request path.
#[tokio::test]
async fn match_head_dispatches_on_path_prefix() {
    let source = r#"
        handler setup { };
        handler main {
            match req.path =^ {
                "/a": echo "A";
                "/b": echo "B";
                else: blank;
            }
            return(200, 0);
        };
    "#;

    let about = run_main(source, "/about").await;
    assert_eq!(body_str(&about), "A\n");

    let root = run_main(source, "/").await;
    assert_eq!(body_str(&root), "");
    assert_eq!(root.ctx.response.status(), Some(http::StatusCode::OK));
}

#[tokio::test]
async fn redirect_sets_status_and_location_header() {
    let source = r#"handler setup { }; handler main { redirect 302, "https://example.test/new"; };"#;
    let ctx = run_main(source, "/old").await;
    assert_eq!(ctx.ctx.response.status(), Some(http::StatusCode::FOUND));
    assert_eq!(ctx.ctx.response.headers().get(http::header::LOCATION).unwrap(), "https://example.test/new");
}

#[tokio::test]
async fn an_unresolved_builtin_call_fails_to_parse_rather_than_link() {
    let clusters = Arc::new(HashMap::new());
    let source = r#"handler setup { }; handler main { this_builtin_does_not_exist(); };"#;
    let (_sources, compiled) = x0d::compile_source(source, clusters, flow::CompileOptions::default());
    assert!(compiled.is_err(), "a call to an unregistered builtin must not compile");
}
