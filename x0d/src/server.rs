//! The worker/accept loop (spec §5 "multiple worker loops, each
//! single-threaded and cooperative; a listener fd is shared (`SO_REUSEPORT`-
//! style) across them"). One OS thread per worker, each running its own
//! `tokio::task::LocalSet` on a current-thread runtime — `Runner`'s
//! registers are `Rc`-based (see `flow_runtime::runner`'s module doc), so
//! nothing here is allowed to cross a thread boundary except plain data and
//! `Arc`/`Send+Sync` handles (`ClusterTable`, the configuration source text).
//!
//! Grounded on `original_source/src/x0d/XzeroDaemon.cc`'s own
//! one-thread-per-worker event loop plus
//! `original_source/src/xzero/http/http1/Connection.cc` for the
//! request/response framing this adapts to `hyper::server::conn::http1`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::rc::Rc;
use std::sync::Arc;

use bytes::Bytes;
use flow_diagnostics::SourceMap;
use flow_runtime::{HostRegistry, LinkedProgram, Runner};
use http::{Request as HttpRequest, Response as HttpResponse, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use x0_context::{Context, RequestView};

use crate::builtins::{self, ClusterTable};
use crate::host_context::{HostContext, HostReturnBuiltin};
use crate::server_config::ServerConfig;

/// Spawns `worker_count` OS threads, each independently recompiling `source`
/// and serving every listener in `listeners`. Blocks until every worker
/// thread exits (normally: never, since each runs an infinite accept loop).
pub fn run(listeners: Vec<StdTcpListener>, worker_count: usize, source: String, clusters: ClusterTable, optimization_level: u8, allow_experimental: bool) -> std::io::Result<()> {
    let source: Arc<str> = Arc::from(source);
    let mut handles = Vec::with_capacity(worker_count);

    for id in 0..worker_count {
        let worker_listeners = listeners.iter().map(StdTcpListener::try_clone).collect::<std::io::Result<Vec<_>>>()?;
        let source = Arc::clone(&source);
        let clusters = Arc::clone(&clusters);
        let handle = std::thread::Builder::new().name(format!("x0d-worker-{id}")).spawn(move || {
            if let Err(err) = worker_main(id, worker_listeners, &source, clusters, optimization_level, allow_experimental) {
                tracing::error!(worker = id, error = %err, "worker thread exited with an error");
            }
        })?;
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

/// Re-parses and re-links `source` from scratch. `flow_runtime::LinkedProgram`
/// caches its compiled regex constants behind `Rc` (not `Send`/`Sync`), so a
/// program linked on one thread can never be handed to another — each worker
/// recompiles its own copy instead of sharing one (spec §6 "compiled once at
/// startup" is honored per-worker, not process-wide; a Flow config is small
/// enough that recompiling it once per worker is not a meaningful cost).
fn compile_for_worker(source: &str, clusters: ClusterTable, optimization_level: u8, allow_experimental: bool) -> Result<LinkedProgram<HostContext>, flow::CompileError> {
    let mut registry = HostRegistry::new();
    builtins::register(&mut registry, clusters);

    let mut sources = SourceMap::new();
    let root = sources.add_inline("<config>", source.to_string());

    let options = flow::CompileOptions { optimization_level, allow_experimental };
    let compiled = flow::compile(&sources, root, &registry, Arc::new(HostReturnBuiltin::new()), options)?;
    Ok(compiled.linked)
}

/// A placeholder request for the `setup`-only replay every worker runs to
/// materialize its own thread-confined `ServerConfig`/`Runner::globals`
/// (spec §1 "a 'setup' handler runs once at boot"). Nothing in `setup` reads
/// request fields, so these values are never observed.
fn bootstrap_request() -> RequestView {
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    RequestView {
        method: http::Method::GET,
        uri: http::Uri::from_static("/"),
        version: http::Version::HTTP_11,
        headers: http::HeaderMap::new(),
        body: Bytes::new(),
        remote_addr: addr,
        local_addr: addr,
        secure: false,
    }
}

fn worker_main(id: usize, listeners: Vec<StdTcpListener>, source: &str, clusters: ClusterTable, optimization_level: u8, allow_experimental: bool) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        let linked = compile_for_worker(source, clusters, optimization_level, allow_experimental)
            .unwrap_or_else(|err| panic!("worker {id} failed to recompile a configuration the main thread already compiled once: {err}"));
        // Leaked once per worker thread, which lives for the process's
        // whole lifetime anyway: `Runner<'p, C>` borrows its `LinkedProgram`
        // rather than owning it, and every request on this worker shares
        // one `Runner` (so `var`-level Flow globals persist across requests
        // on the same worker, spec §3 "runner instance for this request"
        // sharing `globals` across calls on one `LinkedProgram`).
        let linked: &'static LinkedProgram<HostContext> = Box::leak(Box::new(linked));
        let runner = Rc::new(Runner::new(linked));
        let config = Rc::new(RefCell::new(ServerConfig::default()));

        let mut setup_ctx = HostContext::new(Context::new(bootstrap_request(), Arc::new(HashMap::new()), 0), Rc::clone(&config));
        runner.run_setup(&mut setup_ctx).await.unwrap_or_else(|err| panic!("worker {id} setup failed on a configuration already validated on the main thread: {err}"));

        let global_error_pages = Arc::new(config.borrow().error_pages.clone());
        let max_internal_redirects = config.borrow().max_internal_redirects;

        let mut accept_tasks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            listener.set_nonblocking(true).expect("listener must be non-blocking before tokio adopts it");
            let listener = tokio::net::TcpListener::from_std(listener).expect("listener was just set non-blocking");
            accept_tasks.push(tokio::task::spawn_local(accept_loop(listener, Rc::clone(&runner), Rc::clone(&config), Arc::clone(&global_error_pages), max_internal_redirects)));
        }
        for task in accept_tasks {
            let _ = task.await;
        }
    });

    Ok(())
}

async fn accept_loop(listener: tokio::net::TcpListener, runner: Rc<Runner<'static, HostContext>>, config: Rc<RefCell<ServerConfig>>, global_error_pages: Arc<HashMap<u16, String>>, max_internal_redirects: u32) {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(error = %err, "accept failed");
                continue;
            }
        };
        let local_addr = stream.local_addr().unwrap_or(remote_addr);
        let io = TokioIo::new(stream);

        let runner = Rc::clone(&runner);
        let config = Rc::clone(&config);
        let global_error_pages = Arc::clone(&global_error_pages);

        tokio::task::spawn_local(async move {
            let service = service_fn(move |req: HttpRequest<Incoming>| {
                let runner = Rc::clone(&runner);
                let config = Rc::clone(&config);
                let global_error_pages = Arc::clone(&global_error_pages);
                async move { handle_request(req, remote_addr, local_addr, runner, config, global_error_pages, max_internal_redirects).await }
            });
            if let Err(err) = hyper::server::conn::http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %err, "connection ended with an error");
            }
        });
    }
}

async fn handle_request(
    req: HttpRequest<Incoming>,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    runner: Rc<Runner<'static, HostContext>>,
    config: Rc<RefCell<ServerConfig>>,
    global_error_pages: Arc<HashMap<u16, String>>,
    max_internal_redirects: u32,
) -> Result<HttpResponse<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to read request body");
            Bytes::new()
        }
    };

    let request = RequestView {
        method: parts.method,
        uri: parts.uri,
        version: parts.version,
        headers: parts.headers,
        body,
        remote_addr,
        local_addr,
        secure: false,
    };

    let mut ctx = HostContext::new(Context::new(request, global_error_pages, max_internal_redirects), config);

    if let Err(err) = runner.run_main(&mut ctx).await {
        tracing::error!(error = %err, "unhandled error while dispatching request");
        ctx.ctx.response.reset_body();
        ctx.ctx.response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        ctx.ctx.response.write(Context::trivial_body(StatusCode::INTERNAL_SERVER_ERROR));
        ctx.ctx.response.complete();
    }

    Ok(render_response(&mut ctx))
}

/// Spec §7 "Exceptions bubbling out of a builtin are caught at the dispatch
/// loop boundary and converted to a 500 response": anything `run_main`
/// propagates past this point becomes a generic server error rather than a
/// dropped connection.
fn render_response(ctx: &mut HostContext) -> HttpResponse<Full<Bytes>> {
    let status = ctx.ctx.response.status().unwrap_or(StatusCode::NOT_FOUND);
    let mut builder = HttpResponse::builder().status(status);
    for (name, value) in ctx.ctx.response.headers().iter() {
        builder = builder.header(name, value);
    }
    builder.body(Full::new(Bytes::copy_from_slice(ctx.ctx.response.body()))).expect("status and headers were already validated by `http`")
}
