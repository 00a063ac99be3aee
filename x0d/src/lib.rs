//! Library half of the `x0d` binary (spec §6 "CLI (external, minimal; not
//! core)"): Flow config compiler/runtime wiring, builtin registration, and
//! the worker/cluster server loop. Split out from `main.rs` the way
//! `r2e-cli` keeps its command implementations in `lib.rs` behind a thin
//! binary entry point — it also gives `tests/` a way to drive the
//! compile -> setup -> run pipeline end to end (spec §8) without spawning
//! the real process.

pub mod builtins;
pub mod cli;
pub mod error;
pub mod host_context;
pub mod logging;
pub mod server;
pub mod server_config;

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::TcpListener;
use std::rc::Rc;
use std::sync::Arc;

use flow_diagnostics::SourceMap;
use flow_runtime::{HostRegistry, Runner};

use builtins::ClusterTable;
use cli::Cli;
use error::X0Error;
use host_context::{HostContext, HostReturnBuiltin};
use server_config::ServerConfig;
use x0_context::Context;

/// Compiles `source` against a fresh registry carrying `clusters`, the way
/// `run` does before binding any listener. Exposed so integration tests can
/// exercise parse/type/link failures (spec §8 scenario 1) and successful
/// compiles without going through the CLI or the filesystem. Returns the
/// [`SourceMap`] alongside the result since diagnostics rendering (even for
/// a successful compile's warnings) needs it.
pub fn compile_source(source: &str, clusters: ClusterTable, options: flow::CompileOptions) -> (SourceMap, Result<flow::Compiled<HostContext>, X0Error>) {
    let mut registry = HostRegistry::new();
    builtins::register(&mut registry, clusters);

    let mut sources = SourceMap::new();
    let root = sources.add_inline("<config>", source.to_string());

    let result = flow::compile(&sources, root, &registry, Arc::new(HostReturnBuiltin::new()), options).map_err(|err| X0Error::Compile(render_compile_error(&err, &sources)));
    (sources, result)
}

/// A request view with no real connection behind it, used both to replay
/// `setup` (spec §1 "a setup handler runs once at boot") and as a building
/// block for tests that want to drive `main` without a live socket.
pub fn bootstrap_request() -> x0_context::RequestView {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    x0_context::RequestView {
        method: http::Method::GET,
        uri: http::Uri::from_static("/"),
        version: http::Version::HTTP_11,
        headers: http::HeaderMap::new(),
        body: bytes::Bytes::new(),
        remote_addr: addr,
        local_addr: addr,
        secure: false,
    }
}

pub fn render_compile_error(err: &flow::CompileError, sources: &SourceMap) -> String {
    match err {
        flow::CompileError::Diagnostics(report) => report.render(sources),
        other => other.to_string(),
    }
}

pub fn load_clusters(cli: &Cli) -> Result<ClusterTable, X0Error> {
    let Some(path) = &cli.cluster_config else {
        return Ok(Arc::new(HashMap::new()));
    };

    let text = std::fs::read_to_string(path)?;
    let config = x0_cluster::parse_config(&text)?;
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("default").to_string();

    let controller = x0_cluster::ClusterController::from_config(name.clone(), "x0d", config, None)?;
    controller.spawn_background_tasks();

    let mut map = HashMap::new();
    map.insert(name, controller);
    Ok(Arc::new(map))
}

/// Parses the CLI's `--config` file, runs `setup` once to materialize a
/// [`ServerConfig`], binds every listener it names, then hands off to
/// [`server::run`] for the worker loops. Split out of `main` so the binary
/// entry point is just argument parsing plus exit-code mapping.
pub fn run(cli: &Cli) -> Result<(), X0Error> {
    let source = std::fs::read_to_string(&cli.config)?;
    let clusters = load_clusters(cli)?;

    let options = flow::CompileOptions { optimization_level: cli.optimization_level, allow_experimental: cli.allow_experimental };
    let (sources, compiled) = compile_source(&source, Arc::clone(&clusters), options);
    let compiled = compiled?;

    if cli.dump_ast {
        println!("{:#?}", compiled.unit);
    }
    if cli.dump_tc {
        if compiled.diagnostics.is_empty() {
            println!("no diagnostics");
        } else {
            println!("{}", compiled.diagnostics.render(&sources));
        }
        println!("{:#?}", compiled.unit.symbols);
    }
    if cli.dump_ir {
        // The `flow` facade doesn't re-export `flow_ir::Builder`, so there's
        // no post-pass three-address IR to print from here; the final
        // linear bytecode is the closest faithful stand-in.
        println!("{}", compiled.linked.program.dump());
    }
    if cli.dump_requested() {
        return Ok(());
    }

    let config = Rc::new(RefCell::new(ServerConfig::default()));
    let runner = Runner::new(&compiled.linked);
    let mut setup_ctx = HostContext::new(Context::new(bootstrap_request(), Arc::new(HashMap::new()), 0), Rc::clone(&config));

    // Run in a throwaway single-threaded runtime purely to drive the
    // `async fn`s `setup` is compiled as (spec §1's coroutine model), not
    // because setup itself ever actually suspends.
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(X0Error::Io)?;
    rt.block_on(runner.run_setup(&mut setup_ctx)).map_err(|e| X0Error::Compile(e.to_string()))?;

    let materialized = config.borrow().clone();
    if materialized.listeners.is_empty() {
        return Err(X0Error::NoListeners);
    }

    let listeners = materialized
        .listeners
        .iter()
        .map(|addr| TcpListener::bind(addr).map_err(|source| X0Error::Bind { addr: *addr, source }))
        .collect::<Result<Vec<_>, _>>()?;

    let worker_count = cli.workers.unwrap_or(materialized.workers).max(1);
    tracing::info!(listeners = ?materialized.listeners, workers = worker_count, "x0d starting");

    server::run(listeners, worker_count, source, clusters, cli.optimization_level, cli.allow_experimental).map_err(|source| X0Error::Bind { addr: materialized.listeners[0], source })
}
