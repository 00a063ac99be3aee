//! Registers `x0d`'s own builtin surface into a
//! [`flow_runtime::HostRegistry<HostContext>`] (spec §6 "Host-registered
//! builtin surface"). Grounded on
//! `original_source/src/x0d/modules/core/CoreModule.cc`'s own
//! property/handler split between setup-only, request-time-readable, and
//! main-time statement builtins; `proxy.cluster`/`proxy.http` follow
//! `original_source/src/x0d/modules/proxy/ProxyModule.cc`.
//!
//! `x0d`'s binary does not implement every builtin the original ships —
//! spec §1 explicitly treats "the concrete per-module builtins like
//! `staticfile`/`compress`/`auth`" as out-of-scope external collaborators.
//! What's registered here is the minimum surface needed to exercise the
//! pipeline end-to-end (spec §8's testable scenarios all run against it)
//! plus the cluster-facing `proxy.*` handlers component K-O exist to serve;
//! it is not meant to be exhaustive.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flow_runtime::{HostRegistry, NativeFunction, NativeHandler, Params, RuntimeError};
use flow_syntax::symbol::{BuiltinSignature, Param};
use flow_syntax::{LiteralType, LiteralValue};
use http::{HeaderName, HeaderValue, Request, StatusCode};
use x0_cluster::{ClusterController, ClusterError, HealthCheckConfig, Member, MemberConfig};
use x0_context::PhysicalFile;

use crate::host_context::HostContext;
use crate::server_config::parse_mimetypes;

/// Every named cluster a `proxy.cluster` call may target, built once at
/// startup from `--cluster-config` (see `crate::main`). Shared (`Arc`, not
/// `Rc`) because `ClusterController` itself is `Send + Sync` and the same
/// map is handed to every worker thread's registry.
pub type ClusterTable = Arc<HashMap<String, Arc<ClusterController>>>;

/// Registers every builtin `x0d` understands. `clusters` may be empty (no
/// `--cluster-config` given); `proxy.cluster` then fails every call at
/// runtime with an unknown-cluster error rather than refusing to link, so a
/// config that merely forward-declares `proxy.cluster` without it being
/// reachable still compiles.
pub fn register(registry: &mut HostRegistry<HostContext>, clusters: ClusterTable) {
    register_setup(registry);
    register_request_properties(registry);
    register_main_handlers(registry, clusters);
    registry.declare_return_builtin();
}

fn sig(params: Vec<Param>, return_type: LiteralType) -> Vec<BuiltinSignature> {
    vec![BuiltinSignature { params, return_type }]
}

fn req(ty: LiteralType) -> Vec<Param> {
    vec![Param::required(ty)]
}

// ---------------------------------------------------------------------
// Setup-only (spec §6 "Setup-only functions ... listen, ssl.listen,
// ssl.context, workers, mimetypes, tcp_cork, max_connections, resource
// limits, etc."). Each writes into `HostContext::config`, never into
// `HostContext::ctx` — there is no live request while `setup` runs.
// ---------------------------------------------------------------------

struct Listen;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Listen {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        let spec = params.get_string(0);
        let addr: SocketAddr = spec.parse().map_err(|_| RuntimeError::Builtin(format!("listen: '{spec}' is not a valid host:port address")))?;
        ctx.config.borrow_mut().listeners.push(addr);
        Ok(false)
    }
}

struct Workers;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Workers {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        ctx.config.borrow_mut().workers = params.get_int(0).max(1) as usize;
        Ok(false)
    }
}

struct Mimetypes;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Mimetypes {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        let path = params.get_string(0);
        let text = std::fs::read_to_string(path)?;
        ctx.config.borrow_mut().mimetypes.extend(parse_mimetypes(&text));
        Ok(false)
    }
}

struct TcpCork;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for TcpCork {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        ctx.config.borrow_mut().tcp_cork = params.get_bool(0);
        Ok(false)
    }
}

struct MaxConnections;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for MaxConnections {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        ctx.config.borrow_mut().max_connections = params.get_int(0).max(1) as usize;
        Ok(false)
    }
}

struct ErrorPage;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for ErrorPage {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        let status = params.get_int(0).clamp(100, 599) as u16;
        ctx.config.borrow_mut().error_pages.insert(status, params.get_string(1).to_string());
        Ok(false)
    }
}

struct ProxyPseudonym;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for ProxyPseudonym {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        ctx.config.borrow_mut().pseudonym = params.get_string(0).to_string();
        Ok(false)
    }
}

/// `sys.env("NAME")` (spec §4.6's own example of an IR-time [`Verifier`]):
/// resolvable at link time whenever the argument is a literal string, which
/// `register`'s caller wires up via `HostRegistry::with_verifier`.
struct SysEnv;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for SysEnv {
    async fn call(&self, params: Params<'_>, _ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::String(Rc::from(std::env::var(params.get_string(0)).unwrap_or_default())))
    }
}

fn register_setup(registry: &mut HostRegistry<HostContext>) {
    registry.handler("listen", sig(req(LiteralType::String), LiteralType::Void), Listen);
    registry.handler("workers", sig(req(LiteralType::Number), LiteralType::Void), Workers);
    registry.handler("mimetypes", sig(req(LiteralType::String), LiteralType::Void), Mimetypes);
    registry.handler("tcp_cork", sig(req(LiteralType::Boolean), LiteralType::Void), TcpCork);
    registry.handler("max_connections", sig(req(LiteralType::Number), LiteralType::Void), MaxConnections);
    registry.handler("errorpage", sig(vec![Param::required(LiteralType::Number), Param::required(LiteralType::String)], LiteralType::Void), ErrorPage);
    registry.handler("proxy.pseudonym", sig(req(LiteralType::String), LiteralType::Void), ProxyPseudonym);
    registry.function(
        "sys.env",
        sig(req(LiteralType::String), LiteralType::String),
        SysEnv,
    );
    registry.with_verifier(Arc::new(|args| match args.first() {
        Some(Some(LiteralValue::String(name))) => std::env::var(name).ok().map(LiteralValue::String),
        _ => None,
    }));
}

// ---------------------------------------------------------------------
// Request-time readable properties (spec §6). All pure functions over
// `HostContext::ctx`/`physical_file` — none of them suspend.
// ---------------------------------------------------------------------

macro_rules! string_prop {
    ($ty:ident, $body:expr) => {
        struct $ty;
        #[async_trait(?Send)]
        impl NativeFunction<HostContext> for $ty {
            async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
                let f: fn(Params<'_>, &HostContext) -> String = $body;
                Ok(flow_runtime::Value::String(Rc::from(f(params, ctx))))
            }
        }
    };
}

string_prop!(ReqMethod, |_p, c| c.ctx.request.method.as_str().to_string());
string_prop!(ReqPath, |_p, c| c.ctx.request.path().to_string());
string_prop!(ReqQuery, |_p, c| c.ctx.request.query().unwrap_or("").to_string());
string_prop!(ReqHost, |_p, c| c.ctx.request.host().unwrap_or("").to_string());
string_prop!(ReqPathinfo, |_p, c| c.ctx.path_info.clone());
string_prop!(ReqScheme, |_p, c| if c.ctx.request.secure { "https".to_string() } else { "http".to_string() });
string_prop!(ReqHeader, |p: Params<'_>, c: &HostContext| c.ctx.request.header(p.get_string(0)).unwrap_or("").to_string());
string_prop!(ReqCookie, |p: Params<'_>, c: &HostContext| c.ctx.request.cookie(p.get_string(0)).unwrap_or("").to_string());

struct ReqSecure;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for ReqSecure {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Bool(ctx.ctx.request.secure))
    }
}

struct ReqStatus;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for ReqStatus {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Number(ctx.ctx.response.status().map(|s| s.as_u16() as i64).unwrap_or(0)))
    }
}

struct ConnRemoteIp;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for ConnRemoteIp {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Ip(ctx.ctx.request.remote_ip()))
    }
}

struct ConnLocalIp;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for ConnLocalIp {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Ip(ctx.ctx.request.local_ip()))
    }
}

struct ConnRemotePort;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for ConnRemotePort {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Number(ctx.ctx.request.remote_addr.port() as i64))
    }
}

struct PhysExists;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for PhysExists {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Bool(ctx.ctx.physical_file.as_ref().is_some_and(PhysicalFile::exists)))
    }
}

struct PhysIsReg;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for PhysIsReg {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Bool(ctx.ctx.physical_file.as_ref().is_some_and(PhysicalFile::is_regular)))
    }
}

struct PhysIsDir;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for PhysIsDir {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Bool(ctx.ctx.physical_file.as_ref().is_some_and(PhysicalFile::is_directory)))
    }
}

struct PhysSize;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for PhysSize {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        Ok(flow_runtime::Value::Number(ctx.ctx.physical_file.as_ref().map(PhysicalFile::size).unwrap_or(0) as i64))
    }
}

string_prop!(PhysMimetype, |_p, c: &HostContext| c.ctx.physical_file.as_ref().and_then(PhysicalFile::mimetype).unwrap_or("").to_string());
string_prop!(PhysEtag, |_p, c: &HostContext| c.ctx.physical_file.as_ref().and_then(PhysicalFile::etag).unwrap_or_default());

struct RegexGroup;
#[async_trait(?Send)]
impl NativeFunction<HostContext> for RegexGroup {
    async fn call(&self, params: Params<'_>, _ctx: &mut HostContext) -> Result<flow_runtime::Value, RuntimeError> {
        let idx = params.get_int(0).max(0) as usize;
        Ok(flow_runtime::Value::String(Rc::from(params.group(idx).unwrap_or(""))))
    }
}

fn register_request_properties(registry: &mut HostRegistry<HostContext>) {
    registry.function("req.method", sig(vec![], LiteralType::String), ReqMethod);
    registry.function("req.path", sig(vec![], LiteralType::String), ReqPath);
    registry.function("req.query", sig(vec![], LiteralType::String), ReqQuery);
    registry.function("req.host", sig(vec![], LiteralType::String), ReqHost);
    registry.function("req.pathinfo", sig(vec![], LiteralType::String), ReqPathinfo);
    registry.function("req.scheme", sig(vec![], LiteralType::String), ReqScheme);
    registry.function("req.secure", sig(vec![], LiteralType::Boolean), ReqSecure);
    registry.function("req.status", sig(vec![], LiteralType::Number), ReqStatus);
    registry.function("req.header", sig(req(LiteralType::String), LiteralType::String), ReqHeader);
    registry.function("req.cookie", sig(req(LiteralType::String), LiteralType::String), ReqCookie);
    registry.function("connection.remote_ip", sig(vec![], LiteralType::IpAddress), ConnRemoteIp);
    registry.function("connection.local_ip", sig(vec![], LiteralType::IpAddress), ConnLocalIp);
    registry.function("connection.remote_port", sig(vec![], LiteralType::Number), ConnRemotePort);
    registry.function("phys.exists", sig(vec![], LiteralType::Boolean), PhysExists);
    registry.function("phys.is_reg", sig(vec![], LiteralType::Boolean), PhysIsReg);
    registry.function("phys.is_dir", sig(vec![], LiteralType::Boolean), PhysIsDir);
    registry.function("phys.size", sig(vec![], LiteralType::Number), PhysSize);
    registry.function("phys.mimetype", sig(vec![], LiteralType::String), PhysMimetype);
    registry.function("phys.etag", sig(vec![], LiteralType::String), PhysEtag);
    registry.function("regex.group", sig(req(LiteralType::Number), LiteralType::String), RegexGroup);
}

// ---------------------------------------------------------------------
// Main-time handlers (spec §6).
// ---------------------------------------------------------------------

struct Docroot;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Docroot {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        set_docroot_and_stat(ctx, params.get_string(0));
        Ok(false)
    }
}

struct Alias;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Alias {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        let prefix = params.get_string(0).to_string();
        let target = params.get_string(1).to_string();
        if ctx.ctx.current_path().starts_with(&prefix) {
            let suffix = ctx.ctx.current_path()[prefix.len()..].to_string();
            let docroot = format!("{target}{suffix}");
            set_docroot_and_stat(ctx, &docroot);
        }
        Ok(false)
    }
}

fn set_docroot_and_stat(ctx: &mut HostContext, docroot: &str) {
    ctx.ctx.set_document_root(docroot);
    let path = ctx.ctx.current_path().trim_start_matches('/').to_string();
    let full = std::path::Path::new(docroot).join(path);
    let mimetype = ctx.config.borrow().mimetype_for(&full);
    ctx.ctx.set_file(PhysicalFile::stat(full, Some(mimetype)));
}

struct Staticfile;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Staticfile {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        let Some(file) = ctx.ctx.physical_file.clone() else { return Ok(false) };
        if !file.is_regular() {
            return Ok(false);
        }
        let body = std::fs::read(file.path())?;
        ctx.ctx.response.set_status(StatusCode::OK);
        if let Some(mime) = file.mimetype() {
            if let Ok(value) = HeaderValue::from_str(mime) {
                ctx.ctx.response.set_header(http::header::CONTENT_TYPE, value);
            }
        }
        if let Some(etag) = file.etag() {
            if let Ok(value) = HeaderValue::from_str(&etag) {
                ctx.ctx.response.set_header(http::header::ETAG, value);
            }
        }
        ctx.ctx.response.write(body);
        ctx.ctx.response.complete();
        Ok(true)
    }
}

struct Redirect;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Redirect {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        let status = params.get_int(0).clamp(300, 399) as u16;
        let location = params.get_string(1).to_string();
        ctx.ctx.response.set_status(StatusCode::from_u16(status).unwrap_or(StatusCode::FOUND));
        if let Ok(value) = HeaderValue::from_str(&location) {
            ctx.ctx.response.set_header(http::header::LOCATION, value);
        }
        ctx.ctx.response.complete();
        Ok(true)
    }
}

struct Echo;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Echo {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        ctx.ctx.response.set_status_if_unset(StatusCode::OK);
        ctx.ctx.response.write(params.get_string(0));
        ctx.ctx.response.write("\n");
        Ok(false)
    }
}

struct Blank;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for Blank {
    async fn call(&self, _params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        ctx.ctx.response.set_status_if_unset(StatusCode::OK);
        ctx.ctx.response.complete();
        Ok(true)
    }
}

/// `proxy.cluster NAME[, PATH, BUCKET, BACKEND]` (spec §6, component O).
/// `PATH`/`BACKEND` aren't modeled by `x0_cluster::ClusterController` (it
/// has no per-request path rewrite or backend pinning beyond the
/// scheduler's own choice), so only `NAME` and `BUCKET` actually drive
/// behavior here; the other two are accepted (so configs that pass them
/// still type-check and link) and otherwise ignored.
struct ProxyCluster {
    clusters: ClusterTable,
}

#[async_trait(?Send)]
impl NativeHandler<HostContext> for ProxyCluster {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        let name = params.get_string(0).to_string();
        let bucket = if params.len() >= 3 { Some(params.get_string(2).to_string()) } else { None };
        let Some(controller) = self.clusters.get(&name).cloned() else {
            send_error(ctx, StatusCode::BAD_GATEWAY, None, None);
            return Ok(true);
        };

        let request = build_upstream_request(ctx);
        match controller.schedule(bucket.as_deref(), request).await {
            Ok(response) => {
                write_upstream_response(ctx, response);
            }
            Err(ClusterError::Unavailable { bucket, retry_after_secs }) => {
                send_error(ctx, StatusCode::SERVICE_UNAVAILABLE, retry_after_secs, Some(bucket));
            }
            Err(ClusterError::QueueTimeout { bucket }) => {
                send_error(ctx, StatusCode::GATEWAY_TIMEOUT, None, Some(bucket));
            }
            Err(ClusterError::RetryExhausted { .. }) => {
                send_error(ctx, StatusCode::SERVICE_UNAVAILABLE, None, None);
            }
            Err(other) => {
                tracing::warn!(error = %other, "proxy.cluster failed");
                send_error(ctx, StatusCode::BAD_GATEWAY, None, None);
            }
        }
        Ok(true)
    }
}

/// `proxy.http ADDR, PORT[, CONNECT_MS, READ_MS, WRITE_MS]` (spec §6):
/// forwards directly to one backend, bypassing the cluster's
/// shaper/scheduler/health-monitor entirely — a one-shot `Member` built for
/// the call and dropped afterward.
struct ProxyHttp;
#[async_trait(?Send)]
impl NativeHandler<HostContext> for ProxyHttp {
    async fn call(&self, params: Params<'_>, ctx: &mut HostContext) -> Result<bool, RuntimeError> {
        let ip = params.get_ip(0);
        let port = params.get_int(1);
        let connect_ms = if params.len() > 2 { params.get_int(2) } else { 4000 };
        let read_ms = if params.len() > 3 { params.get_int(3) } else { 30_000 };
        let write_ms = if params.len() > 4 { params.get_int(4) } else { 8_000 };

        let address = SocketAddr::new(ip, port.clamp(0, u16::MAX as i64) as u16);
        let pseudonym = ctx.config.borrow().pseudonym.clone();
        let member = Member::new(
            MemberConfig {
                name: format!("{address}"),
                address,
                capacity: 1,
                connect_timeout: Duration::from_millis(connect_ms.max(0) as u64),
                read_timeout: Duration::from_millis(read_ms.max(0) as u64),
                write_timeout: Duration::from_millis(write_ms.max(0) as u64),
            },
            HealthCheckConfig::default(),
        );

        let inbound_version = ctx.ctx.request.version;
        let request = build_upstream_request(ctx);
        match member.forward(&pseudonym, inbound_version, request).await {
            Ok(response) => write_upstream_response(ctx, response),
            Err(e) => {
                tracing::warn!(error = %e, %address, "proxy.http upstream request failed");
                send_error(ctx, StatusCode::BAD_GATEWAY, None, None);
            }
        }
        Ok(true)
    }
}

fn build_upstream_request(ctx: &HostContext) -> Request<Bytes> {
    let request = &ctx.ctx.request;
    let mut builder = Request::builder().method(request.method.clone()).uri(request.uri.clone()).version(request.version);
    for (name, value) in request.headers.iter() {
        builder = builder.header(name, value);
    }
    builder.body(request.body.clone()).expect("request parts were already a valid http::Request")
}

fn write_upstream_response(ctx: &mut HostContext, response: http::Response<Bytes>) {
    let (parts, body) = response.into_parts();
    ctx.ctx.response.set_status(parts.status);
    for (name, value) in parts.headers.iter() {
        ctx.ctx.response.set_header(name.clone(), value.clone());
    }
    ctx.ctx.response.write(body);
    ctx.ctx.response.complete();
}

/// Spec §6 "Error-page responses": a 503 carries `Retry-After` when
/// configured and `Cluster-Bucket` naming the bucket; 502/504 reuse the
/// same small textual body.
fn send_error(ctx: &mut HostContext, status: StatusCode, retry_after_secs: Option<u64>, bucket: Option<String>) {
    ctx.ctx.response.set_status(status);
    if let Some(secs) = retry_after_secs {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            ctx.ctx.response.set_header(http::header::RETRY_AFTER, value);
        }
    }
    if let Some(bucket) = bucket {
        if let Ok(value) = HeaderValue::from_str(&bucket) {
            ctx.ctx.response.set_header(HeaderName::from_static("cluster-bucket"), value);
        }
    }
    ctx.ctx.response.write(x0_context::Context::trivial_body(status));
    ctx.ctx.response.complete();
}

fn register_main_handlers(registry: &mut HostRegistry<HostContext>, clusters: ClusterTable) {
    registry.handler("docroot", sig(req(LiteralType::String), LiteralType::Void), Docroot);
    registry.handler("alias", sig(vec![Param::required(LiteralType::String), Param::required(LiteralType::String)], LiteralType::Void), Alias);
    registry.handler("staticfile", sig(vec![], LiteralType::Void), Staticfile);
    registry.handler("redirect", sig(vec![Param::required(LiteralType::Number), Param::required(LiteralType::String)], LiteralType::Void), Redirect);
    registry.handler("echo", sig(req(LiteralType::String), LiteralType::Void), Echo);
    registry.handler("blank", sig(vec![], LiteralType::Void), Blank);
    registry.handler(
        "proxy.cluster",
        sig(
            vec![Param::required(LiteralType::String), Param::defaulted(LiteralType::String), Param::defaulted(LiteralType::String), Param::defaulted(LiteralType::String)],
            LiteralType::Void,
        ),
        ProxyCluster { clusters },
    );
    registry.handler(
        "proxy.http",
        sig(
            vec![
                Param::required(LiteralType::IpAddress),
                Param::required(LiteralType::Number),
                Param::defaulted(LiteralType::Number),
                Param::defaulted(LiteralType::Number),
                Param::defaulted(LiteralType::Number),
            ],
            LiteralType::Void,
        ),
        ProxyHttp,
    );
}
