//! Top-level process error, aggregating every subsystem's error type for
//! the CLI's exit-code mapping (spec §6 "Exit codes: 0 success, 1
//! configuration failure, 2 runtime startup failure"). Hand-rolled, no
//! `thiserror`/`anyhow`, following `r2e_core::error::AppError`'s shape:
//! manual `Display`/`Debug`, `From` conversions via a small macro.

use std::fmt;

/// The two non-zero exit codes spec §6 defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Compiling the Flow source, parsing the cluster INI, or validating
    /// the CLI's own arguments failed before anything was bound or spawned.
    Configuration,
    /// Configuration was accepted but starting the runtime itself (binding
    /// a listener, spawning a worker) failed.
    RuntimeStartup,
}

impl ExitKind {
    pub fn code(self) -> i32 {
        match self {
            ExitKind::Configuration => 1,
            ExitKind::RuntimeStartup => 2,
        }
    }
}

#[derive(Debug)]
pub enum X0Error {
    /// Compiling/linking the Flow configuration failed (spec §7
    /// `LexError`/`ParseError`/`TypeError`/`LinkError`, already rendered by
    /// `flow_diagnostics::DiagnosticsReport` where available).
    Compile(String),
    /// The cluster's INI configuration was malformed or semantically
    /// invalid (spec §7 `ConfigurationError`).
    Cluster(x0_cluster::ClusterError),
    /// A file the CLI was told to read (the Flow source, the cluster INI)
    /// could not be read.
    Io(std::io::Error),
    /// A listener address could not be bound.
    Bind { addr: std::net::SocketAddr, source: std::io::Error },
    /// The configuration named no listen address at all (spec §7
    /// `ConfigurationError` "no listeners").
    NoListeners,
}

impl X0Error {
    /// Which of spec §6's two non-zero exit codes this failure maps to.
    pub fn exit_kind(&self) -> ExitKind {
        match self {
            X0Error::Compile(_) | X0Error::Cluster(_) | X0Error::Io(_) | X0Error::NoListeners => ExitKind::Configuration,
            X0Error::Bind { .. } => ExitKind::RuntimeStartup,
        }
    }
}

impl fmt::Display for X0Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X0Error::Compile(msg) => write!(f, "configuration error: {msg}"),
            X0Error::Cluster(e) => write!(f, "cluster configuration error: {e}"),
            X0Error::Io(e) => write!(f, "i/o error: {e}"),
            X0Error::Bind { addr, source } => write!(f, "failed to bind listener on {addr}: {source}"),
            X0Error::NoListeners => write!(f, "configuration declares no `listen` addresses"),
        }
    }
}

impl std::error::Error for X0Error {}

macro_rules! map_error {
    ( $( $err_ty:ty => $variant:ident ),* $(,)? ) => {
        $( impl From<$err_ty> for X0Error {
            fn from(err: $err_ty) -> Self { X0Error::$variant(err) }
        } )*
    };
}

map_error! {
    std::io::Error => Io,
    x0_cluster::ClusterError => Cluster,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_and_cluster_errors_map_to_configuration_exit_code() {
        assert_eq!(X0Error::Compile("bad".into()).exit_kind(), ExitKind::Configuration);
        assert_eq!(X0Error::NoListeners.exit_kind(), ExitKind::Configuration);
    }

    #[test]
    fn bind_failure_maps_to_runtime_startup_exit_code() {
        let err = X0Error::Bind { addr: "127.0.0.1:80".parse().unwrap(), source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use") };
        assert_eq!(err.exit_kind(), ExitKind::RuntimeStartup);
        assert_eq!(err.exit_kind().code(), 2);
    }
}
