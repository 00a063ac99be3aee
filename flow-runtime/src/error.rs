/// Errors a running handler can raise (spec §7 `RuntimeError`: "builtin-
/// signalled; e.g. filesystem"), plus the handful of conditions the
/// dispatch loop itself can hit (division by zero, a malformed cast).
/// Spec §7: "Exceptions bubbling out of a builtin are caught at the
/// dispatch loop boundary and converted to a 500 response" — `flow-runtime`
/// itself stops at producing this error; turning it into an HTTP response
/// is the host's job (`x0-context`/`x0d`).
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Raised by a native builtin's own body (e.g. a filesystem error inside
    /// `staticfile`).
    Builtin(String),
    DivisionByZero,
    InvalidCast { from: &'static str, to: &'static str, value: String },
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeError::Builtin(msg) => write!(f, "{msg}"),
            RuntimeError::DivisionByZero => write!(f, "division by zero"),
            RuntimeError::InvalidCast { from, to, value } => {
                write!(f, "cannot cast {from} '{value}' to {to}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<std::io::Error> for RuntimeError {
    fn from(e: std::io::Error) -> Self {
        RuntimeError::Builtin(e.to_string())
    }
}
