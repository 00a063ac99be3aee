use std::fmt;

/// Failure kinds raised by the cluster subsystem (spec §7: `UpstreamError`,
/// `QueueTimeout`, `RetryExhausted`, `ConfigurationError`).
#[derive(Debug)]
pub enum ClusterError {
    /// No member could accept the request right now (spec §4.11 "Not-enabled
    /// -> immediate ServiceUnavailable" and "non-Success ... produce 503").
    Unavailable { bucket: String, retry_after_secs: Option<u64> },
    /// The request sat in a bucket's FIFO past its queue-timeout (spec §4.7,
    /// §8 scenario 5).
    QueueTimeout { bucket: String },
    /// `max_retry_count` upstream attempts were exhausted (spec §4.11).
    RetryExhausted { tries: u32 },
    /// Connect/read/write failure or timeout talking to a member (spec
    /// §4.9).
    Upstream(UpstreamError),
    /// The cluster's INI configuration is malformed or semantically invalid
    /// (spec §7 "no listeners, SSL without contexts, empty docroot" is the
    /// Flow-config analogue; here: unknown section, bad numeric field, a
    /// bucket referencing an unknown parent, a backend referencing an
    /// unknown bucket).
    Configuration(String),
    /// Atomic config write-back failed (temp-file write or rename).
    Io(std::io::Error),
}

#[derive(Debug)]
pub enum UpstreamError {
    Connect(String),
    ConnectTimeout,
    ReadTimeout,
    WriteTimeout,
    ClosedBeforeHeaders,
    Protocol(String),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { bucket, retry_after_secs: Some(s) } => {
                write!(f, "cluster bucket '{bucket}' unavailable, retry after {s}s")
            }
            Self::Unavailable { bucket, retry_after_secs: None } => {
                write!(f, "cluster bucket '{bucket}' unavailable")
            }
            Self::QueueTimeout { bucket } => write!(f, "queue timeout in bucket '{bucket}'"),
            Self::RetryExhausted { tries } => write!(f, "retry budget exhausted after {tries} attempts"),
            Self::Upstream(e) => write!(f, "upstream error: {e}"),
            Self::Configuration(msg) => write!(f, "cluster configuration error: {msg}"),
            Self::Io(e) => write!(f, "cluster config i/o error: {e}"),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "connect failed: {msg}"),
            Self::ConnectTimeout => write!(f, "connect timed out"),
            Self::ReadTimeout => write!(f, "read timed out"),
            Self::WriteTimeout => write!(f, "write timed out"),
            Self::ClosedBeforeHeaders => write!(f, "upstream closed before sending headers"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for ClusterError {}
impl std::error::Error for UpstreamError {}

impl From<UpstreamError> for ClusterError {
    fn from(e: UpstreamError) -> Self {
        Self::Upstream(e)
    }
}

impl From<std::io::Error> for ClusterError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
