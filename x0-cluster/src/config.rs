use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::ClusterError;

/// `[director]` section (spec §6). Defaults mirror the teacher's own
/// `Cluster` constructor defaults in
/// `original_source/src/xzero/http/cluster/Cluster.cc`.
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    pub enabled: bool,
    pub queue_limit: usize,
    pub queue_timeout: Duration,
    pub retry_after: Option<Duration>,
    pub max_retry_count: u32,
    pub sticky_offline_mode: bool,
    pub allow_x_sendfile: bool,
    pub enqueue_on_unavailable: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub health_check_interval: Duration,
    pub health_check_success_threshold: u32,
    pub health_check_host_header: String,
    pub health_check_request_path: String,
    pub scheduler: String,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_limit: 1000,
            queue_timeout: Duration::from_secs(30),
            retry_after: Some(Duration::from_secs(30)),
            max_retry_count: 3,
            sticky_offline_mode: false,
            allow_x_sendfile: true,
            enqueue_on_unavailable: true,
            connect_timeout: Duration::from_secs(4),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(8),
            health_check_interval: Duration::from_secs(10),
            health_check_success_threshold: 3,
            health_check_host_header: "healthcheck".to_string(),
            health_check_request_path: "/".to_string(),
            scheduler: "round-robin".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BucketConfig {
    pub name: String,
    pub parent: Option<String>,
    pub rate: f64,
    pub ceil: f64,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub name: String,
    pub capacity: u32,
    pub enabled: bool,
    pub protocol: String,
    pub health_check_interval: Duration,
    pub host: IpAddr,
    pub port: u16,
}

impl BackendConfig {
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    pub director: DirectorConfig,
    pub buckets: Vec<BucketConfig>,
    pub backends: Vec<BackendConfig>,
}

/// Loads a cluster's persisted INI configuration (spec §6 "Cluster
/// configuration (INI, persisted)"). Hand-rolled rather than a registry
/// crate dependency, matching the teacher's own `IniFile` (no external INI
/// parser in `original_source` either) and keeping this crate's dependency
/// set limited to what spec component O actually needs.
pub fn parse(text: &str) -> Result<ClusterConfig, ClusterError> {
    let mut director = DirectorConfig::default();
    let mut buckets = Vec::new();
    let mut backends = Vec::new();

    let mut section: Option<(String, Option<String>)> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    let flush = |section: &Option<(String, Option<String>)>, fields: &HashMap<String, String>, director: &mut DirectorConfig, buckets: &mut Vec<BucketConfig>, backends: &mut Vec<BackendConfig>| -> Result<(), ClusterError> {
        let Some((kind, name)) = section else { return Ok(()) };
        match kind.as_str() {
            "director" => apply_director(director, fields)?,
            "bucket" => buckets.push(parse_bucket(name.as_deref().ok_or_else(|| ClusterError::Configuration("[bucket] section requires a name".into()))?, fields)?),
            "backend" => backends.push(parse_backend(name.as_deref().ok_or_else(|| ClusterError::Configuration("[backend] section requires a name".into()))?, fields)?),
            other => return Err(ClusterError::Configuration(format!("unknown section '[{other}]'"))),
        }
        Ok(())
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            flush(&section, &fields, &mut director, &mut buckets, &mut backends)?;
            fields.clear();
            section = Some(match header.split_once('=') {
                Some((kind, name)) => (kind.trim().to_string(), Some(name.trim().to_string())),
                None => (header.trim().to_string(), None),
            });
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ClusterError::Configuration(format!("malformed line '{raw_line}'")));
        };
        fields.insert(key.trim().to_string(), value.trim().to_string());
    }
    flush(&section, &fields, &mut director, &mut buckets, &mut backends)?;

    Ok(ClusterConfig { director, buckets, backends })
}

fn field<'a>(fields: &'a HashMap<String, String>, key: &str) -> Result<&'a str, ClusterError> {
    fields.get(key).map(String::as_str).ok_or_else(|| ClusterError::Configuration(format!("missing field '{key}'")))
}

fn parse_bool(value: &str) -> bool {
    value == "true"
}

fn parse_millis(fields: &HashMap<String, String>, key: &str) -> Result<Duration, ClusterError> {
    let raw = field(fields, key)?;
    raw.parse::<u64>().map(Duration::from_millis).map_err(|_| ClusterError::Configuration(format!("field '{key}' is not a number: '{raw}'")))
}

fn parse_secs(fields: &HashMap<String, String>, key: &str) -> Result<Duration, ClusterError> {
    let raw = field(fields, key)?;
    raw.parse::<u64>().map(Duration::from_secs).map_err(|_| ClusterError::Configuration(format!("field '{key}' is not a number: '{raw}'")))
}

fn apply_director(director: &mut DirectorConfig, fields: &HashMap<String, String>) -> Result<(), ClusterError> {
    director.enabled = parse_bool(field(fields, "enabled")?);
    director.queue_limit = field(fields, "queue-limit")?.parse().map_err(|_| ClusterError::Configuration("director.queue-limit is not a number".into()))?;
    director.queue_timeout = parse_millis(fields, "queue-timeout")?;
    director.retry_after = Some(parse_secs(fields, "retry-after")?);
    director.max_retry_count = field(fields, "max-retry-count")?.parse().map_err(|_| ClusterError::Configuration("director.max-retry-count is not a number".into()))?;
    director.sticky_offline_mode = parse_bool(field(fields, "sticky-offline-mode")?);
    director.allow_x_sendfile = parse_bool(field(fields, "allow-x-sendfile")?);
    director.enqueue_on_unavailable = parse_bool(field(fields, "enqueue-on-unavailable")?);
    director.connect_timeout = parse_millis(fields, "connect-timeout")?;
    director.read_timeout = parse_millis(fields, "read-timeout")?;
    director.write_timeout = parse_millis(fields, "write-timeout")?;
    if let Some(raw) = fields.get("health-check-success-threshold") {
        director.health_check_success_threshold = raw.parse().map_err(|_| ClusterError::Configuration("director.health-check-success-threshold is not a number".into()))?;
    }
    if let Some(host) = fields.get("health-check-host-header") {
        director.health_check_host_header = host.clone();
    }
    if let Some(path) = fields.get("health-check-request-path") {
        director.health_check_request_path = path.clone();
    }
    if let Some(name) = fields.get("scheduler") {
        director.scheduler = name.clone();
    }
    Ok(())
}

fn parse_bucket(name: &str, fields: &HashMap<String, String>) -> Result<BucketConfig, ClusterError> {
    let rate = field(fields, "rate")?.parse().map_err(|_| ClusterError::Configuration(format!("bucket '{name}' rate is not a number")))?;
    let ceil = field(fields, "ceil")?.parse().map_err(|_| ClusterError::Configuration(format!("bucket '{name}' ceil is not a number")))?;
    let parent = fields.get("parent").cloned();
    Ok(BucketConfig { name: name.to_string(), parent, rate, ceil })
}

fn parse_backend(name: &str, fields: &HashMap<String, String>) -> Result<BackendConfig, ClusterError> {
    let capacity = field(fields, "capacity")?.parse().map_err(|_| ClusterError::Configuration(format!("backend '{name}' capacity is not a number")))?;
    let enabled = parse_bool(field(fields, "enabled")?);
    let protocol = field(fields, "protocol")?.to_string();
    let health_check_interval = parse_millis(fields, "health-check-interval")?;
    let host: IpAddr = field(fields, "host")?.parse().map_err(|_| ClusterError::Configuration(format!("backend '{name}' host is not an IP address")))?;
    let port: u16 = field(fields, "port")?.parse().map_err(|_| ClusterError::Configuration(format!("backend '{name}' port is not a number")))?;
    Ok(BackendConfig { name: name.to_string(), capacity, enabled, protocol, health_check_interval, host, port })
}

/// Renders a [`ClusterConfig`] back to its INI form (spec §6 "Rewritten on
/// change with atomic replace"), grounded on `Cluster::configuration()`'s
/// own field order in `original_source/src/xzero/http/cluster/Cluster.cc`.
pub fn render(name: &str, config: &ClusterConfig) -> String {
    let d = &config.director;
    let mut out = String::new();
    out.push_str("# vim:syntax=dosini\n");
    out.push_str(&format!("# generated automatically for cluster '{name}' — do not edit by hand\n\n"));
    out.push_str("[director]\n");
    out.push_str(&format!("enabled={}\n", d.enabled));
    out.push_str(&format!("queue-limit={}\n", d.queue_limit));
    out.push_str(&format!("queue-timeout={}\n", d.queue_timeout.as_millis()));
    out.push_str(&format!("retry-after={}\n", d.retry_after.unwrap_or_default().as_secs()));
    out.push_str(&format!("max-retry-count={}\n", d.max_retry_count));
    out.push_str(&format!("sticky-offline-mode={}\n", d.sticky_offline_mode));
    out.push_str(&format!("allow-x-sendfile={}\n", d.allow_x_sendfile));
    out.push_str(&format!("enqueue-on-unavailable={}\n", d.enqueue_on_unavailable));
    out.push_str(&format!("connect-timeout={}\n", d.connect_timeout.as_millis()));
    out.push_str(&format!("read-timeout={}\n", d.read_timeout.as_millis()));
    out.push_str(&format!("write-timeout={}\n", d.write_timeout.as_millis()));
    out.push_str(&format!("health-check-success-threshold={}\n", d.health_check_success_threshold));
    out.push_str(&format!("health-check-host-header={}\n", d.health_check_host_header));
    out.push_str(&format!("health-check-request-path={}\n", d.health_check_request_path));
    out.push_str(&format!("scheduler={}\n\n", d.scheduler));

    for bucket in &config.buckets {
        out.push_str(&format!("[bucket={}]\n", bucket.name));
        out.push_str(&format!("rate={}\n", bucket.rate));
        out.push_str(&format!("ceil={}\n\n", bucket.ceil));
    }

    for backend in &config.backends {
        out.push_str(&format!("[backend={}]\n", backend.name));
        out.push_str(&format!("capacity={}\n", backend.capacity));
        out.push_str(&format!("enabled={}\n", backend.enabled));
        out.push_str(&format!("protocol={}\n", backend.protocol));
        out.push_str(&format!("health-check-interval={}\n", backend.health_check_interval.as_millis()));
        out.push_str(&format!("host={}\n", backend.host));
        out.push_str(&format!("port={}\n\n", backend.port));
    }

    out
}

/// Atomically replaces `path`'s contents with `config`'s rendering (spec §5
/// "Configuration file writes are atomic-replace (write to temp, rename)").
pub fn save(path: &Path, name: &str, config: &ClusterConfig) -> Result<(), ClusterError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, render(name, config))?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[director]
enabled=true
queue-limit=500
queue-timeout=2000
retry-after=5
max-retry-count=2
sticky-offline-mode=false
allow-x-sendfile=true
enqueue-on-unavailable=false
connect-timeout=1000
read-timeout=5000
write-timeout=3000
health-check-success-threshold=2
health-check-host-header=probe
health-check-request-path=/health
scheduler=chance

[bucket=root.a]
rate=0.5
ceil=0.8

[backend=web1]
capacity=10
enabled=true
protocol=http
health-check-interval=5000
host=127.0.0.1
port=8081
"#;

    #[test]
    fn parses_every_section_kind() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.director.queue_limit, 500);
        assert_eq!(config.director.scheduler, "chance");
        assert!(!config.director.enqueue_on_unavailable);
        assert_eq!(config.buckets.len(), 1);
        assert_eq!(config.buckets[0].name, "root.a");
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].address(), "127.0.0.1:8081".parse().unwrap());
    }

    #[test]
    fn round_trips_through_render_and_reparse() {
        let config = parse(SAMPLE).unwrap();
        let rendered = render("cluster1", &config);
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(reparsed.director.queue_limit, config.director.queue_limit);
        assert_eq!(reparsed.director.scheduler, config.director.scheduler);
        assert_eq!(reparsed.buckets.len(), config.buckets.len());
        assert_eq!(reparsed.backends[0].address(), config.backends[0].address());
    }

    #[test]
    fn an_unknown_section_is_a_configuration_error() {
        let err = parse("[cache]\nenabled=true\n").unwrap_err();
        assert!(matches!(err, ClusterError::Configuration(_)));
    }

    #[test]
    fn saving_and_reloading_round_trips_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster1.conf");
        let config = parse(SAMPLE).unwrap();
        save(&path, "cluster1", &config).unwrap();
        let reloaded = parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded.backends.len(), 1);
        assert!(!path.with_extension("tmp").exists());
    }
}
