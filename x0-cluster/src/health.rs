use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

/// Health monitor state machine (spec component N / §4.10): `Undefined` ->
/// `Offline` <-> `Online`, gated by a success threshold on the way up and a
/// single failure on the way down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Undefined,
    Offline,
    Online,
}

impl HealthState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => HealthState::Undefined,
            1 => HealthState::Offline,
            _ => HealthState::Online,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            HealthState::Undefined => 0,
            HealthState::Offline => 1,
            HealthState::Online => 2,
        }
    }
}

/// A state change the cluster controller needs to react to (spec §4.10 "On
/// transition, notify the cluster").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
}

/// Configuration for one member's periodic probe (spec §6 `[director]`
/// `health-check-*` fields, applied per-backend via
/// `health-check-interval`).
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub success_threshold: u32,
    pub host_header: String,
    pub request_path: String,
    pub success_codes: Vec<StatusCode>,
}

impl Default for HealthCheckConfig {
    /// Mirrors the teacher's own `Cluster` constructor defaults (spec's
    /// `original_source/src/xzero/http/cluster/Cluster.cc`: 10s interval,
    /// threshold 3, `Host: healthcheck`, path `/`, 2xx/redirect family as
    /// success codes).
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            success_threshold: 3,
            host_header: "healthcheck".to_string(),
            request_path: "/".to_string(),
            success_codes: vec![
                StatusCode::OK,
                StatusCode::NO_CONTENT,
                StatusCode::MOVED_PERMANENTLY,
                StatusCode::FOUND,
                StatusCode::TEMPORARY_REDIRECT,
                StatusCode::PERMANENT_REDIRECT,
            ],
        }
    }
}

/// Pure state machine, kept separate from the probe I/O loop below so the
/// monotonicity invariants in spec §8 ("Offline->Online requires exactly N
/// consecutive successes ... Online->Offline requires exactly one failure")
/// are unit-testable without a socket.
pub struct HealthMonitor {
    config: HealthCheckConfig,
    state: AtomicU8,
    consecutive_successes: AtomicU32,
}

impl HealthMonitor {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self { config, state: AtomicU8::new(HealthState::Undefined.as_u8()), consecutive_successes: AtomicU32::new(0) }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_online(&self) -> bool {
        self.state() == HealthState::Online
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Classifies one probe outcome and applies the spec §4.10 state
    /// machine, returning `Some(Transition)` only when the state actually
    /// changed.
    pub fn record(&self, status: Option<StatusCode>) -> Option<Transition> {
        let success = status.is_some_and(|s| self.config.success_codes.contains(&s));
        let from = self.state();

        if !success {
            self.consecutive_successes.store(0, Ordering::Release);
            return if from == HealthState::Online {
                self.state.store(HealthState::Offline.as_u8(), Ordering::Release);
                Some(Transition { from, to: HealthState::Offline })
            } else if from == HealthState::Undefined {
                self.state.store(HealthState::Offline.as_u8(), Ordering::Release);
                Some(Transition { from, to: HealthState::Offline })
            } else {
                None
            };
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;
        match from {
            HealthState::Online => None,
            _ if successes >= self.config.success_threshold => {
                self.state.store(HealthState::Online.as_u8(), Ordering::Release);
                Some(Transition { from, to: HealthState::Online })
            }
            _ => None,
        }
    }
}

/// Runs `monitor`'s probe loop against `host_header`/`addr` until
/// `client`'s connection is no longer reachable or the task is aborted
/// (spec §5 "health-monitor probes" is one of the named suspension
/// points). `on_transition` is invoked with the new state whenever
/// [`HealthMonitor::record`] reports one, so the caller (the cluster
/// controller) can resize the shaper / dequeue / apply sticky-offline mode
/// (spec §4.10, §4.11) without this loop needing to know about buckets or
/// members at all.
pub async fn run_probe_loop<F>(monitor: &HealthMonitor, addr: std::net::SocketAddr, mut on_transition: F)
where
    F: FnMut(Transition),
{
    let client: Client<HttpConnector, http_body_util::Full<Bytes>> = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
    let mut ticker = tokio::time::interval(monitor.config().interval.max(Duration::from_millis(1)));
    loop {
        ticker.tick().await;
        let status = probe_once(&client, addr, monitor.config()).await;
        if let Some(transition) = monitor.record(status) {
            tracing::info!(addr = %addr, from = ?transition.from, to = ?transition.to, "health monitor transition");
            on_transition(transition);
        }
    }
}

async fn probe_once(client: &Client<HttpConnector, http_body_util::Full<Bytes>>, addr: std::net::SocketAddr, config: &HealthCheckConfig) -> Option<StatusCode> {
    let uri: http::Uri = format!("http://{addr}{}", config.request_path).parse().ok()?;
    let request = Request::builder().method("GET").uri(uri).header("Host", &config.host_header).body(http_body_util::Full::new(Bytes::new())).ok()?;

    match tokio::time::timeout(Duration::from_secs(5), client.request(request)).await {
        Ok(Ok(resp)) => Some(resp.status()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(threshold: u32) -> HealthMonitor {
        HealthMonitor::new(HealthCheckConfig { success_threshold: threshold, ..HealthCheckConfig::default() })
    }

    #[test]
    fn undefined_goes_offline_on_first_failure() {
        let m = monitor(3);
        let t = m.record(None).unwrap();
        assert_eq!(t, Transition { from: HealthState::Undefined, to: HealthState::Offline });
    }

    #[test]
    fn undefined_goes_offline_on_first_probe_even_if_it_succeeds_but_threshold_is_not_met() {
        let m = monitor(3);
        assert!(m.record(Some(StatusCode::OK)).is_none());
        assert_eq!(m.state(), HealthState::Undefined);
    }

    #[test]
    fn requires_exactly_n_consecutive_successes_to_go_online() {
        let m = monitor(3);
        assert!(m.record(Some(StatusCode::OK)).is_none());
        assert!(m.record(Some(StatusCode::OK)).is_none());
        let t = m.record(Some(StatusCode::OK)).unwrap();
        assert_eq!(t, Transition { from: HealthState::Undefined, to: HealthState::Online });
    }

    #[test]
    fn a_single_failure_resets_the_consecutive_success_streak() {
        let m = monitor(3);
        m.record(Some(StatusCode::OK));
        m.record(Some(StatusCode::OK));
        m.record(None);
        assert!(m.record(Some(StatusCode::OK)).is_none());
        assert!(m.record(Some(StatusCode::OK)).is_none());
        assert!(m.record(Some(StatusCode::OK)).is_some());
    }

    #[test]
    fn online_goes_offline_immediately_on_any_failure() {
        let m = monitor(1);
        m.record(Some(StatusCode::OK));
        assert_eq!(m.state(), HealthState::Online);
        let t = m.record(None).unwrap();
        assert_eq!(t, Transition { from: HealthState::Online, to: HealthState::Offline });
    }

    #[test]
    fn online_stays_online_on_further_successes_without_spurious_transitions() {
        let m = monitor(1);
        assert!(m.record(Some(StatusCode::OK)).is_some());
        assert!(m.record(Some(StatusCode::OK)).is_none());
        assert!(m.record(Some(StatusCode::OK)).is_none());
    }

    #[test]
    fn a_non_success_status_code_counts_as_a_failure() {
        let m = monitor(1);
        m.record(Some(StatusCode::OK));
        let t = m.record(Some(StatusCode::INTERNAL_SERVER_ERROR)).unwrap();
        assert_eq!(t.to, HealthState::Offline);
    }
}
