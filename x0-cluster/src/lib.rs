//! HTTP cluster/load-balancer subsystem (spec components K-O).
//!
//! A host embeds this crate by loading a [`config::ClusterConfig`] (spec §6,
//! the `[director]`/`[bucket=NAME]`/`[backend=NAME]` INI format) and handing
//! it to [`controller::ClusterController::from_config`], then calling
//! [`controller::ClusterController::spawn_background_tasks`] once the
//! returned controller is wired into the rest of the server. Each inbound
//! request destined for a `proxy.cluster` builtin is then forwarded through
//! [`controller::ClusterController::schedule`].
//!
//! Deliberately independent of `x0-context`: this crate operates on raw
//! `http::Request<Bytes>`/`Response<Bytes>` rather than the Flow runtime's
//! `RequestView`, so it can be exercised and tested without a Flow program
//! in the loop at all.

mod bucket;
mod config;
mod controller;
mod error;
mod health;
mod member;
mod scheduler;

pub use bucket::{BucketId, Shaper};
pub use config::{BackendConfig, BucketConfig, ClusterConfig, DirectorConfig, parse as parse_config, render as render_config, save as save_config};
pub use controller::ClusterController;
pub use error::{ClusterError, UpstreamError};
pub use health::{HealthCheckConfig, HealthMonitor, HealthState, Transition, run_probe_loop};
pub use member::{Member, MemberConfig};
pub use scheduler::{Chance, MemberSnapshot, RoundRobin, ScheduleOutcome, Scheduler, by_name as scheduler_by_name};
