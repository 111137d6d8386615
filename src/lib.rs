//! fleetcron: a distributed cron coordination kernel.
//!
//! Guarantees exactly-once firing of recurring jobs across a fleet of
//! nodes sharing a distributed lease backend. This crate is a
//! coordination kernel, not a job executor — it decides *when* and on
//! *which node* a job's callback runs, and runs that callback directly;
//! it does not host a process, a CLI, or a downstream work queue.

pub mod audit;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod cron;
pub mod error;
pub mod keys;
pub mod lease;
pub mod logger;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod recovery;
pub mod registry;

pub use config::{Config, RecoveryConfig, WindowConfig};
pub use coordinator::Coordinator;
pub use cron::CronExpression;
pub use error::{Error, Result};
pub use registry::{Callback, CallbackFuture, CallbackResult, Firing, Job, JobRegistry};
