//! # queuectl-core
//!
//! The persistent job-lifecycle engine: the durable job/config model, the
//! atomic claim/lease protocol exposed as the [`Store`] trait, the
//! [`Executor`] that runs a job's shell command, the [`Worker`] loop that
//! ties claim to execution to finalize, the [`WorkerManager`] lifecycle,
//! and the scheduler ordering policy.
//!
//! This crate has no database driver of its own — `queuectl-store-sqlite`
//! is the concrete [`Store`] implementation. Keeping the driver out of this
//! crate is what lets the worker loop and the scheduler policy be unit
//! tested without a database (see `worker::tests` and `policy::tests`).

pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod manager;
pub mod policy;
pub mod store;
pub mod worker;

pub use config::ConfigSnapshot;
pub use error::QueuectlError;
pub use executor::{ExecutionOutcome, Executor};
pub use job::{Job, JobSpec, JobState};
pub use manager::{ManagerPaths, ManagerStatus, WorkerManager};
pub use store::Store;
pub use worker::Worker;
