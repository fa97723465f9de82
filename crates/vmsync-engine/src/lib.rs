//! vmsync Engine - Reconciles a CMDB against the live hypervisor inventory
//!
//! This crate provides:
//! - Layered configuration ([`SyncConfig`])
//! - A per-run attribute cache ([`AttributeResolver`])
//! - Bounded concurrent fetchers for both inventories
//! - The [`Reconciler`] that turns a diff into classified CMDB writes
//! - The [`RunController`] with its cheap-check fast path, run lock and dry run

#![deny(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod lock;
pub mod pool;
pub mod reconciler;
pub mod report;
pub mod resolver;
pub mod snapshot;
pub mod source;
pub mod target;

pub use config::{SiteTagRule, SyncConfig};
pub use controller::{RunController, RunOptions, RunOutcome, RunState};
pub use error::{SyncError, SyncResult};
pub use lock::RunLock;
pub use reconciler::Reconciler;
pub use report::{ObjectReport, ObjectStatus, RunSummary, SyncAction};
pub use resolver::{resolve_rt_attr, AttributeResolver};
pub use snapshot::SnapshotStore;
pub use source::SourceFetcher;
pub use target::TargetFetcher;
