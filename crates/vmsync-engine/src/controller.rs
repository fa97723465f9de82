//! Run controller
//!
//! Drives one reconciliation pass:
//! `Init -> [CheapCheck ->] FetchSource -> FetchTarget -> Diff -> Reconcile -> Done`.
//! Fatal errors (lock held, connection, enumeration) end the run before any
//! CMDB write is attempted.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::lock::RunLock;
use crate::reconciler::Reconciler;
use crate::report::RunSummary;
use crate::resolver::AttributeResolver;
use crate::snapshot::SnapshotStore;
use crate::source::SourceFetcher;
use crate::target::TargetFetcher;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use vmsync_connectors::{Cmdb, Hypervisor};
use vmsync_types::InventoryDiff;

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Init,
    CheapCheck,
    FetchSource,
    FetchTarget,
    Diff,
    Reconcile,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::CheapCheck => "cheap_check",
            RunState::FetchSource => "fetch_source",
            RunState::FetchTarget => "fetch_target",
            RunState::Diff => "diff",
            RunState::Reconcile => "reconcile",
            RunState::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Per-invocation switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip the run when the set of VM ids matches the last snapshot
    pub simple_check: bool,

    /// Fetch and diff, log intended writes, write nothing
    pub dry_run: bool,
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The cheap check found the same VM set as last time
    Unchanged,
    Completed(RunSummary),
}

/// Orchestrates fetch, diff and reconcile
pub struct RunController {
    config: Arc<SyncConfig>,
    hypervisor: Arc<dyn Hypervisor>,
    cmdb: Arc<dyn Cmdb>,
    state: RunState,
}

impl RunController {
    pub fn new(config: SyncConfig, hypervisor: Arc<dyn Hypervisor>, cmdb: Arc<dyn Cmdb>) -> Self {
        Self {
            config: Arc::new(config),
            hypervisor,
            cmdb,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn enter(&mut self, state: RunState) {
        tracing::debug!(from = %self.state, to = %state, "Run state");
        self.state = state;
    }

    /// Execute one run.
    pub async fn run(&mut self, options: RunOptions) -> SyncResult<RunOutcome> {
        let started_at = Utc::now();
        self.state = RunState::Init;
        let _lock = RunLock::acquire(&self.config.run.lock_path)?;

        let source_fetcher = SourceFetcher::new(self.hypervisor.clone(), self.config.clone());
        let snapshot = SnapshotStore::new(&self.config.run.snapshot_path);

        let mut seen_ids = None;
        if options.simple_check {
            self.enter(RunState::CheapCheck);
            let ids = source_fetcher.list_ids().await?;
            if !snapshot.has_changed(&ids)? {
                tracing::info!(vms = ids.len(), "VM set unchanged since last run");
                self.enter(RunState::Done);
                return Ok(RunOutcome::Unchanged);
            }
            tracing::info!(vms = ids.len(), "VM set changed, running full sync");
            seen_ids = Some(ids);
        }

        self.enter(RunState::FetchSource);
        let source = source_fetcher.fetch().await?;

        self.enter(RunState::FetchTarget);
        let resolver = Arc::new(AttributeResolver::new(
            self.cmdb.clone(),
            self.config.cmdb.cluster_type_id,
            self.config.cmdb.os_chapter_id,
        ));
        let target = TargetFetcher::new(self.cmdb.clone(), resolver.clone(), self.config.clone())
            .fetch()
            .await?;

        self.enter(RunState::Diff);
        let diff = InventoryDiff::compute(&source.records, &target.records);
        tracing::info!(
            added = diff.added.len(),
            changed = diff.changed.len(),
            removed = diff.removed.len(),
            unchanged = diff.unchanged.len(),
            "Inventory diff"
        );

        self.enter(RunState::Reconcile);
        let reports = if diff.is_empty() {
            Vec::new()
        } else {
            resolver.prime().await?;
            Reconciler::new(
                self.cmdb.clone(),
                self.hypervisor.clone(),
                resolver,
                self.config.clone(),
                options.dry_run,
            )
            .apply(&diff, &source, &target)
            .await?
        };

        if let Some(ids) = seen_ids.filter(|_| !options.dry_run) {
            snapshot.save(&ids)?;
        }

        self.enter(RunState::Done);
        Ok(RunOutcome::Completed(RunSummary::new(
            started_at,
            options.dry_run,
            source.len(),
            target.len(),
            &diff,
            reports,
        )))
    }
}
