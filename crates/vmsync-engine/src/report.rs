//! Run summary

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use vmsync_types::InventoryDiff;

/// What the reconciler set out to do for one VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Create => write!(f, "create"),
            SyncAction::Update => write!(f, "update"),
            SyncAction::Delete => write!(f, "delete"),
        }
    }
}

/// How it went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Every mutation ended in a benign outcome
    Applied,
    /// Dry run: logged, nothing written
    Planned,
    /// Changed VM is not powered on
    SkippedPoweredOff,
    /// At least one mutation genuinely failed
    Failed,
}

/// Per-VM reconciliation report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectReport {
    pub hostname: String,
    pub action: SyncAction,
    pub status: ObjectStatus,

    /// Genuine mutation failures
    pub failures: Vec<String>,

    /// Omitted attributes and other non-fatal problems
    pub warnings: Vec<String>,
}

impl ObjectReport {
    pub fn new(hostname: impl Into<String>, action: SyncAction) -> Self {
        Self {
            hostname: hostname.into(),
            action,
            status: ObjectStatus::Applied,
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(hostname = %self.hostname, "{}", message);
        self.warnings.push(message);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(hostname = %self.hostname, "{}", message);
        self.failures.push(message);
        self.status = ObjectStatus::Failed;
    }
}

/// Result of one complete run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,

    /// VMs seen on each side
    pub source_count: usize,
    pub target_count: usize,

    pub added: BTreeSet<String>,
    pub changed: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub unchanged: usize,

    pub objects: Vec<ObjectReport>,
}

impl RunSummary {
    pub fn new(
        started_at: DateTime<Utc>,
        dry_run: bool,
        source_count: usize,
        target_count: usize,
        diff: &InventoryDiff<String>,
        objects: Vec<ObjectReport>,
    ) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            dry_run,
            source_count,
            target_count,
            added: diff.added.clone(),
            changed: diff.changed.clone(),
            removed: diff.removed.clone(),
            unchanged: diff.unchanged.len(),
            objects,
        }
    }

    pub fn is_in_sync(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ObjectReport> {
        self.objects
            .iter()
            .filter(|o| o.status == ObjectStatus::Failed)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ObjectReport> {
        self.objects
            .iter()
            .filter(|o| o.status == ObjectStatus::SkippedPoweredOff)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}
