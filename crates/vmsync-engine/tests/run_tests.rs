//! End-to-end runs against the in-memory backends.

use std::sync::Arc;
use tempfile::TempDir;
use vmsync_connectors::{
    vm_detail, InMemoryCmdb, InMemoryHypervisor, Ipv4Binding, MutationKind, MutationOutcome,
    PowerState,
};
use vmsync_engine::{
    ObjectStatus, RunController, RunLock, RunOptions, RunOutcome, RunState, RunSummary,
    SyncConfig, SyncError,
};
use vmsync_types::{GuestNic, ObjectId, VmId};

// =============================================================================
// Test Harness
// =============================================================================

struct Harness {
    hv: Arc<InMemoryHypervisor>,
    cmdb: Arc<InMemoryCmdb>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let cmdb = InMemoryCmdb::new()
            .with_dictionary_attribute(4, "SW type", 13)
            .with_attribute(10018, "CPU cores, No.")
            .with_attribute(10019, "Datastore");
        cmdb.set_chapter(13, &[(1701, "RHEL V6"), (1702, "Windows Server 2012")]);
        cmdb.seed_object("SYD2 Prod AMD", 1505);
        cmdb.seed_object("BNE2 Prod", 1505);

        Self {
            hv: Arc::new(InMemoryHypervisor::new()),
            cmdb: Arc::new(cmdb),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::default_values();
        config.run.lock_path = self.dir.path().join("vmsync.lock");
        config.run.snapshot_path = self.dir.path().join("vms.json");
        config
    }

    fn controller(&self) -> RunController {
        RunController::new(self.config(), self.hv.clone(), self.cmdb.clone())
    }

    /// Full sync limited to the named source clusters.
    async fn sync_clusters(&self, clusters: &[&str]) -> RunSummary {
        let mut config = self.config();
        config.fetch.clusters = clusters.iter().map(|c| c.to_string()).collect();
        let mut controller = RunController::new(config, self.hv.clone(), self.cmdb.clone());
        completed(controller.run(RunOptions::default()).await.unwrap())
    }

    fn cluster(&self, name: &str) -> ObjectId {
        self.cmdb.find_by_name(name).unwrap()
    }

    async fn run(&self, options: RunOptions) -> RunOutcome {
        self.controller().run(options).await.unwrap()
    }

    async fn sync(&self) -> RunSummary {
        completed(self.run(RunOptions::default()).await)
    }

    fn add_fleet(&self) {
        self.hv.add_vm(
            "SYD2 Prod AMD",
            vm_detail(
                "vm-1",
                "web01",
                "RHEL_6_64",
                2,
                vec![GuestNic::new(Some("4000"), &["10.0.0.1"])],
            ),
        );
        self.hv.add_vm(
            "SYD2 Prod AMD",
            vm_detail("vm-2", "web02", "RHEL_6_64", 2, vec![]),
        );
        self.hv.add_vm(
            "BNE2 Prod",
            vm_detail("vm-3", "db01", "WINDOWS_8_SERVER_64", 8, vec![]),
        );
    }
}

fn binding(ip: &str, osif: &str) -> Ipv4Binding {
    Ipv4Binding {
        ip: ip.to_string(),
        osif: osif.to_string(),
    }
}

fn completed(outcome: RunOutcome) -> RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::Unchanged => panic!("expected a completed run"),
    }
}

fn dry_run() -> RunOptions {
    RunOptions {
        dry_run: true,
        ..Default::default()
    }
}

fn simple() -> RunOptions {
    RunOptions {
        simple_check: true,
        ..Default::default()
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let h = Harness::new();
    h.add_fleet();

    let first = h.sync().await;
    assert_eq!(first.added.len(), 3);
    assert!(!first.has_failures());

    let writes = h.cmdb.mutation_count();
    let second = h.sync().await;
    assert!(second.is_in_sync(), "second run diff: {:?}", second);
    assert_eq!(second.unchanged, 3);
    assert_eq!(h.cmdb.mutation_count(), writes);
}

#[tokio::test]
async fn test_created_objects_carry_site_tags_and_cluster() {
    let h = Harness::new();
    h.add_fleet();
    h.sync().await;

    let web01 = h.cmdb.find_by_name("web01").unwrap();
    let db01 = h.cmdb.find_by_name("db01").unwrap();
    assert_eq!(h.cmdb.tags_of(web01), vec!["Global Switch"]);
    assert_eq!(h.cmdb.tags_of(db01), vec!["Eagle Farm"]);
    assert_eq!(h.cmdb.container_of(db01), h.cmdb.find_by_name("BNE2 Prod"));
    assert_eq!(h.cmdb.attribute_of(db01, 4).as_deref(), Some("1702"));
}

#[tokio::test]
async fn test_interface_labels_reach_the_cmdb() {
    let h = Harness::new();
    h.hv.add_vm(
        "SYD2 Prod AMD",
        vm_detail(
            "vm-1",
            "web01",
            "RHEL_6_64",
            2,
            vec![
                GuestNic::new(Some("4000"), &["10.0.0.1"]),
                GuestNic::new(Some("4001"), &["10.0.1.1", "10.0.1.2"]),
            ],
        ),
    );
    h.sync().await;

    let adds: Vec<_> = h.cmdb.calls_of(MutationKind::AddAddress);
    assert_eq!(adds.len(), 3);
    assert!(h.sync().await.is_in_sync());
}

#[tokio::test]
async fn test_single_field_change_updates_only_that_vm() {
    let h = Harness::new();
    h.add_fleet();
    h.sync().await;

    h.hv.remove_vm(&VmId::new("vm-2"));
    h.hv.add_vm(
        "SYD2 Prod AMD",
        vm_detail("vm-2", "web02", "RHEL_6_64", 4, vec![]),
    );

    let summary = h.sync().await;
    assert!(summary.added.is_empty());
    assert!(summary.removed.is_empty());
    assert_eq!(summary.changed.len(), 1);
    assert!(summary.changed.contains("web02"));

    let web02 = h.cmdb.find_by_name("web02").unwrap();
    assert_eq!(h.cmdb.attribute_of(web02, 10018).as_deref(), Some("4"));
    assert!(h.sync().await.is_in_sync());
}

#[tokio::test]
async fn test_benign_duplicate_still_updates_attributes() {
    let h = Harness::new();
    h.hv.add_vm(
        "SYD2 Prod AMD",
        vm_detail("vm-1", "web01", "RHEL_6_64", 2, vec![]),
    );
    h.cmdb.duplicate_on_create("web01");

    let summary = h.sync().await;
    assert_eq!(summary.objects[0].status, ObjectStatus::Applied);

    let web01 = h.cmdb.find_by_name("web01").unwrap();
    assert_eq!(h.cmdb.calls_of(MutationKind::EditObject).len(), 1);
    assert_eq!(h.cmdb.attribute_of(web01, 10018).as_deref(), Some("2"));
}

#[tokio::test]
async fn test_removed_vm_gets_exactly_one_delete() {
    let h = Harness::new();
    h.cmdb.seed_object("vm1", 1504);

    let summary = h.sync().await;
    assert_eq!(summary.removed.len(), 1);
    assert!(summary.removed.contains("vm1"));
    assert_eq!(h.cmdb.calls_of(MutationKind::DeleteObject).len(), 1);
    assert_eq!(h.cmdb.mutation_count(), 1);
    assert_eq!(h.cmdb.find_by_name("vm1"), None);
}

#[tokio::test]
async fn test_powered_off_changed_vm_is_skipped() {
    let h = Harness::new();
    h.add_fleet();
    h.sync().await;

    h.hv.remove_vm(&VmId::new("vm-1"));
    h.hv.add_vm(
        "SYD2 Prod AMD",
        vm_detail("vm-1", "web01", "RHEL_6_64", 16, vec![]),
    );
    h.hv.set_power_state(&VmId::new("vm-1"), PowerState::PoweredOff);
    let writes = h.cmdb.mutation_count();

    let summary = h.sync().await;
    assert!(summary.changed.contains("web01"));
    assert_eq!(summary.skipped().count(), 1);
    assert_eq!(h.cmdb.mutation_count(), writes);
}

#[tokio::test]
async fn test_object_failure_does_not_block_the_batch() {
    let h = Harness::new();
    h.add_fleet();
    h.cmdb.fail_mutations_for("web01");

    let summary = h.sync().await;
    let failed: Vec<_> = summary.failed().map(|o| o.hostname.as_str()).collect();
    assert_eq!(failed, vec!["web01"]);
    assert!(h.cmdb.find_by_name("web02").is_some());
    assert!(h.cmdb.find_by_name("db01").is_some());
}

#[tokio::test]
async fn test_changed_address_replaces_the_old_binding() {
    let h = Harness::new();
    h.add_fleet();
    h.sync().await;
    let adds = h.cmdb.calls_of(MutationKind::AddAddress).len();

    h.hv.remove_vm(&VmId::new("vm-1"));
    h.hv.add_vm(
        "SYD2 Prod AMD",
        vm_detail(
            "vm-1",
            "web01",
            "RHEL_6_64",
            2,
            vec![GuestNic::new(Some("4000"), &["10.0.0.9"])],
        ),
    );

    let summary = h.sync().await;
    assert_eq!(summary.changed.len(), 1);
    assert!(summary.changed.contains("web01"));

    let removes = h.cmdb.calls_of(MutationKind::RemoveAddress);
    assert_eq!(removes.len(), 1);
    assert_eq!(removes[0].object, "web01");
    assert_eq!(removes[0].outcome, MutationOutcome::Success);
    assert_eq!(h.cmdb.calls_of(MutationKind::AddAddress).len(), adds + 1);

    let web01 = h.cmdb.find_by_name("web01").unwrap();
    assert_eq!(h.cmdb.addresses_of(web01), vec![binding("10.0.0.9", "eth0")]);
    assert!(h.sync().await.is_in_sync());
}

#[tokio::test]
async fn test_bindings_sharing_an_interface_are_all_replaced() {
    let h = Harness::new();
    h.add_fleet();
    h.sync().await;

    // Two bindings on one interface collapse to one entry in the record.
    let web01 = h.cmdb.find_by_name("web01").unwrap();
    h.cmdb.seed_address(web01, "10.0.0.5", "eth0");

    let summary = h.sync().await;
    assert!(summary.changed.contains("web01"));
    assert_eq!(h.cmdb.calls_of(MutationKind::RemoveAddress).len(), 2);
    assert_eq!(h.cmdb.addresses_of(web01), vec![binding("10.0.0.1", "eth0")]);
    assert!(h.sync().await.is_in_sync());
}

#[tokio::test]
async fn test_vm_moved_cluster_is_relinked() {
    let h = Harness::new();
    h.add_fleet();
    h.sync().await;

    h.hv.remove_vm(&VmId::new("vm-2"));
    h.hv.add_vm(
        "BNE2 Prod",
        vm_detail("vm-2", "web02", "RHEL_6_64", 2, vec![]),
    );

    let summary = h.sync().await;
    assert!(summary.changed.contains("web02"));
    assert!(!summary.has_failures());

    let web02 = h.cmdb.find_by_name("web02").unwrap();
    assert_eq!(h.cmdb.containers_of(web02), vec![h.cluster("BNE2 Prod")]);
    assert_eq!(h.cmdb.calls_of(MutationKind::UnlinkEntities).len(), 1);
    assert_eq!(h.cmdb.tags_of(web02), vec!["Eagle Farm"]);
    assert!(h.sync().await.is_in_sync());
}

#[tokio::test]
async fn test_cluster_filter_never_deletes_other_clusters() {
    let h = Harness::new();
    h.add_fleet();
    h.sync().await;

    let summary = h.sync_clusters(&["SYD2 Prod AMD"]).await;
    assert!(summary.removed.is_empty());
    assert!(summary.is_in_sync());
    assert_eq!(summary.unchanged, 2);
    assert!(h.cmdb.calls_of(MutationKind::DeleteObject).is_empty());
    assert!(h.cmdb.find_by_name("db01").is_some());
}

#[tokio::test]
async fn test_duplicate_create_strips_stale_bindings_and_links() {
    let h = Harness::new();
    h.hv.add_vm(
        "SYD2 Prod AMD",
        vm_detail(
            "vm-1",
            "web01",
            "RHEL_6_64",
            2,
            vec![GuestNic::new(Some("4000"), &["10.0.0.1"])],
        ),
    );

    // Already in the CMDB, but under a cluster outside the filter, so the
    // create reports a duplicate.
    let stale = h.cmdb.seed_object("web01", 1504);
    h.cmdb.seed_link(stale, h.cluster("BNE2 Prod"));
    h.cmdb.seed_address(stale, "10.9.9.9", "eth0");

    let summary = h.sync_clusters(&["SYD2 Prod AMD"]).await;
    assert!(summary.added.contains("web01"));
    assert_eq!(summary.objects[0].status, ObjectStatus::Applied);

    let creates = h.cmdb.calls_of(MutationKind::CreateObject);
    assert_eq!(creates[0].outcome, MutationOutcome::AlreadyExists);
    let removes = h.cmdb.calls_of(MutationKind::RemoveAddress);
    assert_eq!(removes.len(), 1);
    assert_eq!(removes[0].outcome, MutationOutcome::Success);

    assert_eq!(h.cmdb.addresses_of(stale), vec![binding("10.0.0.1", "eth0")]);
    assert_eq!(h.cmdb.containers_of(stale), vec![h.cluster("SYD2 Prod AMD")]);
    assert_eq!(h.cmdb.attribute_of(stale, 10018).as_deref(), Some("2"));
    assert!(h.sync_clusters(&["SYD2 Prod AMD"]).await.is_in_sync());
}

// =============================================================================
// Run Control
// =============================================================================

#[tokio::test]
async fn test_dry_run_writes_nothing_and_reports_the_same_diff() {
    let h = Harness::new();
    h.add_fleet();
    h.cmdb.seed_object("old01", 1504);

    let planned = completed(h.run(dry_run()).await);
    assert!(planned.dry_run);
    assert_eq!(h.cmdb.mutation_count(), 0);
    assert!(planned
        .objects
        .iter()
        .all(|o| o.status == ObjectStatus::Planned));

    let applied = h.sync().await;
    assert_eq!(planned.added, applied.added);
    assert_eq!(planned.changed, applied.changed);
    assert_eq!(planned.removed, applied.removed);
}

#[tokio::test]
async fn test_detail_failure_aborts_before_any_write() {
    let h = Harness::new();
    h.add_fleet();
    h.hv.fail_detail_for(&VmId::new("vm-3"));

    let mut controller = h.controller();
    let err = controller.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::DetailFetch { backend: "vcenter", .. }));
    assert_eq!(controller.state(), RunState::FetchSource);
    assert_eq!(h.cmdb.mutation_count(), 0);
}

#[tokio::test]
async fn test_cheap_check_short_circuits_unchanged_vm_set() {
    let h = Harness::new();
    h.add_fleet();

    completed(h.run(simple()).await);
    let calls = h.hv.detail_calls();

    assert!(matches!(h.run(simple()).await, RunOutcome::Unchanged));
    assert_eq!(h.hv.detail_calls(), calls);

    h.hv.add_vm(
        "BNE2 Prod",
        vm_detail("vm-4", "db02", "RHEL_6_64", 4, vec![]),
    );
    let summary = completed(h.run(simple()).await);
    assert_eq!(summary.added.len(), 1);
}

#[tokio::test]
async fn test_dry_run_does_not_advance_the_snapshot() {
    let h = Harness::new();
    h.add_fleet();

    completed(
        h.run(RunOptions {
            simple_check: true,
            dry_run: true,
        })
        .await,
    );
    assert!(!h.dir.path().join("vms.json").exists());
    completed(h.run(simple()).await);
    assert!(h.dir.path().join("vms.json").exists());
}

#[tokio::test]
async fn test_held_lock_refuses_the_run() {
    let h = Harness::new();
    let _held = RunLock::acquire(&h.dir.path().join("vmsync.lock")).unwrap();

    let err = h.controller().run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning(_)));
}
