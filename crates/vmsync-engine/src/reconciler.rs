//! Applies an inventory diff to the CMDB
//!
//! Every write comes back as a classified [`MutationOutcome`]. Benign
//! outcomes (already exists, already absent) count as done; genuine
//! failures are written to the object's report and the batch moves on.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::report::{ObjectReport, ObjectStatus, SyncAction};
use crate::resolver::AttributeResolver;
use std::collections::BTreeMap;
use std::sync::Arc;
use vmsync_connectors::{Cmdb, Hypervisor, MutationKind, MutationOutcome};
use vmsync_types::{Inventory, InventoryDiff, ObjectId, VmId, VmRecord};

/// Pushes source state into the CMDB
pub struct Reconciler {
    cmdb: Arc<dyn Cmdb>,
    hypervisor: Arc<dyn Hypervisor>,
    resolver: Arc<AttributeResolver>,
    config: Arc<SyncConfig>,
    dry_run: bool,
}

impl Reconciler {
    pub fn new(
        cmdb: Arc<dyn Cmdb>,
        hypervisor: Arc<dyn Hypervisor>,
        resolver: Arc<AttributeResolver>,
        config: Arc<SyncConfig>,
        dry_run: bool,
    ) -> Self {
        Self {
            cmdb,
            hypervisor,
            resolver,
            config,
            dry_run,
        }
    }

    /// Apply `diff`: update changed VMs, create added ones, delete removed ones.
    ///
    /// Only resolver enumeration failures abort; everything else is reported
    /// per object.
    pub async fn apply(
        &self,
        diff: &InventoryDiff<String>,
        source: &Inventory<VmId>,
        target: &Inventory<ObjectId>,
    ) -> SyncResult<Vec<ObjectReport>> {
        let mut reports = Vec::with_capacity(diff.pending());

        for hostname in &diff.changed {
            let Some(record) = source.record(hostname) else {
                continue;
            };
            let report = self
                .update(hostname, record, source.id(hostname), target)
                .await?;
            reports.push(report);
        }

        for hostname in &diff.added {
            let Some(record) = source.record(hostname) else {
                continue;
            };
            let report = self.create(hostname, record).await?;
            reports.push(report);
        }

        for hostname in &diff.removed {
            reports.push(self.delete(hostname, target.id(hostname).copied()).await);
        }

        Ok(reports)
    }

    async fn update(
        &self,
        hostname: &str,
        record: &VmRecord,
        vm: Option<&VmId>,
        target: &Inventory<ObjectId>,
    ) -> SyncResult<ObjectReport> {
        let mut report = ObjectReport::new(hostname, SyncAction::Update);

        if let Some(vm) = vm {
            match self.hypervisor.get_vm(vm).await {
                Ok(detail) if !detail.power_state.is_on() => {
                    tracing::info!(hostname = %hostname, power_state = ?detail.power_state, "VM not powered on, skipping update");
                    report.status = ObjectStatus::SkippedPoweredOff;
                    return Ok(report);
                }
                Ok(_) => {}
                Err(e) => {
                    report.fail(format!("power state check failed: {}", e));
                    return Ok(report);
                }
            }
        }

        let Some(id) = target.id(hostname).copied() else {
            report.fail("no CMDB object id known for changed VM");
            return Ok(report);
        };

        let previous_cluster = target
            .record(hostname)
            .map(|r| r.cluster_name.clone())
            .unwrap_or_default();

        if self.dry_run {
            tracing::info!(hostname = %hostname, object = %id, "Would update");
            self.plan(&mut report, record, &previous_cluster).await?;
            return Ok(report);
        }

        self.upsert(&mut report, id, record, &previous_cluster, true)
            .await?;
        Ok(report)
    }

    async fn create(&self, hostname: &str, record: &VmRecord) -> SyncResult<ObjectReport> {
        let mut report = ObjectReport::new(hostname, SyncAction::Create);
        let cmdb = &self.config.cmdb;

        if self.dry_run {
            tracing::info!(hostname = %hostname, "Would create");
            self.plan(&mut report, record, "").await?;
            return Ok(report);
        }

        let outcome = self.cmdb.create_object(hostname, cmdb.vm_type_id).await;
        self.note(&mut report, MutationKind::CreateObject, &outcome);

        let found = match self.cmdb.list_objects(cmdb.vm_type_id).await {
            Ok(objects) => objects
                .into_iter()
                .find(|o| o.name.as_deref() == Some(hostname)),
            Err(e) => {
                report.fail(format!("object lookup failed: {}", e));
                return Ok(report);
            }
        };
        let Some(found) = found else {
            report.fail("object not found after create");
            return Ok(report);
        };

        // Anything but a clean create may be an object with links and
        // bindings we have never seen.
        let fresh = outcome == MutationOutcome::Success;
        let previous_cluster = found.container_name.unwrap_or_default();
        self.upsert(&mut report, found.id, record, &previous_cluster, !fresh)
            .await?;
        Ok(report)
    }

    async fn delete(&self, hostname: &str, id: Option<ObjectId>) -> ObjectReport {
        let mut report = ObjectReport::new(hostname, SyncAction::Delete);
        let Some(id) = id else {
            report.fail("no CMDB object id known for removed VM");
            return report;
        };

        if self.dry_run {
            tracing::info!(hostname = %hostname, object = %id, "Would delete");
            report.status = ObjectStatus::Planned;
            return report;
        }

        let outcome = self.cmdb.delete_object(id).await;
        self.note(&mut report, MutationKind::DeleteObject, &outcome);
        report
    }

    /// Tags, cluster link, addresses and attributes of an existing object.
    ///
    /// `previous_cluster` is the container the CMDB currently links the
    /// object into. With `read_bindings` the object's live address bindings
    /// are read back and all of them removed before the source's are added.
    async fn upsert(
        &self,
        report: &mut ObjectReport,
        id: ObjectId,
        record: &VmRecord,
        previous_cluster: &str,
        read_bindings: bool,
    ) -> SyncResult<()> {
        let hostname = report.hostname.clone();

        let tags = self.config.site_tags(&record.cluster_name);
        let outcome = self.cmdb.update_tags(id, &tags).await;
        if let MutationOutcome::Failure(reason) = outcome {
            report.warn(format!("{} failed: {}", MutationKind::UpdateTags, reason));
        }

        self.relink(report, id, previous_cluster, &record.cluster_name)
            .await?;

        if read_bindings {
            match self.cmdb.get_object(id).await {
                Ok(detail) => {
                    for binding in detail.ipv4 {
                        let outcome = self.cmdb.remove_ipv4(id, &binding.ip).await;
                        self.note(report, MutationKind::RemoveAddress, &outcome);
                    }
                }
                Err(e) => report.fail(format!("reading address bindings failed: {}", e)),
            }
        }
        for (label, ip) in &record.ip_addresses {
            let outcome = self.cmdb.add_ipv4(id, ip, label).await;
            self.note(report, MutationKind::AddAddress, &outcome);
        }

        let attrs = self.attributes(report, &hostname, record).await?;
        let outcome = self
            .cmdb
            .edit_object(id, &hostname, self.config.cmdb.vm_type_id, &attrs)
            .await;
        self.note(report, MutationKind::EditObject, &outcome);

        Ok(())
    }

    /// Move the object out of `previous` and into `cluster`.
    async fn relink(
        &self,
        report: &mut ObjectReport,
        id: ObjectId,
        previous: &str,
        cluster: &str,
    ) -> SyncResult<()> {
        if !previous.is_empty() && previous != cluster {
            match self.resolver.resolve_cluster_id(previous).await? {
                Some(old) => {
                    let outcome = self.cmdb.unlink_entities(id, old).await;
                    self.note(report, MutationKind::UnlinkEntities, &outcome);
                }
                None => report.warn(format!(
                    "previous cluster '{}' not in CMDB, old link kept",
                    previous
                )),
            }
        }

        if !cluster.is_empty() {
            match self.resolver.resolve_cluster_id(cluster).await? {
                Some(parent) => {
                    let outcome = self.cmdb.link_entities(id, parent).await;
                    self.note(report, MutationKind::LinkEntities, &outcome);
                }
                None => report.warn(format!("cluster '{}' not in CMDB, link omitted", cluster)),
            }
        }
        Ok(())
    }

    /// Numbered attribute values for the edit call. Absent values and
    /// unresolvable OS names are left out rather than written as null.
    async fn attributes(
        &self,
        report: &mut ObjectReport,
        hostname: &str,
        record: &VmRecord,
    ) -> SyncResult<BTreeMap<u32, String>> {
        let cmdb = &self.config.cmdb;
        let mut attrs = BTreeMap::from([(cmdb.fqdn_attr_id, hostname.to_string())]);

        if let Some(cores) = &record.core_count {
            attrs.insert(cmdb.cores_attr_id, cores.clone());
        }
        if let Some(datastore) = &record.datastore {
            attrs.insert(cmdb.datastore_attr_id, datastore.clone());
        }
        match &record.os_name {
            Some(os) => match self.resolver.resolve_os_id(os).await? {
                Some(os_id) => {
                    attrs.insert(cmdb.os_attr_id, os_id.to_string());
                }
                None => report.warn(format!("OS '{}' not in CMDB catalog, attribute omitted", os)),
            },
            None => report.warn("no OS translation for guest, attribute omitted"),
        }

        Ok(attrs)
    }

    /// Dry-run variant of `upsert`: resolve and log, write nothing.
    async fn plan(
        &self,
        report: &mut ObjectReport,
        record: &VmRecord,
        previous_cluster: &str,
    ) -> SyncResult<()> {
        let hostname = report.hostname.clone();
        if !record.cluster_name.is_empty()
            && self
                .resolver
                .resolve_cluster_id(&record.cluster_name)
                .await?
                .is_none()
        {
            report.warn(format!(
                "cluster '{}' not in CMDB, link omitted",
                record.cluster_name
            ));
        }
        let attrs = self.attributes(report, &hostname, record).await?;
        let moved_from = (!previous_cluster.is_empty() && previous_cluster != record.cluster_name)
            .then_some(previous_cluster);
        tracing::debug!(
            hostname = %hostname,
            moved_from = ?moved_from,
            tags = ?self.config.site_tags(&record.cluster_name),
            addresses = ?record.ip_addresses,
            attributes = ?attrs,
            "Planned writes"
        );
        report.status = ObjectStatus::Planned;
        Ok(())
    }

    fn note(&self, report: &mut ObjectReport, kind: MutationKind, outcome: &MutationOutcome) {
        match outcome {
            MutationOutcome::Failure(reason) => report.fail(format!("{} failed: {}", kind, reason)),
            benign => {
                tracing::debug!(hostname = %report.hostname, mutation = %kind, outcome = %benign, "CMDB write")
            }
        }
    }
}
