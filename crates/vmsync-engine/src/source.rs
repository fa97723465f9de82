//! Source inventory: what the hypervisor is actually running

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::pool::fetch_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use vmsync_connectors::{Hypervisor, VmDetail};
use vmsync_types::{label_interfaces, Inventory, VmId, VmRecord};

const BACKEND: &str = "vcenter";

/// Enumerates and normalizes VMs from the hypervisor
pub struct SourceFetcher {
    hypervisor: Arc<dyn Hypervisor>,
    config: Arc<SyncConfig>,
}

impl SourceFetcher {
    pub fn new(hypervisor: Arc<dyn Hypervisor>, config: Arc<SyncConfig>) -> Self {
        Self { hypervisor, config }
    }

    /// Identifiers of every VM in scope, without fetching any detail.
    pub async fn list_ids(&self) -> SyncResult<BTreeSet<VmId>> {
        if self.config.fetch.clusters.is_empty() {
            let ids = self
                .hypervisor
                .list_vms()
                .await
                .map_err(|e| SyncError::enumeration(BACKEND, e))?;
            return Ok(ids.into_iter().collect());
        }
        Ok(self.cluster_index().await?.into_keys().collect())
    }

    /// VM id to cluster name, built from one pass over the cluster listing.
    ///
    /// With a cluster filter configured only the named clusters are walked.
    pub async fn cluster_index(&self) -> SyncResult<BTreeMap<VmId, String>> {
        let clusters = self
            .hypervisor
            .list_clusters()
            .await
            .map_err(|e| SyncError::enumeration(BACKEND, e))?;

        let filter = &self.config.fetch.clusters;
        let mut index = BTreeMap::new();
        for cluster in clusters {
            if !filter.is_empty() && !filter.contains(&cluster.name) {
                continue;
            }
            let members = self
                .hypervisor
                .list_cluster_vms(&cluster.id)
                .await
                .map_err(|e| SyncError::enumeration(BACKEND, e))?;
            for vm in members {
                index.insert(vm, cluster.name.clone());
            }
        }

        tracing::debug!(vms = index.len(), "Cluster membership indexed");
        Ok(index)
    }

    /// Fetch the complete source inventory.
    pub async fn fetch(&self) -> SyncResult<Inventory<VmId>> {
        let index = self.cluster_index().await?;
        let ids: Vec<VmId> = if self.config.fetch.clusters.is_empty() {
            self.hypervisor
                .list_vms()
                .await
                .map_err(|e| SyncError::enumeration(BACKEND, e))?
        } else {
            index.keys().cloned().collect()
        };
        tracing::info!(vms = ids.len(), "Fetching VM detail from vCenter");

        let hypervisor = self.hypervisor.clone();
        let details = fetch_all(
            ids,
            self.config.fetch.source_workers,
            self.config.fetch.detail_timeout(),
            move |id: VmId| {
                let hypervisor = hypervisor.clone();
                async move { hypervisor.get_vm(&id).await }
            },
        )
        .await
        .map_err(|failure| SyncError::DetailFetch {
            backend: BACKEND,
            object: failure.item,
            reason: failure.reason,
        })?;

        let mut inventory = Inventory::new();
        for detail in details {
            let cluster = index.get(&detail.id).cloned().unwrap_or_default();
            let (hostname, record) = self.normalize(&detail, cluster);
            tracing::debug!(hostname = %hostname, vm = %detail.id, "Source record");
            inventory.insert(hostname, detail.id, record);
        }
        Ok(inventory)
    }

    /// Canonical record for one VM. The hostname falls back to the display name.
    pub fn normalize(&self, detail: &VmDetail, cluster_name: String) -> (String, VmRecord) {
        let hostname = detail
            .hostname
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| detail.name.clone());

        let os_name = detail
            .guest_os
            .as_deref()
            .and_then(|guest| self.config.os_display_name(guest))
            .map(str::to_string);
        if os_name.is_none() {
            tracing::debug!(hostname = %hostname, guest_os = ?detail.guest_os, "No OS translation");
        }

        let record = VmRecord {
            cluster_name,
            os_name,
            core_count: detail.cpu_count.map(|n| n.to_string()),
            datastore: detail.disk_backing.as_deref().and_then(datastore_of),
            ip_addresses: label_interfaces(&detail.nics, self.config.fetch.stable_interface_order),
        };
        (hostname, record)
    }
}

/// Datastore name from a backing file path: `[ds1] web01/web01.vmdk` is `ds1`.
pub fn datastore_of(backing: &str) -> Option<String> {
    let rest = backing.trim_start().strip_prefix('[')?;
    let (name, _) = rest.split_once(']')?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}
