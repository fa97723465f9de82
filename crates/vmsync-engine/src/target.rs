//! Target inventory: what the CMDB currently records

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::pool::fetch_all;
use crate::resolver::{resolve_rt_attr, AttributeResolver};
use std::fmt;
use std::sync::Arc;
use vmsync_connectors::{Cmdb, ObjectDetail};
use vmsync_types::{Inventory, ObjectId, VmRecord};

const BACKEND: &str = "cmdb";

/// A listed VM object awaiting its detail fetch
#[derive(Debug, Clone)]
struct ListedObject {
    id: ObjectId,
    hostname: String,
    cluster_name: String,
}

impl fmt::Display for ListedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (object {})", self.hostname, self.id)
    }
}

/// Enumerates and normalizes VM objects from the CMDB
pub struct TargetFetcher {
    cmdb: Arc<dyn Cmdb>,
    resolver: Arc<AttributeResolver>,
    config: Arc<SyncConfig>,
}

impl TargetFetcher {
    pub fn new(
        cmdb: Arc<dyn Cmdb>,
        resolver: Arc<AttributeResolver>,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            cmdb,
            resolver,
            config,
        }
    }

    /// Fetch the complete target inventory.
    pub async fn fetch(&self) -> SyncResult<Inventory<ObjectId>> {
        let objects = self
            .cmdb
            .list_objects(self.config.cmdb.vm_type_id)
            .await
            .map_err(|e| SyncError::enumeration(BACKEND, e))?;

        let filter = &self.config.fetch.clusters;
        let mut listed = Vec::with_capacity(objects.len());
        for object in objects {
            let hostname = object
                .name
                .filter(|n| !n.is_empty())
                .or_else(|| object.label.filter(|l| !l.is_empty()));
            let Some(hostname) = hostname else {
                tracing::warn!(object = %object.id, "CMDB object has no name or label, skipping");
                continue;
            };
            let cluster_name = object.container_name.unwrap_or_default();

            // Objects outside the source's cluster filter are out of scope,
            // not gone.
            if !filter.is_empty() && !filter.contains(&cluster_name) {
                tracing::debug!(hostname = %hostname, cluster = %cluster_name, "Outside cluster filter, skipping");
                continue;
            }
            listed.push(ListedObject {
                id: object.id,
                hostname,
                cluster_name,
            });
        }
        tracing::info!(objects = listed.len(), "Fetching object detail from CMDB");

        let cmdb = self.cmdb.clone();
        let details = fetch_all(
            listed,
            self.config.fetch.target_workers,
            self.config.fetch.detail_timeout(),
            move |object: ListedObject| {
                let cmdb = cmdb.clone();
                async move {
                    let detail = cmdb.get_object(object.id).await?;
                    Ok::<_, vmsync_connectors::ConnectorError>((object, detail))
                }
            },
        )
        .await
        .map_err(|failure| SyncError::DetailFetch {
            backend: BACKEND,
            object: failure.item,
            reason: failure.reason,
        })?;

        let mut inventory = Inventory::new();
        for (object, detail) in details {
            let record = self.normalize(&object.cluster_name, &detail).await?;
            tracing::debug!(hostname = %object.hostname, object = %object.id, "Target record");
            inventory.insert(object.hostname, object.id, record);
        }
        Ok(inventory)
    }

    /// Canonical record for one CMDB object.
    ///
    /// The OS is read by display value; when an object only carries the raw
    /// catalog id it is mapped back through the resolver.
    pub async fn normalize(&self, cluster_name: &str, detail: &ObjectDetail) -> SyncResult<VmRecord> {
        let cmdb = &self.config.cmdb;

        let mut os_name = resolve_rt_attr(&detail.attrs, &cmdb.os_attr_name);
        if os_name.is_none() {
            let raw_id = detail
                .attrs
                .get(&cmdb.os_attr_name)
                .and_then(|attr| attr.value.as_deref())
                .and_then(|value| value.parse::<u64>().ok());
            if let Some(id) = raw_id {
                os_name = self.resolver.resolve_os_name(id).await?;
            }
        }

        Ok(VmRecord {
            cluster_name: cluster_name.to_string(),
            os_name,
            core_count: resolve_rt_attr(&detail.attrs, &cmdb.cores_attr_name),
            datastore: resolve_rt_attr(&detail.attrs, &cmdb.datastore_attr_name),
            ip_addresses: detail
                .ipv4
                .iter()
                .map(|binding| (binding.osif.clone(), binding.ip.clone()))
                .collect(),
        })
    }
}
