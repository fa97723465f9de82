//! Attribute resolution between display names and CMDB ids
//!
//! One [`AttributeResolver`] lives for one run. Each lookup table is built
//! from a single full enumeration the first time it is needed and is
//! read-only afterwards.

use crate::error::{SyncError, SyncResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use vmsync_connectors::{AttributeValue, Cmdb};
use vmsync_types::ObjectId;

#[derive(Debug, Default)]
struct OsCatalog {
    by_name: BTreeMap<String, u64>,
    by_id: BTreeMap<u64, String>,
}

/// Per-run read-through cache of CMDB name lookups
pub struct AttributeResolver {
    cmdb: Arc<dyn Cmdb>,
    cluster_type_id: u32,
    os_chapter_id: u32,
    clusters: OnceCell<BTreeMap<String, ObjectId>>,
    os_catalog: OnceCell<OsCatalog>,
}

impl AttributeResolver {
    pub fn new(cmdb: Arc<dyn Cmdb>, cluster_type_id: u32, os_chapter_id: u32) -> Self {
        Self {
            cmdb,
            cluster_type_id,
            os_chapter_id,
            clusters: OnceCell::new(),
            os_catalog: OnceCell::new(),
        }
    }

    /// Build both tables now.
    pub async fn prime(&self) -> SyncResult<()> {
        self.clusters().await?;
        self.os_catalog().await?;
        Ok(())
    }

    async fn clusters(&self) -> SyncResult<&BTreeMap<String, ObjectId>> {
        self.clusters
            .get_or_try_init(|| async {
                let objects = self
                    .cmdb
                    .list_objects(self.cluster_type_id)
                    .await
                    .map_err(|e| SyncError::enumeration("cmdb", e))?;

                let table: BTreeMap<String, ObjectId> = objects
                    .into_iter()
                    .filter_map(|object| object.name.map(|name| (name, object.id)))
                    .collect();
                tracing::debug!(clusters = table.len(), "Cluster table built");
                Ok::<_, SyncError>(table)
            })
            .await
    }

    async fn os_catalog(&self) -> SyncResult<&OsCatalog> {
        self.os_catalog
            .get_or_try_init(|| async {
                let chapter = self
                    .cmdb
                    .get_chapter(self.os_chapter_id)
                    .await
                    .map_err(|e| SyncError::enumeration("cmdb", e))?;

                let mut catalog = OsCatalog::default();
                for (id, name) in chapter {
                    catalog.by_name.insert(name.clone(), id);
                    catalog.by_id.insert(id, name);
                }
                tracing::debug!(entries = catalog.by_id.len(), "OS catalog built");
                Ok::<_, SyncError>(catalog)
            })
            .await
    }

    /// Object id of the cluster container named `name`.
    pub async fn resolve_cluster_id(&self, name: &str) -> SyncResult<Option<ObjectId>> {
        Ok(self.clusters().await?.get(name).copied())
    }

    /// Catalog id of the OS named `name`.
    pub async fn resolve_os_id(&self, name: &str) -> SyncResult<Option<u64>> {
        Ok(self.os_catalog().await?.by_name.get(name).copied())
    }

    /// OS display name of catalog entry `id`.
    pub async fn resolve_os_name(&self, id: u64) -> SyncResult<Option<String>> {
        Ok(self.os_catalog().await?.by_id.get(&id).cloned())
    }
}

/// Display value of the attribute named `attr_name`, if the object has one.
pub fn resolve_rt_attr(attrs: &BTreeMap<String, AttributeValue>, attr_name: &str) -> Option<String> {
    attrs
        .get(attr_name)
        .and_then(|attr| attr.a_value.clone())
        .filter(|value| !value.is_empty())
}
