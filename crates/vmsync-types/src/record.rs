//! Canonical VM records and per-backend inventories

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backend-neutral description of a virtual machine.
///
/// Both fetchers normalize into this shape; two records are "the same VM in
/// the same state" exactly when they compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    /// Name of the cluster (container) the VM belongs to
    pub cluster_name: String,

    /// Operating system display name as the CMDB catalog spells it
    pub os_name: Option<String>,

    /// Number of virtual CPUs, kept as the CMDB stores it
    pub core_count: Option<String>,

    /// Datastore holding the VM's primary disk
    pub datastore: Option<String>,

    /// Interface label (`eth0`, `eth1:1`) to IPv4 address
    #[serde(default)]
    pub ip_addresses: BTreeMap<String, String>,
}

impl VmRecord {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            ..Default::default()
        }
    }

    pub fn with_os(mut self, os_name: impl Into<String>) -> Self {
        self.os_name = Some(os_name.into());
        self
    }

    pub fn with_cores(mut self, core_count: impl Into<String>) -> Self {
        self.core_count = Some(core_count.into());
        self
    }

    pub fn with_datastore(mut self, datastore: impl Into<String>) -> Self {
        self.datastore = Some(datastore.into());
        self
    }

    pub fn with_ip(mut self, label: impl Into<String>, ip: impl Into<String>) -> Self {
        self.ip_addresses.insert(label.into(), ip.into());
        self
    }
}

/// Every VM one backend knows about, keyed by hostname.
///
/// `ids` maps each hostname back to the backend identifier it was fetched
/// from so later mutations and power checks can address the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory<I> {
    pub ids: BTreeMap<String, I>,
    pub records: BTreeMap<String, VmRecord>,
}

impl<I> Default for Inventory<I> {
    fn default() -> Self {
        Self {
            ids: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }
}

impl<I> Inventory<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. A duplicate hostname replaces the earlier entry.
    pub fn insert(&mut self, hostname: impl Into<String>, id: I, record: VmRecord) {
        let hostname = hostname.into();
        if self.records.contains_key(&hostname) {
            tracing::debug!(hostname = %hostname, "Duplicate hostname, later record wins");
        }
        self.ids.insert(hostname.clone(), id);
        self.records.insert(hostname, record);
    }

    pub fn id(&self, hostname: &str) -> Option<&I> {
        self.ids.get(hostname)
    }

    pub fn record(&self, hostname: &str) -> Option<&VmRecord> {
        self.records.get(hostname)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_hostname_later_record_wins() {
        let mut inventory = Inventory::new();
        inventory.insert("web01", 1u64, VmRecord::new("SYD2 Prod").with_cores("2"));
        inventory.insert("web01", 2u64, VmRecord::new("SYD2 Prod").with_cores("4"));

        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.id("web01"), Some(&2));
        assert_eq!(
            inventory.record("web01").unwrap().core_count.as_deref(),
            Some("4")
        );
    }

    #[test]
    fn test_record_equality_includes_addresses() {
        let a = VmRecord::new("c1").with_ip("eth0", "10.0.0.1");
        let b = VmRecord::new("c1").with_ip("eth0", "10.0.0.2");
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }
}
