//! Backend trait definitions
//!
//! The engine only ever talks to a hypervisor or a CMDB through these traits.
//! Reads return `ConnectorResult`; CMDB writes return an already classified
//! [`MutationOutcome`] because the raw write replies cannot be trusted.

use crate::error::ConnectorResult;
use crate::outcome::MutationOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vmsync_types::{ClusterId, GuestNic, ObjectId, VmId};

/// Power state as reported by the hypervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl PowerState {
    pub fn is_on(&self) -> bool {
        matches!(self, PowerState::PoweredOn)
    }
}

/// Full detail of one VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDetail {
    pub id: VmId,

    /// Inventory display name
    pub name: String,

    /// Hostname reported by the guest tools, if they are running
    pub hostname: Option<String>,

    /// Configured guest OS identifier (`RHEL_6_64`, `WINDOWS_8_SERVER_64`)
    pub guest_os: Option<String>,

    pub cpu_count: Option<u32>,

    /// Backing file of the first virtual disk (`[ds1] web01/web01.vmdk`)
    pub disk_backing: Option<String>,

    /// Guest NICs in listing order
    pub nics: Vec<GuestNic>,

    pub power_state: PowerState,
}

/// Compute cluster summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: ClusterId,
    pub name: String,
}

/// Virtualization backend
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// List the identifiers of every registered VM
    async fn list_vms(&self) -> ConnectorResult<Vec<VmId>>;

    /// Get the full detail of one VM
    async fn get_vm(&self, id: &VmId) -> ConnectorResult<VmDetail>;

    /// List all clusters
    async fn list_clusters(&self) -> ConnectorResult<Vec<ClusterSummary>>;

    /// List the VMs that belong to a cluster
    async fn list_cluster_vms(&self, cluster: &ClusterId) -> ConnectorResult<Vec<VmId>>;
}

/// Object summary as returned by the CMDB's list call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub id: ObjectId,
    pub name: Option<String>,
    pub label: Option<String>,

    /// Name of the container (cluster) object this object is linked into
    pub container_name: Option<String>,
}

/// One attribute value of a CMDB object.
///
/// Dictionary attributes carry the catalog id in `value` and the display
/// name in `a_value`; plain attributes carry the same text in both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub value: Option<String>,
    pub a_value: Option<String>,
}

/// IPv4 address bound to a CMDB object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Binding {
    pub ip: String,

    /// OS interface name the address is bound to
    pub osif: String,
}

/// Object detail with attributes keyed by attribute name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDetail {
    pub attrs: BTreeMap<String, AttributeValue>,
    pub ipv4: Vec<Ipv4Binding>,
}

/// Configuration-management database backend
#[async_trait]
pub trait Cmdb: Send + Sync {
    /// List every object of a type
    async fn list_objects(&self, type_id: u32) -> ConnectorResult<Vec<ObjectSummary>>;

    /// Get an object's attributes and address bindings
    async fn get_object(&self, id: ObjectId) -> ConnectorResult<ObjectDetail>;

    /// Get a catalog chapter as `entry id -> display name`
    async fn get_chapter(&self, chapter_id: u32) -> ConnectorResult<BTreeMap<u64, String>>;

    /// Create an object
    async fn create_object(&self, name: &str, type_id: u32) -> MutationOutcome;

    /// Rename/retype an object and write attributes by numeric attribute id
    async fn edit_object(
        &self,
        id: ObjectId,
        name: &str,
        type_id: u32,
        attrs: &BTreeMap<u32, String>,
    ) -> MutationOutcome;

    /// Delete an object
    async fn delete_object(&self, id: ObjectId) -> MutationOutcome;

    /// Bind an IPv4 address to an object
    async fn add_ipv4(&self, id: ObjectId, ip: &str, osif: &str) -> MutationOutcome;

    /// Unbind an IPv4 address from an object
    async fn remove_ipv4(&self, id: ObjectId, ip: &str) -> MutationOutcome;

    /// Link `child` into the container `parent`
    async fn link_entities(&self, child: ObjectId, parent: ObjectId) -> MutationOutcome;

    /// Remove `child` from the container `parent`
    async fn unlink_entities(&self, child: ObjectId, parent: ObjectId) -> MutationOutcome;

    /// Replace an object's tags
    async fn update_tags(&self, id: ObjectId, tags: &[String]) -> MutationOutcome;
}
