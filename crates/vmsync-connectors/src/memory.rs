//! In-memory backends for development and testing
//!
//! [`InMemoryCmdb`] behaves the way the RackTables adapter reports outcomes:
//! creating an existing name is `AlreadyExists`, deleting a missing object is
//! `AlreadyAbsent`, and so on. Every write is recorded so tests can assert on
//! exactly which mutations were issued.

use crate::error::{ConnectorError, ConnectorResult};
use crate::outcome::{MutationKind, MutationOutcome};
use crate::traits::{
    AttributeValue, ClusterSummary, Cmdb, Hypervisor, Ipv4Binding, ObjectDetail, ObjectSummary,
    PowerState, VmDetail,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use vmsync_types::{ClusterId, GuestNic, ObjectId, VmId};

/// In-memory hypervisor
#[derive(Debug, Default)]
pub struct InMemoryHypervisor {
    vms: Mutex<BTreeMap<VmId, VmDetail>>,
    clusters: Mutex<BTreeMap<ClusterId, (String, Vec<VmId>)>>,
    failing: Mutex<BTreeSet<VmId>>,
    detail_calls: AtomicUsize,
}

impl InMemoryHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a powered-on VM in `cluster`, creating the cluster on first use.
    pub fn add_vm(&self, cluster: &str, detail: VmDetail) {
        let mut clusters = self.clusters.lock();
        let existing = clusters
            .iter()
            .find(|(_, (name, _))| name == cluster)
            .map(|(id, _)| id.clone());
        let cluster_id =
            existing.unwrap_or_else(|| ClusterId::new(format!("domain-c{}", clusters.len() + 1)));
        clusters
            .entry(cluster_id)
            .or_insert_with(|| (cluster.to_string(), Vec::new()))
            .1
            .push(detail.id.clone());

        self.vms.lock().insert(detail.id.clone(), detail);
    }

    /// Register a VM that belongs to no cluster.
    pub fn add_standalone_vm(&self, detail: VmDetail) {
        self.vms.lock().insert(detail.id.clone(), detail);
    }

    pub fn remove_vm(&self, id: &VmId) {
        self.vms.lock().remove(id);
        for (_, vms) in self.clusters.lock().values_mut() {
            vms.retain(|vm| vm != id);
        }
    }

    pub fn set_power_state(&self, id: &VmId, state: PowerState) {
        if let Some(vm) = self.vms.lock().get_mut(id) {
            vm.power_state = state;
        }
    }

    /// Make detail fetches for `id` fail.
    pub fn fail_detail_for(&self, id: &VmId) {
        self.failing.lock().insert(id.clone());
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

/// Convenience constructor for test VMs
pub fn vm_detail(id: &str, hostname: &str, guest_os: &str, cpus: u32, nics: Vec<GuestNic>) -> VmDetail {
    VmDetail {
        id: VmId::new(id),
        name: hostname.to_string(),
        hostname: Some(hostname.to_string()),
        guest_os: Some(guest_os.to_string()),
        cpu_count: Some(cpus),
        disk_backing: Some(format!("[ds1] {}/{}.vmdk", hostname, hostname)),
        nics,
        power_state: PowerState::PoweredOn,
    }
}

#[async_trait]
impl Hypervisor for InMemoryHypervisor {
    async fn list_vms(&self) -> ConnectorResult<Vec<VmId>> {
        Ok(self.vms.lock().keys().cloned().collect())
    }

    async fn get_vm(&self, id: &VmId) -> ConnectorResult<VmDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(id) {
            return Err(ConnectorError::Api {
                status: 500,
                message: format!("injected failure for {}", id),
            });
        }
        self.vms
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ConnectorError::NotFound(id.to_string()))
    }

    async fn list_clusters(&self) -> ConnectorResult<Vec<ClusterSummary>> {
        Ok(self
            .clusters
            .lock()
            .iter()
            .map(|(id, (name, _))| ClusterSummary {
                id: id.clone(),
                name: name.clone(),
            })
            .collect())
    }

    async fn list_cluster_vms(&self, cluster: &ClusterId) -> ConnectorResult<Vec<VmId>> {
        self.clusters
            .lock()
            .get(cluster)
            .map(|(_, vms)| vms.clone())
            .ok_or_else(|| ConnectorError::NotFound(cluster.to_string()))
    }
}

/// One recorded CMDB write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdbCall {
    pub kind: MutationKind,
    pub object: String,
    pub outcome: MutationOutcome,
}

#[derive(Debug, Clone)]
struct StoredObject {
    name: String,
    type_id: u32,
    /// Parent links in the order they were made; the backend allows several.
    containers: Vec<ObjectId>,
    attrs: BTreeMap<u32, String>,
    ipv4: Vec<Ipv4Binding>,
    tags: Vec<String>,
}

#[derive(Debug, Default)]
struct CmdbState {
    objects: BTreeMap<ObjectId, StoredObject>,
    next_id: u64,
    calls: Vec<CmdbCall>,
}

/// In-memory CMDB
#[derive(Debug)]
pub struct InMemoryCmdb {
    state: Mutex<CmdbState>,
    attr_names: BTreeMap<u32, String>,
    dictionary_attrs: BTreeMap<u32, u32>,
    chapters: Mutex<BTreeMap<u32, BTreeMap<u64, String>>>,
    failing_objects: Mutex<BTreeSet<String>>,
    failing_reads: Mutex<BTreeSet<ObjectId>>,
    duplicate_on_create: Mutex<BTreeSet<String>>,
    read_calls: AtomicUsize,
}

impl Default for InMemoryCmdb {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCmdb {
    /// Create an empty CMDB with no attribute names configured
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CmdbState {
                next_id: 100,
                ..Default::default()
            }),
            attr_names: BTreeMap::new(),
            dictionary_attrs: BTreeMap::new(),
            chapters: Mutex::new(BTreeMap::new()),
            failing_objects: Mutex::new(BTreeSet::new()),
            failing_reads: Mutex::new(BTreeSet::new()),
            duplicate_on_create: Mutex::new(BTreeSet::new()),
            read_calls: AtomicUsize::new(0),
        }
    }

    /// Name attribute `attr_id` as `name` in object detail replies.
    pub fn with_attribute(mut self, attr_id: u32, name: &str) -> Self {
        self.attr_names.insert(attr_id, name.to_string());
        self
    }

    /// Treat `attr_id` as a dictionary attribute resolved through `chapter_id`.
    pub fn with_dictionary_attribute(mut self, attr_id: u32, name: &str, chapter_id: u32) -> Self {
        self.attr_names.insert(attr_id, name.to_string());
        self.dictionary_attrs.insert(attr_id, chapter_id);
        self
    }

    pub fn set_chapter(&self, chapter_id: u32, entries: &[(u64, &str)]) {
        self.chapters.lock().insert(
            chapter_id,
            entries.iter().map(|(id, name)| (*id, name.to_string())).collect(),
        );
    }

    /// Insert an object directly, bypassing the call log.
    pub fn seed_object(&self, name: &str, type_id: u32) -> ObjectId {
        let mut state = self.state.lock();
        let id = ObjectId::new(state.next_id);
        state.next_id += 1;
        state.objects.insert(
            id,
            StoredObject {
                name: name.to_string(),
                type_id,
                containers: Vec::new(),
                attrs: BTreeMap::new(),
                ipv4: Vec::new(),
                tags: Vec::new(),
            },
        );
        id
    }

    pub fn seed_attribute(&self, id: ObjectId, attr_id: u32, value: &str) {
        if let Some(object) = self.state.lock().objects.get_mut(&id) {
            object.attrs.insert(attr_id, value.to_string());
        }
    }

    pub fn seed_address(&self, id: ObjectId, ip: &str, osif: &str) {
        if let Some(object) = self.state.lock().objects.get_mut(&id) {
            object.ipv4.push(Ipv4Binding {
                ip: ip.to_string(),
                osif: osif.to_string(),
            });
        }
    }

    pub fn seed_link(&self, child: ObjectId, parent: ObjectId) {
        if let Some(object) = self.state.lock().objects.get_mut(&child) {
            if !object.containers.contains(&parent) {
                object.containers.push(parent);
            }
        }
    }

    /// Make every write that touches `name` fail.
    pub fn fail_mutations_for(&self, name: &str) {
        self.failing_objects.lock().insert(name.to_string());
    }

    /// Make detail reads of `id` fail.
    pub fn fail_reads_for(&self, id: ObjectId) {
        self.failing_reads.lock().insert(id);
    }

    /// Report `AlreadyExists` on create for `name` even when it is absent,
    /// after creating it anyway (a duplicate race with another writer).
    pub fn duplicate_on_create(&self, name: &str) {
        self.duplicate_on_create.lock().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<CmdbCall> {
        self.state.lock().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn calls_of(&self, kind: MutationKind) -> Vec<CmdbCall> {
        self.calls().into_iter().filter(|c| c.kind == kind).collect()
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.state
            .lock()
            .objects
            .iter()
            .find(|(_, o)| o.name == name)
            .map(|(id, _)| *id)
    }

    pub fn tags_of(&self, id: ObjectId) -> Vec<String> {
        self.state
            .lock()
            .objects
            .get(&id)
            .map(|o| o.tags.clone())
            .unwrap_or_default()
    }

    pub fn attribute_of(&self, id: ObjectId, attr_id: u32) -> Option<String> {
        self.state
            .lock()
            .objects
            .get(&id)
            .and_then(|o| o.attrs.get(&attr_id).cloned())
    }

    pub fn addresses_of(&self, id: ObjectId) -> Vec<Ipv4Binding> {
        self.state
            .lock()
            .objects
            .get(&id)
            .map(|o| o.ipv4.clone())
            .unwrap_or_default()
    }

    /// First container `id` is linked into.
    pub fn container_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.containers_of(id).first().copied()
    }

    pub fn containers_of(&self, id: ObjectId) -> Vec<ObjectId> {
        self.state
            .lock()
            .objects
            .get(&id)
            .map(|o| o.containers.clone())
            .unwrap_or_default()
    }

    fn object_name(state: &CmdbState, id: ObjectId) -> String {
        state
            .objects
            .get(&id)
            .map(|o| o.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Run a write against the state and record it.
    fn record<F>(&self, kind: MutationKind, object: String, apply: F) -> MutationOutcome
    where
        F: FnOnce(&mut CmdbState) -> MutationOutcome,
    {
        let failing = self.failing_objects.lock().contains(&object);
        let mut state = self.state.lock();
        let outcome = if failing {
            MutationOutcome::Failure(format!("injected failure for {}", object))
        } else {
            apply(&mut state)
        };
        state.calls.push(CmdbCall {
            kind,
            object,
            outcome: outcome.clone(),
        });
        outcome
    }
}

#[async_trait]
impl Cmdb for InMemoryCmdb {
    async fn list_objects(&self, type_id: u32) -> ConnectorResult<Vec<ObjectSummary>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Ok(state
            .objects
            .iter()
            .filter(|(_, o)| o.type_id == type_id)
            .map(|(id, o)| ObjectSummary {
                id: *id,
                name: Some(o.name.clone()).filter(|n| !n.is_empty()),
                label: None,
                container_name: o
                    .containers
                    .first()
                    .and_then(|c| state.objects.get(c))
                    .map(|c| c.name.clone()),
            })
            .collect())
    }

    async fn get_object(&self, id: ObjectId) -> ConnectorResult<ObjectDetail> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_reads.lock().contains(&id) {
            return Err(ConnectorError::Api {
                status: 500,
                message: format!("injected read failure for {}", id),
            });
        }

        let chapters = self.chapters.lock();
        let state = self.state.lock();
        let object = state
            .objects
            .get(&id)
            .ok_or_else(|| ConnectorError::NotFound(id.to_string()))?;

        let mut detail = ObjectDetail {
            ipv4: object.ipv4.clone(),
            ..Default::default()
        };
        for (attr_id, value) in &object.attrs {
            let name = self
                .attr_names
                .get(attr_id)
                .cloned()
                .unwrap_or_else(|| attr_id.to_string());
            let a_value = match self.dictionary_attrs.get(attr_id) {
                Some(chapter) => value
                    .parse::<u64>()
                    .ok()
                    .and_then(|key| chapters.get(chapter).and_then(|c| c.get(&key)).cloned()),
                None => Some(value.clone()),
            };
            detail.attrs.insert(
                name,
                AttributeValue {
                    value: Some(value.clone()),
                    a_value,
                },
            );
        }
        Ok(detail)
    }

    async fn get_chapter(&self, chapter_id: u32) -> ConnectorResult<BTreeMap<u64, String>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .chapters
            .lock()
            .get(&chapter_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_object(&self, name: &str, type_id: u32) -> MutationOutcome {
        let forced_duplicate = self.duplicate_on_create.lock().contains(name);
        self.record(MutationKind::CreateObject, name.to_string(), |state| {
            let exists = state
                .objects
                .values()
                .any(|o| o.name == name && o.type_id == type_id);
            if exists {
                return MutationOutcome::AlreadyExists;
            }
            let id = ObjectId::new(state.next_id);
            state.next_id += 1;
            state.objects.insert(
                id,
                StoredObject {
                    name: name.to_string(),
                    type_id,
                    containers: Vec::new(),
                    attrs: BTreeMap::new(),
                    ipv4: Vec::new(),
                    tags: Vec::new(),
                },
            );
            if forced_duplicate {
                MutationOutcome::AlreadyExists
            } else {
                MutationOutcome::Success
            }
        })
    }

    async fn edit_object(
        &self,
        id: ObjectId,
        name: &str,
        type_id: u32,
        attrs: &BTreeMap<u32, String>,
    ) -> MutationOutcome {
        let object = Self::object_name(&self.state.lock(), id);
        self.record(MutationKind::EditObject, object, |state| {
            match state.objects.get_mut(&id) {
                Some(object) => {
                    object.name = name.to_string();
                    object.type_id = type_id;
                    object
                        .attrs
                        .extend(attrs.iter().map(|(k, v)| (*k, v.clone())));
                    MutationOutcome::Success
                }
                None => MutationOutcome::Failure(format!("object {} does not exist", id)),
            }
        })
    }

    async fn delete_object(&self, id: ObjectId) -> MutationOutcome {
        let object = Self::object_name(&self.state.lock(), id);
        self.record(MutationKind::DeleteObject, object, |state| {
            match state.objects.remove(&id) {
                Some(_) => MutationOutcome::Success,
                None => MutationOutcome::AlreadyAbsent,
            }
        })
    }

    async fn add_ipv4(&self, id: ObjectId, ip: &str, osif: &str) -> MutationOutcome {
        let object = Self::object_name(&self.state.lock(), id);
        self.record(MutationKind::AddAddress, object, |state| {
            match state.objects.get_mut(&id) {
                Some(object) if object.ipv4.iter().any(|b| b.ip == ip) => {
                    MutationOutcome::AlreadyExists
                }
                Some(object) => {
                    object.ipv4.push(Ipv4Binding {
                        ip: ip.to_string(),
                        osif: osif.to_string(),
                    });
                    MutationOutcome::Success
                }
                None => MutationOutcome::Failure(format!("object {} does not exist", id)),
            }
        })
    }

    async fn remove_ipv4(&self, id: ObjectId, ip: &str) -> MutationOutcome {
        let object = Self::object_name(&self.state.lock(), id);
        self.record(MutationKind::RemoveAddress, object, |state| {
            let Some(object) = state.objects.get_mut(&id) else {
                return MutationOutcome::AlreadyAbsent;
            };
            let before = object.ipv4.len();
            object.ipv4.retain(|b| b.ip != ip);
            if object.ipv4.len() < before {
                MutationOutcome::Success
            } else {
                MutationOutcome::AlreadyAbsent
            }
        })
    }

    async fn link_entities(&self, child: ObjectId, parent: ObjectId) -> MutationOutcome {
        let object = Self::object_name(&self.state.lock(), child);
        self.record(MutationKind::LinkEntities, object, |state| {
            match state.objects.get_mut(&child) {
                Some(object) if object.containers.contains(&parent) => {
                    MutationOutcome::AlreadyExists
                }
                Some(object) => {
                    object.containers.push(parent);
                    MutationOutcome::Success
                }
                None => MutationOutcome::Failure(format!("object {} does not exist", child)),
            }
        })
    }

    async fn unlink_entities(&self, child: ObjectId, parent: ObjectId) -> MutationOutcome {
        let object = Self::object_name(&self.state.lock(), child);
        self.record(MutationKind::UnlinkEntities, object, |state| {
            let Some(object) = state.objects.get_mut(&child) else {
                return MutationOutcome::AlreadyAbsent;
            };
            let before = object.containers.len();
            object.containers.retain(|c| *c != parent);
            if object.containers.len() < before {
                MutationOutcome::Success
            } else {
                MutationOutcome::AlreadyAbsent
            }
        })
    }

    async fn update_tags(&self, id: ObjectId, tags: &[String]) -> MutationOutcome {
        let object = Self::object_name(&self.state.lock(), id);
        self.record(MutationKind::UpdateTags, object, |state| {
            match state.objects.get_mut(&id) {
                Some(object) => {
                    object.tags = tags.to_vec();
                    MutationOutcome::Success
                }
                None => MutationOutcome::Failure(format!("object {} does not exist", id)),
            }
        })
    }
}
