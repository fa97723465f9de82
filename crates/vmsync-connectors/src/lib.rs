//! vmsync Connectors - Backend clients for the hypervisor and the CMDB
//!
//! - [`Hypervisor`] / [`VCenterClient`]: the authoritative VM inventory
//! - [`Cmdb`] / [`RackTablesCmdb`]: the inventory being kept in sync
//! - [`classify`]: turns the CMDB's ambiguous write replies into a
//!   [`MutationOutcome`]
//!
//! With the `test-utils` feature, in-memory implementations of both traits
//! are available for engine tests.

#![deny(unsafe_code)]

pub mod error;
pub mod outcome;
pub mod racktables;
pub mod traits;
pub mod vcenter;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use error::{ConnectorError, ConnectorResult};
pub use outcome::{classify, MutationKind, MutationOutcome, RawReply};
pub use racktables::{RackTablesClient, RackTablesCmdb};
pub use traits::{
    AttributeValue, ClusterSummary, Cmdb, Hypervisor, Ipv4Binding, ObjectDetail, ObjectSummary,
    PowerState, VmDetail,
};
pub use vcenter::VCenterClient;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{vm_detail, CmdbCall, InMemoryCmdb, InMemoryHypervisor};
