//! vmsync Types - Core types for VM inventory reconciliation
//!
//! vmsync keeps a CMDB in step with the virtual machines a hypervisor
//! cluster is actually running. Both sides are normalized into the same
//! record shape so they can be compared key by key.
//!
//! ## Key Concepts
//!
//! - **VmRecord**: canonical, backend-neutral description of one VM
//! - **Inventory**: every record from one side, keyed by hostname, plus the
//!   backend identifier each hostname came from
//! - **InventoryDiff**: added / changed / removed / unchanged hostnames
//!   between the source of truth and the CMDB
//! - **Interface labels**: `eth<N>` / `eth<N>:<M>` names synthesized from the
//!   hypervisor's NIC listing

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod diff;
pub mod ids;
pub mod interfaces;
pub mod record;

// Re-export main types
pub use diff::InventoryDiff;
pub use ids::{ClusterId, ObjectId, VmId};
pub use interfaces::{label_interfaces, GuestNic};
pub use record::{Inventory, VmRecord};
