//! Strongly-typed identifiers for backend entities
//!
//! Hypervisor identifiers are opaque strings (`vm-42`, `domain-c7`); CMDB
//! identifiers are numeric. Both are wrapped so they cannot be mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hypervisor-side identifier of a virtual machine
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmId(String);

impl VmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hypervisor-side identifier of a compute cluster
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CMDB object identifier (VMs, cluster containers, catalog entries)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_parses_padded_strings() {
        let id: ObjectId = " 1504 ".parse().unwrap();
        assert_eq!(id.get(), 1504);
        assert!("vm-1".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let vm = VmId::new("vm-42");
        assert_eq!(serde_json::to_string(&vm).unwrap(), "\"vm-42\"");
        assert_eq!(serde_json::to_string(&ObjectId::new(7)).unwrap(), "7");
    }
}
