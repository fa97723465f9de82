//! Interface label synthesis
//!
//! The hypervisor reports guest networking as an ordered list of NICs, each
//! with a list of addresses. The CMDB wants one OS interface name per
//! address, so names are synthesized:
//!
//! - the first IPv4 address of the Nth populated NIC is `eth<N>`
//! - the Mth further IPv4 address on the same NIC is `eth<N>:<M>`
//!
//! A NIC counts as populated when it is backed by a virtual network device.
//! Guest-only interfaces and non-IPv4 addresses are skipped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// One guest network interface as listed by the hypervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestNic {
    /// Key of the virtual device backing this interface, if any
    pub device_key: Option<String>,

    /// Addresses in the order the guest reports them
    #[serde(default)]
    pub ip_addresses: Vec<String>,
}

impl GuestNic {
    pub fn new(device_key: Option<&str>, ips: &[&str]) -> Self {
        Self {
            device_key: device_key.map(str::to_string),
            ip_addresses: ips.iter().map(|ip| ip.to_string()).collect(),
        }
    }

    fn is_populated(&self) -> bool {
        self.device_key.is_some()
    }
}

/// Build the `label -> address` map for a VM.
///
/// With `stable_order` the populated NICs are ordered by device key first, so
/// the labels no longer depend on the order the guest happens to list them.
pub fn label_interfaces(nics: &[GuestNic], stable_order: bool) -> BTreeMap<String, String> {
    let mut populated: Vec<&GuestNic> = nics.iter().filter(|nic| nic.is_populated()).collect();
    if stable_order {
        populated.sort_by(|a, b| device_order(a).cmp(&device_order(b)));
    }

    let mut labels = BTreeMap::new();
    for (eth, nic) in populated.into_iter().enumerate() {
        let ipv4 = nic
            .ip_addresses
            .iter()
            .filter(|ip| ip.parse::<Ipv4Addr>().is_ok());
        for (num, ip) in ipv4.enumerate() {
            let label = if num == 0 {
                format!("eth{}", eth)
            } else {
                format!("eth{}:{}", eth, num)
            };
            labels.insert(label, ip.clone());
        }
    }
    labels
}

// Numeric keys sort numerically, anything else after them lexically.
fn device_order(nic: &GuestNic) -> (u64, String) {
    let key = nic.device_key.clone().unwrap_or_default();
    (key.parse().unwrap_or(u64::MAX), key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secondary_addresses_get_alias_labels() {
        let nics = vec![
            GuestNic::new(Some("4000"), &["10.0.0.1"]),
            GuestNic::new(Some("4001"), &["10.0.1.1", "10.0.1.2"]),
        ];

        let labels = label_interfaces(&nics, false);
        let names: Vec<_> = labels.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["eth0", "eth1", "eth1:1"]);
        assert_eq!(labels["eth1:1"], "10.0.1.2");
    }

    #[test]
    fn test_unbacked_nics_and_ipv6_are_skipped() {
        let nics = vec![
            GuestNic::new(None, &["192.168.122.1"]),
            GuestNic::new(Some("4000"), &["fe80::1", "10.0.0.5"]),
        ];

        let labels = label_interfaces(&nics, false);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["eth0"], "10.0.0.5");
    }

    #[test]
    fn test_listing_order_drives_labels_unless_stabilized() {
        let nics = vec![
            GuestNic::new(Some("4001"), &["10.0.1.1"]),
            GuestNic::new(Some("4000"), &["10.0.0.1"]),
        ];

        assert_eq!(label_interfaces(&nics, false)["eth0"], "10.0.1.1");
        assert_eq!(label_interfaces(&nics, true)["eth0"], "10.0.0.1");
    }

    #[test]
    fn test_no_nics_yields_no_labels() {
        assert!(label_interfaces(&[], false).is_empty());
    }
}
