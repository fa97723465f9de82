//! vCenter REST client
//!
//! Talks to the vSphere Automation API (`/api/...`). A session token is
//! obtained once at connect time and sent on every request.

use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::{ClusterSummary, Hypervisor, PowerState, VmDetail};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use vmsync_types::{ClusterId, GuestNic, VmId};

const SESSION_HEADER: &str = "vmware-api-session-id";

/// HTTP client for a vCenter server
pub struct VCenterClient {
    client: Client,
    base_url: String,
    session: String,
}

#[derive(Debug, Deserialize)]
struct VmSummaryDto {
    vm: String,
}

#[derive(Debug, Deserialize)]
struct VmInfoDto {
    name: String,
    #[serde(rename = "guest_OS")]
    guest_os: Option<String>,
    power_state: String,
    cpu: Option<CpuDto>,
    #[serde(default)]
    disks: BTreeMap<String, DiskDto>,
}

#[derive(Debug, Deserialize)]
struct CpuDto {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct DiskDto {
    backing: Option<DiskBackingDto>,
}

#[derive(Debug, Deserialize)]
struct DiskBackingDto {
    vmdk_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuestIdentityDto {
    host_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuestInterfaceDto {
    nic: Option<String>,
    ip: Option<IpConfigDto>,
}

#[derive(Debug, Deserialize)]
struct IpConfigDto {
    #[serde(default)]
    ip_addresses: Vec<IpAddressDto>,
}

#[derive(Debug, Deserialize)]
struct IpAddressDto {
    ip_address: String,
}

#[derive(Debug, Deserialize)]
struct ClusterDto {
    cluster: String,
    name: String,
}

impl VCenterClient {
    /// Open a session against `endpoint` (scheme and host, no path).
    pub async fn connect(
        endpoint: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> ConnectorResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = endpoint.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{}/api/session", base_url))
            .basic_auth(username, Some(password))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectorError::AuthenticationFailed {
                backend: base_url.clone(),
            });
        }
        if !status.is_success() {
            return Err(ConnectorError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let session: String = response.json().await?;
        tracing::debug!(endpoint = %base_url, "vCenter session established");

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ConnectorResult<T> {
        match self.get_optional(path, false).await? {
            Some(value) => Ok(value),
            None => Err(ConnectorError::NotFound(path.to_string())),
        }
    }

    /// GET that maps "guest data unavailable" replies to `None` when
    /// `tolerate_unavailable` is set.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        tolerate_unavailable: bool,
    ) -> ConnectorResult<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(SESSION_HEADER, &self.session)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(Some(response.json().await?));
        }

        match status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::NOT_FOUND if tolerate_unavailable => {
                Ok(None)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ConnectorError::AuthenticationFailed {
                    backend: self.base_url.clone(),
                })
            }
            StatusCode::NOT_FOUND => Err(ConnectorError::NotFound(path.to_string())),
            _ => Err(ConnectorError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

fn power_state(raw: &str) -> PowerState {
    match raw {
        "POWERED_ON" => PowerState::PoweredOn,
        "SUSPENDED" => PowerState::Suspended,
        _ => PowerState::PoweredOff,
    }
}

// Disk keys are numeric strings ("2000", "2001"); the lowest is the boot disk.
fn first_disk_backing(disks: &BTreeMap<String, DiskDto>) -> Option<String> {
    disks
        .iter()
        .min_by_key(|(key, _)| key.parse::<u64>().unwrap_or(u64::MAX))
        .and_then(|(_, disk)| disk.backing.as_ref())
        .and_then(|backing| backing.vmdk_file.clone())
}

#[async_trait]
impl Hypervisor for VCenterClient {
    async fn list_vms(&self) -> ConnectorResult<Vec<VmId>> {
        let vms: Vec<VmSummaryDto> = self.get("/api/vcenter/vm").await?;
        Ok(vms.into_iter().map(|vm| VmId::new(vm.vm)).collect())
    }

    async fn get_vm(&self, id: &VmId) -> ConnectorResult<VmDetail> {
        let info: VmInfoDto = self.get(&format!("/api/vcenter/vm/{}", id)).await?;

        let identity: Option<GuestIdentityDto> = self
            .get_optional(&format!("/api/vcenter/vm/{}/guest/identity", id), true)
            .await?;
        let interfaces: Option<Vec<GuestInterfaceDto>> = self
            .get_optional(
                &format!("/api/vcenter/vm/{}/guest/networking/interfaces", id),
                true,
            )
            .await?;

        let nics = interfaces
            .unwrap_or_default()
            .into_iter()
            .map(|iface| GuestNic {
                device_key: iface.nic,
                ip_addresses: iface
                    .ip
                    .map(|ip| ip.ip_addresses.into_iter().map(|a| a.ip_address).collect())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(VmDetail {
            id: id.clone(),
            disk_backing: first_disk_backing(&info.disks),
            name: info.name,
            hostname: identity.and_then(|i| i.host_name).filter(|h| !h.is_empty()),
            guest_os: info.guest_os,
            cpu_count: info.cpu.map(|cpu| cpu.count),
            nics,
            power_state: power_state(&info.power_state),
        })
    }

    async fn list_clusters(&self) -> ConnectorResult<Vec<ClusterSummary>> {
        let clusters: Vec<ClusterDto> = self.get("/api/vcenter/cluster").await?;
        Ok(clusters
            .into_iter()
            .map(|c| ClusterSummary {
                id: ClusterId::new(c.cluster),
                name: c.name,
            })
            .collect())
    }

    async fn list_cluster_vms(&self, cluster: &ClusterId) -> ConnectorResult<Vec<VmId>> {
        let vms: Vec<VmSummaryDto> = self
            .get(&format!("/api/vcenter/vm?clusters={}", cluster))
            .await?;
        Ok(vms.into_iter().map(|vm| VmId::new(vm.vm)).collect())
    }
}
