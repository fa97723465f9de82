//! Configuration for vmsync

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main sync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Virtualization backend
    #[serde(default)]
    pub vcenter: VCenterConfig,

    /// CMDB backend and its catalog constants
    #[serde(default)]
    pub cmdb: CmdbConfig,

    /// Inventory fetching
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Site tag rules, first match wins
    #[serde(default = "default_sites")]
    pub sites: Vec<SiteTagRule>,

    /// Hypervisor guest OS id to CMDB OS display name
    #[serde(default = "default_os_translations")]
    pub os_translations: BTreeMap<String, String>,

    /// Local files used by a run
    #[serde(default)]
    pub run: RunConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// vCenter connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VCenterConfig {
    /// Server endpoint, e.g. `https://vcenter.example.com`
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for VCenterConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// CMDB connection and catalog constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdbConfig {
    /// Full URL of the API script, e.g. `https://racktables.example.com/api.php`
    #[serde(default)]
    pub api_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Object type of virtual machines
    #[serde(default = "default_vm_type_id")]
    pub vm_type_id: u32,

    /// Object type of cluster containers
    #[serde(default = "default_cluster_type_id")]
    pub cluster_type_id: u32,

    /// Catalog chapter holding OS names
    #[serde(default = "default_os_chapter_id")]
    pub os_chapter_id: u32,

    #[serde(default = "default_fqdn_attr_id")]
    pub fqdn_attr_id: u32,

    #[serde(default = "default_os_attr_id")]
    pub os_attr_id: u32,

    #[serde(default = "default_cores_attr_id")]
    pub cores_attr_id: u32,

    #[serde(default = "default_datastore_attr_id")]
    pub datastore_attr_id: u32,

    /// Attribute names as they appear in object detail replies
    #[serde(default = "default_os_attr_name")]
    pub os_attr_name: String,

    #[serde(default = "default_cores_attr_name")]
    pub cores_attr_name: String,

    #[serde(default = "default_datastore_attr_name")]
    pub datastore_attr_name: String,
}

impl Default for CmdbConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            request_timeout_secs: default_request_timeout(),
            vm_type_id: default_vm_type_id(),
            cluster_type_id: default_cluster_type_id(),
            os_chapter_id: default_os_chapter_id(),
            fqdn_attr_id: default_fqdn_attr_id(),
            os_attr_id: default_os_attr_id(),
            cores_attr_id: default_cores_attr_id(),
            datastore_attr_id: default_datastore_attr_id(),
            os_attr_name: default_os_attr_name(),
            cores_attr_name: default_cores_attr_name(),
            datastore_attr_name: default_datastore_attr_name(),
        }
    }
}

/// Inventory fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Concurrent detail fetches against the hypervisor
    #[serde(default = "default_source_workers")]
    pub source_workers: usize,

    /// Concurrent detail fetches against the CMDB
    #[serde(default = "default_target_workers")]
    pub target_workers: usize,

    /// Upper bound on a single detail fetch
    #[serde(default = "default_detail_timeout")]
    pub detail_timeout_secs: u64,

    /// Sort NICs by device key before labeling them
    #[serde(default)]
    pub stable_interface_order: bool,

    /// Only sync VMs in these clusters; empty means every cluster
    #[serde(default)]
    pub clusters: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            source_workers: default_source_workers(),
            target_workers: default_target_workers(),
            detail_timeout_secs: default_detail_timeout(),
            stable_interface_order: false,
            clusters: Vec::new(),
        }
    }
}

impl FetchConfig {
    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }
}

/// Tags applied to VMs whose cluster name contains any of `patterns`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTagRule {
    pub patterns: Vec<String>,
    pub tag: String,
}

impl SiteTagRule {
    pub fn new(patterns: &[&str], tag: &str) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            tag: tag.to_string(),
        }
    }

    pub fn matches(&self, cluster_name: &str) -> bool {
        self.patterns.iter().any(|p| cluster_name.contains(p.as_str()))
    }
}

/// Local file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Advisory lock held for the duration of a run
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,

    /// Last seen VM id list for the cheap check
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,

    /// Credentials file; the CLI falls back to `~/.vmwrtpw`
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            lock_path: default_lock_path(),
            snapshot_path: default_snapshot_path(),
            credentials_path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level used when no `-v` flag is given
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_request_timeout() -> u64 {
    30
}

fn default_vm_type_id() -> u32 {
    1504
}

fn default_cluster_type_id() -> u32 {
    1505
}

fn default_os_chapter_id() -> u32 {
    13
}

fn default_fqdn_attr_id() -> u32 {
    3
}

fn default_os_attr_id() -> u32 {
    4
}

fn default_cores_attr_id() -> u32 {
    10018
}

fn default_datastore_attr_id() -> u32 {
    10019
}

fn default_os_attr_name() -> String {
    "SW type".to_string()
}

fn default_cores_attr_name() -> String {
    "CPU cores, No.".to_string()
}

fn default_datastore_attr_name() -> String {
    "Datastore".to_string()
}

fn default_source_workers() -> usize {
    6
}

fn default_target_workers() -> usize {
    4
}

fn default_detail_timeout() -> u64 {
    120
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("/tmp/vmsync.lock")
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("/tmp/vmsync-vms.json")
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_sites() -> Vec<SiteTagRule> {
    vec![
        SiteTagRule::new(&["BNE2"], "Eagle Farm"),
        SiteTagRule::new(&["SYD2", "UAT"], "Global Switch"),
    ]
}

fn default_os_translations() -> BTreeMap<String, String> {
    [
        ("WIN_2000_ADV_SERV", "Windows  2000"),
        ("WIN_XP_PRO", "Windows XP"),
        ("WIN_NET_STANDARD_64", "Windows 2003"),
        ("WIN_NET_STANDARD", "Windows 2003"),
        ("WIN_LONGHORN_64", "Windows Server 2008"),
        ("WIN_LONGHORN", "Windows Server 2008"),
        ("WINDOWS_7_64", "Windows 7"),
        ("WINDOWS_8_64", "Windows 8"),
        ("WINDOWS_7_SERVER_64", "Windows Server 2008 R2"),
        ("WINDOWS_8_SERVER_64", "Windows Server 2012"),
        ("CENTOS_64", "CentOS V5"),
        ("DEBIAN_6", "Debian 6.0 (squeeze)"),
        ("RHEL_3", "RHEL V3"),
        ("RHEL_4", "RHEL V4"),
        ("RHEL_5_64", "RHEL V5"),
        ("RHEL_6_64", "RHEL V6"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Reduce a guest OS id to its comparable core.
///
/// `RHEL_6_64`, `rhel_6_64` and the legacy `rhel6_64Guest` all become
/// `rhel664`. Keys loaded through the config layer arrive lowercased.
fn guest_key(guest_id: &str) -> String {
    let key: String = guest_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match key.strip_suffix("guest") {
        Some(stripped) => stripped.to_string(),
        None => key,
    }
}

impl SyncConfig {
    /// Load configuration: built-in defaults, then the optional file, then
    /// `VMSYNC__SECTION__KEY` environment variables.
    pub fn load(path: Option<&str>) -> SyncResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&SyncConfig::default_values())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VMSYNC")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Defaults including the site rules and OS table, which `Default`
    /// leaves empty for tests that build configs by hand.
    pub fn default_values() -> Self {
        Self {
            sites: default_sites(),
            os_translations: default_os_translations(),
            ..Default::default()
        }
    }

    /// Check the settings a live run cannot do without.
    pub fn validate(&self) -> SyncResult<()> {
        url::Url::parse(&self.vcenter.url)
            .map_err(|e| SyncError::Config(format!("vcenter.url '{}': {}", self.vcenter.url, e)))?;
        url::Url::parse(&self.cmdb.api_url)
            .map_err(|e| SyncError::Config(format!("cmdb.api_url '{}': {}", self.cmdb.api_url, e)))?;

        if self.fetch.source_workers == 0 || self.fetch.target_workers == 0 {
            return Err(SyncError::Config(
                "fetch worker counts must be at least 1".to_string(),
            ));
        }
        if self.fetch.detail_timeout_secs == 0 {
            return Err(SyncError::Config(
                "fetch.detail_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// CMDB OS display name for a hypervisor guest id.
    pub fn os_display_name(&self, guest_id: &str) -> Option<&str> {
        let wanted = guest_key(guest_id);
        self.os_translations
            .iter()
            .find(|(key, _)| guest_key(key) == wanted)
            .map(|(_, name)| name.as_str())
    }

    /// Site tags for a cluster name.
    pub fn site_tags(&self, cluster_name: &str) -> Vec<String> {
        self.sites
            .iter()
            .find(|rule| rule.matches(cluster_name))
            .map(|rule| vec![rule.tag.clone()])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cmdb_defaults() {
        let config = CmdbConfig::default();
        assert_eq!(config.vm_type_id, 1504);
        assert_eq!(config.cluster_type_id, 1505);
        assert_eq!(config.os_chapter_id, 13);
        assert_eq!(config.cores_attr_id, 10018);
        assert_eq!(config.os_attr_name, "SW type");
    }

    #[test]
    fn test_fetch_defaults() {
        let config = FetchConfig::default();
        assert_eq!(config.source_workers, 6);
        assert_eq!(config.target_workers, 4);
        assert_eq!(config.detail_timeout(), Duration::from_secs(120));
        assert!(!config.stable_interface_order);
    }

    #[test]
    fn test_site_tags_first_rule_wins() {
        let config = SyncConfig::default_values();
        assert_eq!(config.site_tags("BNE2 Prod"), vec!["Eagle Farm"]);
        assert_eq!(config.site_tags("SYD2 Prod AMD"), vec!["Global Switch"]);
        assert_eq!(config.site_tags("UAT Cluster"), vec!["Global Switch"]);
        assert_eq!(config.site_tags("BNE2-UAT"), vec!["Eagle Farm"]);
        assert!(config.site_tags("MEL1").is_empty());
    }

    #[test]
    fn test_os_translation_ignores_case_and_legacy_suffix() {
        let config = SyncConfig::default_values();
        assert_eq!(config.os_display_name("RHEL_6_64"), Some("RHEL V6"));
        assert_eq!(config.os_display_name("rhel_6_64"), Some("RHEL V6"));
        assert_eq!(config.os_display_name("rhel6_64Guest"), Some("RHEL V6"));
        assert_eq!(
            config.os_display_name("WINDOWS_8_SERVER_64"),
            Some("Windows Server 2012")
        );
        assert_eq!(config.os_display_name("OTHER_LINUX_64"), None);
    }

    #[test]
    fn test_load_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[vcenter]
url = "https://vcenter.example.com"

[cmdb]
api_url = "https://racktables.example.com/api.php"
vm_type_id = 1600

[fetch]
source_workers = 2
clusters = ["SYD2 Prod AMD"]
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = SyncConfig::load(Some(&path)).unwrap();

        assert_eq!(config.vcenter.url, "https://vcenter.example.com");
        assert_eq!(config.cmdb.vm_type_id, 1600);
        assert_eq!(config.cmdb.cluster_type_id, 1505);
        assert_eq!(config.fetch.source_workers, 2);
        assert_eq!(config.fetch.target_workers, 4);
        assert_eq!(config.fetch.clusters, vec!["SYD2 Prod AMD"]);
        assert_eq!(config.os_display_name("RHEL_5_64"), Some("RHEL V5"));
        assert_eq!(config.site_tags("BNE2 Prod"), vec!["Eagle Farm"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_endpoints() {
        let config = SyncConfig::default_values();
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }
}
