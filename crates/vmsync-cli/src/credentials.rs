//! Backend credentials file
//!
//! A JSON object with `vmwusername`, `vmwpassword`, `rtusername` and
//! `rtpassword`, by default at `~/.vmwrtpw`.

use crate::error::{CliError, CliResult};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

const DEFAULT_FILE: &str = ".vmwrtpw";

#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(rename = "vmwusername")]
    pub vcenter_username: String,
    #[serde(rename = "vmwpassword")]
    pub vcenter_password: String,
    #[serde(rename = "rtusername")]
    pub cmdb_username: String,
    #[serde(rename = "rtpassword")]
    pub cmdb_password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("vcenter_username", &self.vcenter_username)
            .field("vcenter_password", &"<redacted>")
            .field("cmdb_username", &self.cmdb_username)
            .field("cmdb_password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn load(path: &Path) -> CliResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CliError::Credentials(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| CliError::Credentials(format!("{}: {}", path.display(), e)))
    }

    /// `~/.vmwrtpw`
    pub fn default_path() -> CliResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CliError::Credentials("Cannot find home directory".into()))?;
        Ok(home.join(DEFAULT_FILE))
    }
}
