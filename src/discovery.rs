//! Device repository discovery
//!
//! Device trees follow the `android_device_<manufacturer>_<device>` naming
//! convention and are checked out at `device/<manufacturer>/<device>`.

use anyhow::Result;
use async_trait::async_trait;

use crate::github::{GitHubClient, RemoteRepository};

const DEVICE_PREFIX: &str = "android_device_";

/// Source of the repositories an account owns
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryLister: Send + Sync {
    /// List every repository owned by `account`
    async fn list_repositories(&self, account: &str) -> Result<Vec<RemoteRepository>>;

    /// Provider name for display/logging
    fn provider_name(&self) -> &'static str;
}

#[async_trait]
impl RepositoryLister for GitHubClient {
    async fn list_repositories(&self, account: &str) -> Result<Vec<RemoteRepository>> {
        self.list_account_repositories(account).await
    }

    fn provider_name(&self) -> &'static str {
        "GitHub"
    }
}

/// A device tree found in a repository listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRepository {
    /// Bare repository name, e.g. `android_device_acme_widget`
    pub name: String,
    pub manufacturer: String,
    pub device: String,
}

impl DeviceRepository {
    /// Parse a repository name following the device tree convention
    pub fn from_name(name: &str, device: &str) -> Option<Self> {
        let manufacturer = name
            .strip_prefix(DEVICE_PREFIX)?
            .strip_suffix(device)?
            .strip_suffix('_')?;

        Some(Self {
            name: name.to_string(),
            manufacturer: manufacturer.to_string(),
            device: device.to_string(),
        })
    }

    /// Checkout location relative to the source root
    pub fn local_path(&self) -> String {
        format!("device/{}/{}", self.manufacturer, self.device)
    }

    /// Name recorded in the manifest, qualified with the owning account
    pub fn qualified_name(&self, remote: &str) -> String {
        format!("{}/{}", remote, self.name)
    }
}

/// Device codename of a product: everything after the first underscore
pub fn device_from_product(product: &str) -> &str {
    product
        .split_once('_')
        .map_or(product, |(_, device)| device)
}

/// First repository in listing order that is the device tree for `device`
pub fn find_device_repository(
    repositories: &[RemoteRepository],
    device: &str,
) -> Option<DeviceRepository> {
    repositories
        .iter()
        .find_map(|repository| DeviceRepository::from_name(&repository.name, device))
}

/// Pattern matching manifest project names of the device tree for `device`
pub fn device_name_pattern(device: &str) -> Result<regex::Regex> {
    Ok(regex::Regex::new(&format!(
        "{}.*_{}$",
        DEVICE_PREFIX,
        regex::escape(device)
    ))?)
}
