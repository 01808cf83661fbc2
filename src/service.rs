//! Run orchestration
//!
//! Ties the lister, the manifest overlay, the dependency resolver and the
//! syncer together for the two modes of an [`Invocation`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{Config, ManifestPaths, TargetConfig};
use crate::dependencies::{log_change, DependencyResolver, Resolution};
use crate::discovery::{device_name_pattern, find_device_repository, DeviceRepository, RepositoryLister};
use crate::invocation::{Invocation, Mode};
use crate::manifest::{EntryChange, Manifest, ProjectSpec};
use crate::sync::{SyncStatus, Syncer};

/// Final state of a run
#[derive(Debug)]
pub enum Outcome {
    /// Device tree recorded and synced, dependencies resolved
    DeviceSynced {
        repository: DeviceRepository,
        change: EntryChange,
        sync: SyncStatus,
        dependencies: Resolution,
    },
    /// No repository on the remote follows the naming convention for the device
    DeviceNotFound { device: String, remote: String },
    /// Dependencies-only run on a device tree found in a manifest
    DependenciesResolved { path: String, dependencies: Resolution },
    /// Dependencies-only run, but no manifest knows the device tree
    DeviceNotInstalled { device: String },
}

/// Executes invocations against one checkout
pub struct RoomService<'a, L: RepositoryLister, S: Syncer> {
    config: &'a Config,
    root: PathBuf,
    manifests: ManifestPaths,
    lister: L,
    syncer: S,
}

impl<'a, L: RepositoryLister, S: Syncer> RoomService<'a, L, S> {
    pub fn new(config: &'a Config, root: &Path, lister: L, syncer: S) -> Self {
        Self {
            config,
            root: root.to_path_buf(),
            manifests: config.manifest.resolve(root),
            lister,
            syncer,
        }
    }

    pub fn manifests(&self) -> &ManifestPaths {
        &self.manifests
    }

    pub async fn run(&self, invocation: &Invocation) -> Result<Outcome> {
        match invocation.mode {
            Mode::Discover => self.discover(&invocation.device, &invocation.target).await,
            Mode::DependenciesOnly => self.dependencies_only(&invocation.device, &invocation.target).await,
        }
    }

    /// Find the device tree on the target remote, record it, sync it, then resolve it
    pub async fn discover(&self, device: &str, target: &TargetConfig) -> Result<Outcome> {
        info!(
            "Retrieving device repository for {} from {} ({})",
            device,
            target.remote,
            self.lister.provider_name()
        );

        let repositories = self.lister.list_repositories(&target.remote).await?;
        let Some(repository) = find_device_repository(&repositories, device) else {
            return Ok(Outcome::DeviceNotFound {
                device: device.to_string(),
                remote: target.remote.clone(),
            });
        };
        info!("Found repository: {}", repository.name);

        let path = repository.local_path();
        let spec = ProjectSpec {
            name: repository.qualified_name(&target.remote),
            path: path.clone(),
            remote: self.config.manifest.remote_alias.clone(),
            revision: target.branch.clone(),
        };

        let mut overlay = Manifest::load(&self.manifests.local).for_update(&self.manifests.local)?;
        let change = overlay.upsert_by_name(&repository.name, &spec);
        log_change(&change);
        overlay.save(&self.manifests.local)?;

        info!("Syncing repository to retrieve project");
        let paths = vec![path.clone()];
        let sync = SyncStatus::from_result(&paths, self.syncer.sync(&paths).await);
        if let SyncStatus::Failed(error) = &sync {
            warn!("Device repository sync failed: {}", error);
        }

        let dependencies = self
            .resolver(target)
            .resolve(&path, &self.syncer)
            .await
            .with_context(|| format!("Failed to resolve dependencies of {}", path))?;

        Ok(Outcome::DeviceSynced {
            repository,
            change,
            sync,
            dependencies,
        })
    }

    /// Resolve the dependencies of a device tree already listed in a manifest
    pub async fn dependencies_only(&self, device: &str, target: &TargetConfig) -> Result<Outcome> {
        let Some(path) = self.installed_device_path(device)? else {
            return Ok(Outcome::DeviceNotInstalled {
                device: device.to_string(),
            });
        };
        info!("Device tree for {} is at {}", device, path);

        let dependencies = self
            .resolver(target)
            .resolve(&path, &self.syncer)
            .await
            .with_context(|| format!("Failed to resolve dependencies of {}", path))?;

        Ok(Outcome::DependenciesResolved { path, dependencies })
    }

    /// Path of the device tree, looked up in the overlay first, then in the main manifest
    pub fn installed_device_path(&self, device: &str) -> Result<Option<String>> {
        let pattern = device_name_pattern(device)?;

        let overlay = Manifest::load(&self.manifests.local).read_only(&self.manifests.local);
        if let Some(path) = overlay.path_of_match(&pattern) {
            return Ok(Some(path));
        }

        // Devices that come from AOSP live in the main manifest
        let base = Manifest::load(&self.manifests.base).read_only(&self.manifests.base);
        Ok(base.path_of_match(&pattern))
    }

    fn resolver<'r>(&'r self, target: &'r TargetConfig) -> DependencyResolver<'r> {
        DependencyResolver::new(
            target,
            &self.manifests,
            &self.root,
            &self.config.dependencies.prefix,
            &self.config.manifest.remote_alias,
        )
    }
}
