//! Dependency resolver - adds the repositories a device tree declares
//!
//! A device tree lists what it needs in `<prefix>.dependencies`, a JSON array
//! of `{"repository", "target_path", "branch"}` objects. Only the direct
//! dependencies of one tree are handled per run.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{ManifestPaths, TargetConfig};
use crate::manifest::{EntryChange, Manifest, ProjectSpec};
use crate::sync::{SyncStatus, Syncer};

const DECLARATION_SUFFIX: &str = ".dependencies";

/// One entry of a dependency declaration file
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Dependency {
    #[serde(default)]
    pub repository: Option<String>,
    pub target_path: String,
    #[serde(default)]
    pub branch: Option<String>,
}

impl Dependency {
    /// Declared branch, or the target branch
    pub fn effective_branch(&self, target: &TargetConfig) -> String {
        self.branch.clone().unwrap_or_else(|| target.branch.clone())
    }

    /// Name used to decide whether the dependency is already in the manifest.
    ///
    /// Android repositories declared without an owner are assumed to live under
    /// the target remote, not under the account of the dependency itself.
    pub fn effective_name(&self, target: &TargetConfig) -> String {
        let name = self
            .repository
            .clone()
            .unwrap_or_else(|| target.remote.clone());

        if name.contains("android_") && !name.contains("/android_") {
            format!("{}/{}", target.remote, name)
        } else {
            name
        }
    }

    /// Project written to the manifest. The declared name is kept as is.
    fn project(&self, target: &TargetConfig, remote_alias: &str) -> ProjectSpec {
        ProjectSpec {
            name: self
                .repository
                .clone()
                .unwrap_or_else(|| self.effective_name(target)),
            path: self.target_path.clone(),
            remote: remote_alias.to_string(),
            revision: self.effective_branch(target),
        }
    }
}

/// Parse the contents of a declaration file
pub fn parse_declaration(content: &str) -> Result<Vec<Dependency>> {
    Ok(serde_json::from_str(content)?)
}

/// Locate the declaration file of a device tree.
///
/// `<prefix>.dependencies` is preferred; otherwise the first `*.dependencies`
/// file in name order is used.
pub fn find_declaration(tree: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    let preferred = tree.join(format!("{}{}", prefix, DECLARATION_SUFFIX));
    if preferred.is_file() {
        return Ok(Some(preferred));
    }

    let entries = match std::fs::read_dir(tree) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read directory: {:?}", tree)),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read directory: {:?}", tree))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.len() > DECLARATION_SUFFIX.len()
            && file_name.ends_with(DECLARATION_SUFFIX)
            && entry.path().is_file()
        {
            candidates.push(file_name);
        }
    }
    candidates.sort();

    Ok(candidates.into_iter().next().map(|file_name| {
        let alternative = tree.join(&file_name);
        info!(
            "Found alternative dependency file {} (prefix {})",
            alternative.display(),
            &file_name[..file_name.len() - DECLARATION_SUFFIX.len()]
        );
        alternative
    }))
}

/// Result of resolving one device tree
#[derive(Debug)]
pub enum Resolution {
    /// The tree has no declaration file
    NoDeclaration,
    Resolved(ResolveReport),
}

/// What happened while resolving a declaration file
#[derive(Debug)]
pub struct ResolveReport {
    pub declaration: PathBuf,
    /// Effective names of dependencies already recorded with the right branch
    pub satisfied: Vec<String>,
    pub changes: Vec<EntryChange>,
    pub sync: SyncStatus,
}

/// Adds the declared dependencies of a device tree to the overlay manifest
pub struct DependencyResolver<'a> {
    target: &'a TargetConfig,
    manifests: &'a ManifestPaths,
    root: &'a Path,
    prefix: &'a str,
    remote_alias: &'a str,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        target: &'a TargetConfig,
        manifests: &'a ManifestPaths,
        root: &'a Path,
        prefix: &'a str,
        remote_alias: &'a str,
    ) -> Self {
        Self {
            target,
            manifests,
            root,
            prefix,
            remote_alias,
        }
    }

    /// Resolve the tree checked out at `repo_path` (relative to the checkout root)
    pub async fn resolve(&self, repo_path: &str, syncer: &dyn Syncer) -> Result<Resolution> {
        info!("Looking for dependencies in {}", repo_path);

        let tree = self.root.join(repo_path);
        let Some(declaration) = find_declaration(&tree, self.prefix)? else {
            info!("Dependencies file not found in {}", repo_path);
            return Ok(Resolution::NoDeclaration);
        };

        let content = std::fs::read_to_string(&declaration)
            .with_context(|| format!("Failed to read dependency file: {:?}", declaration))?;
        let dependencies = parse_declaration(&content)
            .with_context(|| format!("Failed to parse dependency file: {:?}", declaration))?;
        debug!("{} declares {} dependencies", declaration.display(), dependencies.len());

        let mut overlay = Manifest::load(&self.manifests.local).for_update(&self.manifests.local)?;

        let mut satisfied = Vec::new();
        let mut fetch = Vec::new();
        for dependency in dependencies {
            let name = dependency.effective_name(self.target);
            let branch = dependency.effective_branch(self.target);
            if overlay.contains(&name, &branch) {
                debug!("{} ({}) is already in the manifest", name, branch);
                satisfied.push(name);
            } else {
                fetch.push(dependency);
            }
        }

        if fetch.is_empty() {
            return Ok(Resolution::Resolved(ResolveReport {
                declaration,
                satisfied,
                changes: Vec::new(),
                sync: SyncStatus::NotNeeded,
            }));
        }

        info!("Adding {} dependencies to manifest", fetch.len());
        let defaults = Manifest::load(&self.manifests.default).read_only(&self.manifests.default);

        let mut changes = Vec::with_capacity(fetch.len());
        for dependency in &fetch {
            let change = overlay.upsert_by_path(&dependency.project(self.target, self.remote_alias), &defaults);
            log_change(&change);
            changes.push(change);
        }
        overlay.save(&self.manifests.local)?;

        let paths: Vec<String> = fetch.into_iter().map(|d| d.target_path).collect();
        info!("Syncing dependencies");
        let sync = SyncStatus::from_result(&paths, syncer.sync(&paths).await);

        Ok(Resolution::Resolved(ResolveReport {
            declaration,
            satisfied,
            changes,
            sync,
        }))
    }
}

/// Log a manifest change the way operators expect to read it
pub fn log_change(change: &EntryChange) {
    match change {
        EntryChange::Unchanged { name, .. } => info!("{} already exists", name),
        EntryChange::Updated {
            name,
            previous_name,
            previous_revision,
            ..
        } => {
            if previous_name.is_some() {
                info!("Updating dependency {}", name);
            }
            if previous_revision.is_some() {
                info!("Updating branch for {}", name);
            }
        }
        EntryChange::Added {
            name,
            path,
            replaces,
            ..
        } => {
            if let Some(replaced) = replaces {
                info!("{} already exists in main manifest as {}, replacing with new dependency", path, replaced);
            }
            info!("Adding dependency: {} -> {}", name, path);
        }
    }
}
