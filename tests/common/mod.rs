/// Common test utilities and helpers for roomservice tests

use anyhow::Result;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use roomservice::github::RemoteRepository;
use roomservice::{Config, RepositoryLister, SyncError, Syncer};

/// A throwaway repo checkout
pub struct TestCheckout {
    pub temp_dir: TempDir,
    pub config: Config,
}

#[allow(dead_code)]
impl TestCheckout {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.github.token_file = temp_dir.path().join("no_token").to_string_lossy().into_owned();

        Self { temp_dir, config }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) {
        self.temp_dir
            .child(relative)
            .write_str(content)
            .expect("Failed to write test file");
    }

    pub fn overlay_path(&self) -> PathBuf {
        self.config.manifest.resolve(self.root()).local
    }

    pub fn overlay(&self) -> String {
        std::fs::read_to_string(self.overlay_path()).expect("Failed to read overlay manifest")
    }

    /// Write a config file whose sync command appends its arguments to `synced.txt`
    pub fn write_config(&self, api_url: &str) -> PathBuf {
        let config_content = format!(
            r#"
target:
  remote: "halogenOS"
  branch: "XOS-7.0"
github:
  api_url: "{}"
  token_file: "{}"
sync:
  command: "sh"
  args: ["-c", "echo \"$@\" >> synced.txt", "sh"]
"#,
            api_url,
            self.root().join("no_token").display()
        );
        let path = self.root().join("roomservice.yml");
        std::fs::write(&path, config_content).expect("Failed to write test config");
        path
    }

    pub fn synced(&self) -> Vec<String> {
        std::fs::read_to_string(self.root().join("synced.txt"))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Syncer that records every batch instead of running repo
#[derive(Default)]
pub struct RecordingSyncer {
    pub batches: Mutex<Vec<Vec<String>>>,
}

#[allow(dead_code)]
impl RecordingSyncer {
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl Syncer for RecordingSyncer {
    async fn sync(&self, paths: &[String]) -> Result<(), SyncError> {
        self.batches.lock().expect("poisoned").push(paths.to_vec());
        Ok(())
    }
}

#[async_trait]
impl<'a> Syncer for &'a RecordingSyncer {
    async fn sync(&self, paths: &[String]) -> Result<(), SyncError> {
        (**self).sync(paths).await
    }
}

/// Lister returning a fixed set of repository names
pub struct StaticLister {
    pub names: Vec<String>,
}

impl StaticLister {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|name| name.to_string()).collect(),
        }
    }
}

#[async_trait]
impl RepositoryLister for StaticLister {
    async fn list_repositories(&self, _account: &str) -> Result<Vec<RemoteRepository>> {
        Ok(self
            .names
            .iter()
            .map(|name| RemoteRepository {
                name: name.clone(),
                full_name: None,
                default_branch: None,
                fork: None,
            })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "static"
    }
}
