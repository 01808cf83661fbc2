//! roomservice - device tree and dependency fetcher for repo checkouts
//!
//! Given a product such as `xos_widget`, roomservice finds the device tree
//! `android_device_<manufacturer>_widget` on GitHub, records it in the local
//! manifest overlay, syncs it with `repo`, and then adds and syncs every
//! repository the tree declares in its `.dependencies` file.
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`github`]: GitHub repository listing and authentication
//! - [`discovery`]: Device tree naming convention and the lister seam
//! - [`manifest`]: Overlay manifest reading, lookup and upserts
//! - [`dependencies`]: Dependency declaration parsing and resolution
//! - [`sync`]: The external sync command
//! - [`service`]: Orchestration of a whole run

pub mod config;
pub mod dependencies;
pub mod discovery;
pub mod github;
pub mod invocation;
pub mod manifest;
pub mod service;
pub mod sync;
pub mod xml;

pub use config::Config;
pub use dependencies::{DependencyResolver, Resolution, ResolveReport};
pub use discovery::{DeviceRepository, RepositoryLister};
pub use github::GitHubClient;
pub use invocation::{Invocation, Mode};
pub use manifest::{EntryChange, Manifest, ManifestLoad};
pub use service::{Outcome, RoomService};
pub use sync::{RepoSync, SyncError, SyncStatus, Syncer};
