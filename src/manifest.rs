//! Local manifest overlay handling
//!
//! The overlay is a `<manifest>` document holding `<project>` entries and
//! `<remove-project>` markers. Entries are matched two different ways and the
//! two are deliberately kept apart:
//!
//! - [`Manifest::upsert_by_path`] treats an entry as "the same checkout location"
//!   and is used for declared dependencies.
//! - [`Manifest::upsert_by_name`] treats an entry as "the same remote repository"
//!   and is used for device trees.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

use crate::xml::Element;

const PROJECT: &str = "project";
const REMOVE_PROJECT: &str = "remove-project";

/// A `<project>` entry of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: Option<String>,
    pub name: Option<String>,
    pub remote: Option<String>,
    pub revision: Option<String>,
}

impl ManifestEntry {
    fn from_element(element: &Element) -> Self {
        Self {
            path: element.get("path").map(str::to_string),
            name: element.get("name").map(str::to_string),
            remote: element.get("remote").map(str::to_string),
            revision: element.get("revision").map(str::to_string),
        }
    }
}

/// A project to be recorded in the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSpec {
    pub name: String,
    pub path: String,
    pub remote: String,
    pub revision: String,
}

impl ProjectSpec {
    fn to_element(&self) -> Element {
        Element::new(PROJECT)
            .with_attribute("path", self.path.as_str())
            .with_attribute("name", self.name.as_str())
            .with_attribute("remote", self.remote.as_str())
            .with_attribute("revision", self.revision.as_str())
    }
}

/// What an upsert did to the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryChange {
    /// Entry already recorded with the requested revision
    Unchanged { name: String, path: String },
    /// Existing entry rewritten in place
    Updated {
        name: String,
        path: String,
        previous_name: Option<String>,
        previous_revision: Option<String>,
    },
    /// New entry appended, optionally masking a project of the default manifest
    Added {
        name: String,
        path: String,
        revision: String,
        replaces: Option<String>,
    },
}

impl EntryChange {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, EntryChange::Unchanged { .. })
    }
}

/// Result of reading a manifest from disk
#[derive(Debug)]
pub enum ManifestLoad {
    Loaded(Manifest),
    Absent,
    Corrupt(anyhow::Error),
}

impl ManifestLoad {
    /// Manifest that is about to be rewritten. A corrupt file is an error so
    /// that its content is never replaced by an empty document.
    pub fn for_update(self, path: &Path) -> Result<Manifest> {
        match self {
            ManifestLoad::Loaded(manifest) => Ok(manifest),
            ManifestLoad::Absent => {
                debug!("No manifest at {}, starting empty", path.display());
                Ok(Manifest::new())
            }
            ManifestLoad::Corrupt(error) => Err(error.context(format!(
                "Manifest {} is unreadable; fix or remove it before running again",
                path.display()
            ))),
        }
    }

    /// Manifest that is only read. A corrupt file is reported and treated as empty.
    pub fn read_only(self, path: &Path) -> Manifest {
        match self {
            ManifestLoad::Loaded(manifest) => manifest,
            ManifestLoad::Absent => Manifest::new(),
            ManifestLoad::Corrupt(error) => {
                warn!("Ignoring unreadable manifest {}: {:#}", path.display(), error);
                Manifest::new()
            }
        }
    }
}

/// An in-memory manifest document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    root: Element,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            root: Element::new("manifest"),
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let root = Element::parse(input)?;
        if root.tag != "manifest" {
            return Err(anyhow!("Expected <manifest> root element, found <{}>", root.tag));
        }
        Ok(Self { root })
    }

    pub fn load(path: &Path) -> ManifestLoad {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return ManifestLoad::Absent,
            Err(e) => {
                return ManifestLoad::Corrupt(
                    anyhow::Error::new(e).context(format!("Failed to read {}", path.display())),
                )
            }
        };

        match Self::parse(&content) {
            Ok(manifest) => ManifestLoad::Loaded(manifest),
            Err(e) => ManifestLoad::Corrupt(e.context(format!("Failed to parse {}", path.display()))),
        }
    }

    /// Pretty-print and overwrite `path`, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create manifest directory: {:?}", parent))?;
        }

        let document = self.to_xml()?;
        std::fs::write(path, document)
            .with_context(|| format!("Failed to write manifest: {:?}", path))?;

        debug!("Wrote manifest {}", path.display());
        Ok(())
    }

    /// Serialize with an XML declaration and two-space indentation
    pub fn to_xml(&self) -> Result<String> {
        let mut root = self.root.clone();
        root.indent(0);
        root.to_document()
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// All `<project>` entries in document order
    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry> + '_ {
        self.projects().map(ManifestEntry::from_element)
    }

    /// Names of the `<remove-project>` markers
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.root
            .children
            .iter()
            .filter(|child| child.tag == REMOVE_PROJECT)
            .filter_map(|child| child.get("name"))
    }

    fn projects(&self) -> impl Iterator<Item = &Element> {
        self.root.children.iter().filter(|child| child.tag == PROJECT)
    }

    fn position_by_path(&self, suffix: &str) -> Option<usize> {
        self.root.children.iter().position(|child| {
            child.tag == PROJECT && child.get("path").is_some_and(|path| path.ends_with(suffix))
        })
    }

    fn position_by_name(&self, suffix: &str) -> Option<usize> {
        self.root.children.iter().position(|child| {
            child.tag == PROJECT && child.get("name").is_some_and(|name| name.ends_with(suffix))
        })
    }

    /// First project whose path ends with `suffix`
    pub fn find_by_path(&self, suffix: &str) -> Option<ManifestEntry> {
        self.position_by_path(suffix)
            .map(|index| ManifestEntry::from_element(&self.root.children[index]))
    }

    /// First project whose name ends with `suffix`
    pub fn find_by_name(&self, suffix: &str) -> Option<ManifestEntry> {
        self.position_by_name(suffix)
            .map(|index| ManifestEntry::from_element(&self.root.children[index]))
    }

    /// Whether a project with exactly this name and revision is recorded
    pub fn contains(&self, name: &str, revision: &str) -> bool {
        self.projects()
            .any(|project| project.get("name") == Some(name) && project.get("revision") == Some(revision))
    }

    /// Path of the first project whose name matches `pattern`
    pub fn path_of_match(&self, pattern: &Regex) -> Option<String> {
        self.projects()
            .find(|project| project.get("name").is_some_and(|name| pattern.is_match(name)))
            .and_then(|project| project.get("path"))
            .map(str::to_string)
    }

    /// Record a project keyed by checkout location.
    ///
    /// An entry whose path ends with the requested path is rewritten in place.
    /// Otherwise the project is appended, preceded by a `<remove-project>` marker
    /// when `defaults` already checks something out at exactly that path.
    pub fn upsert_by_path(&mut self, spec: &ProjectSpec, defaults: &Manifest) -> EntryChange {
        if let Some(index) = self.position_by_path(&spec.path) {
            let existing = &mut self.root.children[index];
            let path = existing.get("path").unwrap_or(spec.path.as_str()).to_string();

            let previous_name = existing.get("name").map(str::to_string);
            let name_changed = previous_name.as_deref() != Some(spec.name.as_str());
            if name_changed {
                existing.set("name", spec.name.as_str());
            }

            let previous_revision = existing.get("revision").map(str::to_string);
            let revision_changed = previous_revision.as_deref() != Some(spec.revision.as_str());
            if revision_changed {
                existing.set("revision", spec.revision.as_str());
            }

            if !name_changed && !revision_changed {
                return EntryChange::Unchanged {
                    name: spec.name.clone(),
                    path,
                };
            }

            return EntryChange::Updated {
                name: spec.name.clone(),
                path,
                previous_name: previous_name.filter(|_| name_changed),
                previous_revision: previous_revision.filter(|_| revision_changed),
            };
        }

        let replaces = defaults
            .find_by_path(&spec.path)
            .filter(|entry| entry.path.as_deref() == Some(spec.path.as_str()))
            .and_then(|entry| entry.name);

        if let Some(name) = &replaces {
            if !self.removed().any(|removed| removed == name) {
                self.root
                    .children
                    .push(Element::new(REMOVE_PROJECT).with_attribute("name", name.as_str()));
            }
        }

        self.root.children.push(spec.to_element());

        EntryChange::Added {
            name: spec.name.clone(),
            path: spec.path.clone(),
            revision: spec.revision.clone(),
            replaces,
        }
    }

    /// Record a project keyed by repository.
    ///
    /// `repository` is the bare repository name; an entry whose name ends with it
    /// only has its revision updated. New entries are stored as `spec.name`.
    pub fn upsert_by_name(&mut self, repository: &str, spec: &ProjectSpec) -> EntryChange {
        if let Some(index) = self.position_by_name(repository) {
            let existing = &mut self.root.children[index];
            let name = existing.get("name").unwrap_or(repository).to_string();
            let path = existing.get("path").unwrap_or(spec.path.as_str()).to_string();

            let previous_revision = existing.get("revision").map(str::to_string);
            if previous_revision.as_deref() == Some(spec.revision.as_str()) {
                return EntryChange::Unchanged { name, path };
            }

            existing.set("revision", spec.revision.as_str());
            return EntryChange::Updated {
                name,
                path,
                previous_name: None,
                previous_revision,
            };
        }

        self.root.children.push(spec.to_element());

        EntryChange::Added {
            name: spec.name.clone(),
            path: spec.path.clone(),
            revision: spec.revision.clone(),
            replaces: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn spec(name: &str, path: &str, revision: &str) -> ProjectSpec {
        ProjectSpec {
            name: name.to_string(),
            path: path.to_string(),
            remote: "github".to_string(),
            revision: revision.to_string(),
        }
    }

    fn overlay() -> Manifest {
        Manifest::parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest>
  <project path="device/acme/widget" name="halogenOS/android_device_acme_widget" remote="github" revision="XOS-7.0" />
  <project path="vendor/foo" name="foo" remote="github" revision="stable" />
  <remove-project name="platform/external/bar" />
</manifest>
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_find_by_path_suffix() {
        let manifest = overlay();
        let entry = manifest.find_by_path("acme/widget").unwrap();
        assert_eq!(entry.name.as_deref(), Some("halogenOS/android_device_acme_widget"));
        assert!(manifest.find_by_path("device/other").is_none());
    }

    #[test]
    fn test_find_by_name_suffix_ignores_remove_markers() {
        let manifest = overlay();
        assert_eq!(
            manifest.find_by_name("android_device_acme_widget").unwrap().path.as_deref(),
            Some("device/acme/widget")
        );
        assert!(manifest.find_by_name("external/bar").is_none());
        assert_eq!(manifest.removed().collect::<Vec<_>>(), vec!["platform/external/bar"]);
    }

    #[test]
    fn test_contains_requires_exact_name_and_revision() {
        let manifest = overlay();
        assert!(manifest.contains("foo", "stable"));
        assert!(!manifest.contains("foo", "XOS-7.0"));
        assert!(!manifest.contains("fo", "stable"));
    }

    #[test]
    fn test_path_of_match() {
        let manifest = overlay();
        let pattern = Regex::new("android_device_.*_widget$").unwrap();
        assert_eq!(manifest.path_of_match(&pattern).as_deref(), Some("device/acme/widget"));

        let missing = Regex::new("android_device_.*_gadget$").unwrap();
        assert!(manifest.path_of_match(&missing).is_none());
    }

    #[test]
    fn test_upsert_existing_is_byte_identical() {
        let mut manifest = overlay();
        let before = manifest.to_xml().unwrap();

        let change = manifest.upsert_by_path(&spec("foo", "vendor/foo", "stable"), &Manifest::new());

        assert_matches!(change, EntryChange::Unchanged { .. });
        assert_eq!(manifest.to_xml().unwrap(), before);
    }

    #[test]
    fn test_upsert_changes_only_revision() {
        let mut manifest = overlay();
        let change = manifest.upsert_by_path(&spec("foo", "vendor/foo", "beta"), &Manifest::new());

        assert_eq!(
            change,
            EntryChange::Updated {
                name: "foo".to_string(),
                path: "vendor/foo".to_string(),
                previous_name: None,
                previous_revision: Some("stable".to_string()),
            }
        );
        let entry = manifest.find_by_path("vendor/foo").unwrap();
        assert_eq!(entry.path.as_deref(), Some("vendor/foo"));
        assert_eq!(entry.remote.as_deref(), Some("github"));
        assert_eq!(entry.revision.as_deref(), Some("beta"));
        assert_eq!(manifest.entries().count(), 2);
    }

    #[test]
    fn test_upsert_by_path_renames_repository() {
        let mut manifest = overlay();
        let change = manifest.upsert_by_path(&spec("someorg/foo", "vendor/foo", "stable"), &Manifest::new());

        assert_matches!(
            change,
            EntryChange::Updated { previous_name: Some(ref old), previous_revision: None, .. } if old == "foo"
        );
        assert!(manifest.contains("someorg/foo", "stable"));
    }

    #[test]
    fn test_upsert_new_entry_into_empty_manifest() {
        let mut manifest = Manifest::new();
        let change = manifest.upsert_by_path(&spec("foo", "vendor/foo", "stable"), &Manifest::new());

        assert_matches!(change, EntryChange::Added { replaces: None, .. });
        let entries: Vec<_> = manifest.entries().collect();
        assert_eq!(
            entries,
            vec![ManifestEntry {
                path: Some("vendor/foo".to_string()),
                name: Some("foo".to_string()),
                remote: Some("github".to_string()),
                revision: Some("stable".to_string()),
            }]
        );
    }

    #[test]
    fn test_upsert_masks_default_manifest_project() {
        let defaults = Manifest::parse(
            r#"<manifest><project path="external/bar" name="platform/external/bar" /></manifest>"#,
        )
        .unwrap();
        let mut manifest = Manifest::new();

        let change = manifest.upsert_by_path(&spec("someorg/bar", "external/bar", "XOS-7.0"), &defaults);

        assert_matches!(change, EntryChange::Added { replaces: Some(ref name), .. } if name == "platform/external/bar");
        assert_eq!(manifest.removed().collect::<Vec<_>>(), vec!["platform/external/bar"]);
        assert_eq!(manifest.root().children[0].tag, "remove-project");
        assert_eq!(manifest.root().children[1].tag, "project");
    }

    #[test]
    fn test_upsert_does_not_mask_on_suffix_only_match() {
        let defaults = Manifest::parse(
            r#"<manifest><project path="prebuilts/external/bar" name="platform/prebuilts/bar" /></manifest>"#,
        )
        .unwrap();
        let mut manifest = Manifest::new();

        let change = manifest.upsert_by_path(&spec("bar", "external/bar", "XOS-7.0"), &defaults);

        assert_matches!(change, EntryChange::Added { replaces: None, .. });
        assert_eq!(manifest.removed().count(), 0);
    }

    #[test]
    fn test_remove_marker_not_duplicated() {
        let defaults = Manifest::parse(
            r#"<manifest><project path="external/bar" name="platform/external/bar" /></manifest>"#,
        )
        .unwrap();
        let mut manifest = overlay();

        manifest.upsert_by_path(&spec("someorg/bar", "external/bar", "XOS-7.0"), &defaults);

        assert_eq!(manifest.removed().count(), 1);
    }

    #[test]
    fn test_upsert_by_name_updates_revision_only() {
        let mut manifest = overlay();
        let change = manifest.upsert_by_name(
            "android_device_acme_widget",
            &spec("someorg/android_device_acme_widget", "device/acme/widget", "XOS-8.1"),
        );

        assert_matches!(change, EntryChange::Updated { ref name, previous_revision: Some(ref rev), .. }
            if name == "halogenOS/android_device_acme_widget" && rev == "XOS-7.0");
        assert!(manifest.contains("halogenOS/android_device_acme_widget", "XOS-8.1"));
    }

    #[test]
    fn test_upsert_by_name_adds_qualified_entry() {
        let mut manifest = Manifest::new();
        let change = manifest.upsert_by_name(
            "android_device_acme_gadget",
            &spec("halogenOS/android_device_acme_gadget", "device/acme/gadget", "XOS-7.0"),
        );

        assert!(change.is_mutation());
        assert!(manifest.contains("halogenOS/android_device_acme_gadget", "XOS-7.0"));

        let again = manifest.upsert_by_name(
            "android_device_acme_gadget",
            &spec("halogenOS/android_device_acme_gadget", "device/acme/gadget", "XOS-7.0"),
        );
        assert!(!again.is_mutation());
    }

    #[test]
    fn test_pretty_print_single_project() {
        let mut manifest = Manifest::new();
        manifest.upsert_by_path(&spec("foo", "vendor/foo", "stable"), &Manifest::new());

        let printed = manifest.to_xml().unwrap();
        assert!(printed.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));

        let reparsed = Manifest::parse(&printed).unwrap();
        assert_eq!(reparsed.root().text.as_deref(), Some("\n  "));
        assert_eq!(reparsed.root().children[0].tail.as_deref(), Some("\n"));
        assert!(reparsed.root().same_structure(manifest.root()));
    }

    #[test]
    fn test_load_distinguishes_absent_and_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.xml");

        assert_matches!(Manifest::load(&path), ManifestLoad::Absent);

        std::fs::write(&path, "<manifest><project name=").unwrap();
        assert_matches!(Manifest::load(&path), ManifestLoad::Corrupt(_));
        assert!(Manifest::load(&path).for_update(&path).is_err());
        assert_eq!(Manifest::load(&path).read_only(&path), Manifest::new());

        std::fs::write(&path, "<other/>").unwrap();
        assert_matches!(Manifest::load(&path), ManifestLoad::Corrupt(_));
    }

    #[test]
    fn test_save_creates_directory_and_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".repo/local_manifests/XOS_manifest.xml");

        let manifest = overlay();
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).for_update(&path).unwrap();
        assert!(loaded.root().same_structure(manifest.root()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), manifest.to_xml().unwrap());
    }
}
