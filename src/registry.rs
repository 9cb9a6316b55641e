use crate::classifier;
use crate::descriptor::{self, DESCRIPTOR_FILE, MANIFEST_FILE};
use crate::error::ModResult;
use crate::game::{GamePaths, UNKNOWN_VERSION};
use crate::state::StateStore;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

const UNKNOWN_NAME: &str = "unknown";
const RESERVED_KEYS: [&str; 6] = [
    "FolderName",
    "Name",
    "Version",
    "Author",
    "ManifestName",
    "Disabled",
];

/// A view of one installed mod folder merged with its enable state. Rebuilt on every scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModPackage {
    pub folder_name: String,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    pub manifest_name: Option<String>,
    pub disabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModList {
    pub enabled: Vec<ModPackage>,
    pub disabled: Vec<ModPackage>,
    pub all: Vec<ModPackage>,
}

#[derive(Debug, Clone)]
pub struct Registry {
    mods_dir: PathBuf,
    state: StateStore,
}

impl Registry {
    pub fn new(paths: &GamePaths) -> Self {
        Self {
            mods_dir: paths.mods_dir.clone(),
            state: StateStore::new(paths),
        }
    }

    pub fn mods_dir(&self) -> &Path {
        &self.mods_dir
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Scans the mods directory one level deep, in listing order.
    pub fn list(&self) -> ModResult<ModList> {
        if !self.mods_dir.exists() {
            fs::create_dir_all(&self.mods_dir)?;
            return Ok(ModList::default());
        }

        let mut enabled = Vec::new();
        let mut disabled = Vec::new();
        for dir in classifier::child_dirs(&self.mods_dir) {
            let Some(package) = self.read_package(&dir)? else {
                continue;
            };
            if package.disabled {
                disabled.push(package);
            } else {
                enabled.push(package);
            }
        }

        let all: Vec<ModPackage> = enabled.iter().chain(disabled.iter()).cloned().collect();
        warn_on_shared_names(&all);
        debug!(
            enabled = enabled.len(),
            disabled = disabled.len(),
            "scanned mods directory"
        );
        Ok(ModList {
            enabled,
            disabled,
            all,
        })
    }

    /// First package whose declared name matches, or `None`.
    pub fn get(&self, name: &str) -> ModResult<Option<ModPackage>> {
        Ok(self.list()?.all.into_iter().find(|package| package.name == name))
    }

    fn read_package(&self, dir: &Path) -> ModResult<Option<ModPackage>> {
        let Some(folder_name) = dir.file_name().and_then(|name| name.to_str()) else {
            return Ok(None);
        };
        if !descriptor::has_descriptor(dir) {
            return Ok(None);
        }
        let descriptor = match descriptor::read_descriptor(&dir.join(DESCRIPTOR_FILE)) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                warn!("skipping {folder_name}: {err:#}");
                return Ok(None);
            }
        };

        let mut extra = descriptor.extra;
        extra.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        let mut package = ModPackage {
            folder_name: folder_name.to_string(),
            name: descriptor.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            version: descriptor
                .version
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            author: descriptor.author,
            manifest_name: None,
            disabled: false,
            extra,
        };
        package.disabled = !self.state.get(&package.name)?;

        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            match descriptor::read_manifest(&manifest_path) {
                Ok(manifest) => {
                    package.manifest_name = manifest.name;
                    if package.version == UNKNOWN_VERSION {
                        if let Some(version) = manifest.version_number {
                            package.version = version;
                        }
                    }
                }
                Err(err) => debug!("ignoring manifest for {folder_name}: {err:#}"),
            }
        }

        if let Some(author) = descriptor::read_author(dir) {
            package.author = Some(author);
        }

        Ok(Some(package))
    }
}

fn warn_on_shared_names(packages: &[ModPackage]) {
    let mut folders_by_name: HashMap<&str, Vec<&str>> = HashMap::new();
    for package in packages {
        folders_by_name
            .entry(package.name.as_str())
            .or_default()
            .push(package.folder_name.as_str());
    }
    for (name, folders) in folders_by_name {
        if folders.len() > 1 {
            warn!(
                "mods {} all declare the name {name} and share one enable state",
                folders.join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_mod(mods_dir: &Path, folder: &str, body: &str) -> PathBuf {
        let dir = mods_dir.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), body).unwrap();
        dir
    }

    #[test]
    fn missing_mods_dir_is_created_and_empty() {
        let root = TempDir::new().unwrap();
        let paths = GamePaths::new(root.path());
        let registry = Registry::new(&paths);
        assert_eq!(registry.list().unwrap(), ModList::default());
        assert!(paths.mods_dir.is_dir());
    }

    #[test]
    fn partitions_by_state() {
        let root = TempDir::new().unwrap();
        let paths = GamePaths::new(root.path());
        write_mod(&paths.mods_dir, "Alpha", r#"{"Name": "Alpha"}"#);
        write_mod(&paths.mods_dir, "Beta", r#"{"Name": "Beta"}"#);
        fs::write(&paths.state_file, r#"{"Beta": false}"#).unwrap();

        let list = Registry::new(&paths).list().unwrap();
        let names = |packages: &[ModPackage]| {
            packages
                .iter()
                .map(|package| package.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&list.enabled), vec!["Alpha"]);
        assert_eq!(names(&list.disabled), vec!["Beta"]);
        assert_eq!(names(&list.all), vec!["Alpha", "Beta"]);
        assert!(list.disabled[0].disabled);
    }

    #[test]
    fn defaults_and_metadata_overlays() {
        let root = TempDir::new().unwrap();
        let paths = GamePaths::new(root.path());
        write_mod(&paths.mods_dir, "Bare", "{}");
        let tagged = write_mod(
            &paths.mods_dir,
            "Tagged",
            r#"{"Name": "Tagged", "LoadPriority": 1, "Disabled": true}"#,
        );
        fs::write(
            tagged.join(MANIFEST_FILE),
            r#"{"name": "Tagged_TS", "version_number": "4.0.0"}"#,
        )
        .unwrap();
        descriptor::write_author(&tagged, "modder").unwrap();

        let registry = Registry::new(&paths);
        let bare = registry.get("unknown").unwrap().unwrap();
        assert_eq!(bare.folder_name, "Bare");
        assert_eq!(bare.version, "unknown");
        assert_eq!(bare.author, None);

        let tagged = registry.get("Tagged").unwrap().unwrap();
        assert_eq!(tagged.version, "4.0.0");
        assert_eq!(tagged.manifest_name.as_deref(), Some("Tagged_TS"));
        assert_eq!(tagged.author.as_deref(), Some("modder"));
        assert_eq!(tagged.extra.get("LoadPriority"), Some(&Value::from(1)));
        assert!(!tagged.extra.contains_key("Disabled"));
        assert!(!tagged.disabled);
    }

    #[test]
    fn declared_version_beats_manifest() {
        let root = TempDir::new().unwrap();
        let paths = GamePaths::new(root.path());
        let dir = write_mod(&paths.mods_dir, "V", r#"{"Name": "V", "Version": "1.0.0"}"#);
        fs::write(dir.join(MANIFEST_FILE), r#"{"version_number": "9.9.9"}"#).unwrap();
        let package = Registry::new(&paths).get("V").unwrap().unwrap();
        assert_eq!(package.version, "1.0.0");
    }

    #[test]
    fn skips_files_and_unparsable_folders() {
        let root = TempDir::new().unwrap();
        let paths = GamePaths::new(root.path());
        fs::create_dir_all(&paths.mods_dir).unwrap();
        fs::write(paths.mods_dir.join("notes.txt"), "hi").unwrap();
        write_mod(&paths.mods_dir, "Broken", "{ nope");
        fs::create_dir_all(paths.mods_dir.join("Empty")).unwrap();
        assert!(Registry::new(&paths).list().unwrap().all.is_empty());
    }

    #[test]
    fn unknown_name_is_not_found() {
        let root = TempDir::new().unwrap();
        let paths = GamePaths::new(root.path());
        write_mod(&paths.mods_dir, "Alpha", r#"{"Name": "Alpha"}"#);
        assert_eq!(Registry::new(&paths).get("Gamma").unwrap(), None);
    }
}
