use crate::error::{ModError, ModResult};
use crate::fetch::ArchiveFetcher;
use crate::game::{self, GamePaths};
use crate::installer::{ContainerPolicy, InstallOptions, InstallerService, InstalledPackage};
use crate::notifier::{ModEvent, Notifier};
use crate::registry::{ModList, ModPackage, Registry};
use crate::stager::StagingArea;
use crate::state::StateStore;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

/// Selects every registered mod in `remove` and `toggle`.
pub const ALL_MODS: &str = "allmods";

/// Entry point for every mod operation against one game directory. Each call first checks
/// that the game framework is installed and touches nothing when it isn't.
pub struct ModManager {
    paths: GamePaths,
    registry: Registry,
    installer: InstallerService,
    notifier: Arc<dyn Notifier>,
}

impl ModManager {
    pub fn new(
        game_root: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        policy: ContainerPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let paths = GamePaths::new(game_root);
        let installer = InstallerService::new(
            paths.mods_dir.clone(),
            StagingArea::new(staging_dir),
            Arc::clone(&notifier),
        )
        .with_policy(policy);
        Self {
            registry: Registry::new(&paths),
            paths,
            installer,
            notifier,
        }
    }

    pub fn paths(&self) -> &GamePaths {
        &self.paths
    }

    pub fn state(&self) -> &StateStore {
        self.registry.state()
    }

    pub fn version(&self) -> String {
        game::detect_version(&self.paths.game_root)
    }

    pub fn list(&self) -> ModResult<ModList> {
        self.ensure_installed()?;
        self.registry.list()
    }

    pub fn get(&self, name: &str) -> ModResult<Option<ModPackage>> {
        self.ensure_installed()?;
        self.registry.get(name)
    }

    pub fn install(
        &self,
        path: &Path,
        options: InstallOptions,
    ) -> ModResult<Vec<InstalledPackage>> {
        self.ensure_installed()?;
        self.installer.install(path, options)
    }

    /// Downloads with `fetcher`, then installs the archive with `author` recorded.
    pub fn install_from_url(
        &self,
        fetcher: &dyn ArchiveFetcher,
        url: &str,
        author: Option<String>,
        download_dir: &Path,
    ) -> ModResult<Vec<InstalledPackage>> {
        self.ensure_installed()?;
        let archive = fetcher
            .fetch(url, download_dir)
            .map_err(|source| ModError::Download {
                url: url.to_string(),
                source,
            })?;
        let options = InstallOptions {
            author,
            ..InstallOptions::default()
        };
        self.installer.install(&archive, options)
    }

    /// Deletes the folder of the named mod. [`ALL_MODS`] removes everything registered
    /// at the time of the call. Returns the removed folder names.
    pub fn remove(&self, name: &str) -> ModResult<Vec<String>> {
        self.ensure_installed()?;
        if name != ALL_MODS {
            return Ok(vec![self.remove_one(name)?]);
        }

        let snapshot = self.registry.list()?.all;
        let mut removed = Vec::with_capacity(snapshot.len());
        for package in &snapshot {
            removed.push(self.remove_one(&package.name)?);
        }
        info!("removed {} mod(s)", removed.len());
        Ok(removed)
    }

    /// Flips the stored state of the named mod. [`ALL_MODS`] flips every registered mod
    /// on its own; it does not force them all one way. Returns each name with its new state.
    pub fn toggle(&self, name: &str) -> ModResult<Vec<(String, bool)>> {
        self.ensure_installed()?;
        let names = if name == ALL_MODS {
            let snapshot = self.registry.list()?.all;
            let mut seen = HashSet::new();
            snapshot
                .into_iter()
                .map(|package| package.name)
                .filter(|name| seen.insert(name.clone()))
                .collect()
        } else {
            vec![name.to_string()]
        };

        let mut toggled = Vec::with_capacity(names.len());
        for name in names {
            let enabled = self.state().toggle(&name)?;
            self.notifier.notify(ModEvent::Toggled {
                name: name.clone(),
                enabled,
            });
            toggled.push((name, enabled));
        }
        self.notifier.notify(ModEvent::ListChanged);
        Ok(toggled)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> ModResult<()> {
        self.ensure_installed()?;
        self.state().set(name, enabled)?;
        self.notifier.notify(ModEvent::Toggled {
            name: name.to_string(),
            enabled,
        });
        self.notifier.notify(ModEvent::ListChanged);
        Ok(())
    }

    /// Rewrites the state file so every registered mod is enabled. Meant for recovering
    /// from a damaged state file, not for everyday toggling.
    pub fn regenerate(&self) -> ModResult<()> {
        self.ensure_installed()?;
        let list = self.registry.list()?;
        self.state()
            .regenerate(list.all.iter().map(|package| package.name.as_str()))?;
        warn!("mod state regenerated; every mod is enabled again");
        self.notifier.notify(ModEvent::ListChanged);
        Ok(())
    }

    fn remove_one(&self, name: &str) -> ModResult<String> {
        let package = self
            .registry
            .get(name)?
            .ok_or_else(|| ModError::PackageNotFound(name.to_string()))?;
        let dir = self.paths.mods_dir.join(&package.folder_name);
        if !dir.is_dir() {
            return Err(ModError::PackageNotFound(name.to_string()));
        }

        let manifest_name = package.manifest_name.clone();
        fs::remove_dir_all(&dir)?;
        info!("removed {name} ({})", package.folder_name);

        self.notifier.notify(ModEvent::Removed {
            name: name.to_string(),
            manifest_name,
        });
        self.notifier.notify(ModEvent::ListChanged);
        Ok(package.folder_name)
    }

    fn ensure_installed(&self) -> ModResult<()> {
        if game::is_installed(&self.paths.game_root) {
            return Ok(());
        }
        warn!(
            "{} not found in {}",
            game::GAME_NAME,
            self.paths.game_root.display()
        );
        Err(ModError::PrerequisiteMissing {
            game_path: self.paths.game_root.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DESCRIPTOR_FILE, MANIFEST_FILE};
    use crate::notifier::NullNotifier;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn installed_game() -> TempDir {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("ns_version.txt"), "v1.20.0").unwrap();
        root
    }

    fn manager(root: &TempDir) -> ModManager {
        ModManager::new(
            root.path(),
            root.path().join("staging"),
            ContainerPolicy::FirstSuccess,
            Arc::new(NullNotifier),
        )
    }

    fn write_installed(root: &TempDir, folder: &str, name: &str) -> PathBuf {
        let dir = GamePaths::new(root.path()).mods_dir.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DESCRIPTOR_FILE), format!(r#"{{"Name": "{name}"}}"#)).unwrap();
        dir
    }

    #[test]
    fn missing_game_blocks_every_operation() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root);
        let source = root.path().join("Some.Mod");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join(DESCRIPTOR_FILE), "{}").unwrap();

        assert!(matches!(manager.list(), Err(ModError::PrerequisiteMissing { .. })));
        assert!(matches!(manager.get("x"), Err(ModError::PrerequisiteMissing { .. })));
        assert!(matches!(
            manager.install(&source, InstallOptions::default()),
            Err(ModError::PrerequisiteMissing { .. })
        ));
        assert!(matches!(manager.remove(ALL_MODS), Err(ModError::PrerequisiteMissing { .. })));
        assert!(matches!(manager.toggle("x"), Err(ModError::PrerequisiteMissing { .. })));
        assert!(!manager.paths().mods_dir.exists());
        assert!(!manager.paths().state_file.exists());
    }

    #[test]
    fn remove_reports_manifest_name() {
        let root = installed_game();
        let dir = write_installed(&root, "Folder", "Declared");
        fs::write(dir.join(MANIFEST_FILE), r#"{"name": "Declared_TS"}"#).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let manager = ModManager::new(
            root.path(),
            root.path().join("staging"),
            ContainerPolicy::FirstSuccess,
            Arc::new(move |event: ModEvent| sink.lock().unwrap().push(event)),
        );

        assert_eq!(manager.remove("Declared").unwrap(), vec!["Folder"]);
        assert!(!dir.exists());
        assert!(events.lock().unwrap().contains(&ModEvent::Removed {
            name: "Declared".into(),
            manifest_name: Some("Declared_TS".into()),
        }));
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let root = installed_game();
        let manager = manager(&root);
        assert!(matches!(
            manager.remove("Ghost"),
            Err(ModError::PackageNotFound(name)) if name == "Ghost"
        ));
    }

    #[test]
    fn remove_all_clears_registry() {
        let root = installed_game();
        write_installed(&root, "A", "Alpha");
        write_installed(&root, "B", "Beta");
        write_installed(&root, "B2", "Beta");
        let manager = manager(&root);

        let removed = manager.remove(ALL_MODS).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(manager.list().unwrap().all.is_empty());
    }

    #[test]
    fn toggle_all_inverts_each_mod() {
        let root = installed_game();
        write_installed(&root, "A", "Alpha");
        write_installed(&root, "B", "Beta");
        let manager = manager(&root);
        manager.set_enabled("Beta", false).unwrap();

        let mut toggled = manager.toggle(ALL_MODS).unwrap();
        toggled.sort();
        assert_eq!(
            toggled,
            vec![("Alpha".to_string(), false), ("Beta".to_string(), true)]
        );
    }

    #[test]
    fn toggle_all_flips_shared_names_once() {
        let root = installed_game();
        write_installed(&root, "One", "Shared");
        write_installed(&root, "Two", "Shared");
        let manager = manager(&root);

        assert_eq!(
            manager.toggle(ALL_MODS).unwrap(),
            vec![("Shared".to_string(), false)]
        );
        assert!(!manager.state().get("Shared").unwrap());
    }

    #[test]
    fn regenerate_enables_everything() {
        let root = installed_game();
        write_installed(&root, "A", "Alpha");
        let manager = manager(&root);
        manager.set_enabled("Alpha", false).unwrap();
        manager.set_enabled("Stale", false).unwrap();

        manager.regenerate().unwrap();

        let raw = fs::read_to_string(&manager.paths().state_file).unwrap();
        assert_eq!(raw, r#"{"Alpha":true}"#);
        assert_eq!(manager.list().unwrap().enabled.len(), 1);
    }

    #[test]
    fn regenerate_recovers_corrupt_state_file() {
        let root = installed_game();
        write_installed(&root, "A", "Alpha");
        let manager = manager(&root);
        fs::write(&manager.paths().state_file, "{corrupt").unwrap();

        assert_eq!(manager.list().unwrap().enabled.len(), 1);
        manager.regenerate().unwrap();

        let raw = fs::read_to_string(&manager.paths().state_file).unwrap();
        assert_eq!(raw, r#"{"Alpha":true}"#);
        assert_eq!(manager.toggle("Alpha").unwrap(), vec![("Alpha".to_string(), false)]);
    }
}
