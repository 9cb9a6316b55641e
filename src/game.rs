use crate::descriptor;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const GAME_NAME: &str = "Northstar";
pub const UNKNOWN_VERSION: &str = "unknown";

const VERSION_FILE: &str = "ns_version.txt";
const CLIENT_MOD: &str = "Northstar.Client";

#[derive(Debug, Clone)]
pub struct GamePaths {
    pub game_root: PathBuf,
    pub mods_dir: PathBuf,
    pub state_file: PathBuf,
}

impl GamePaths {
    pub fn new(game_root: impl Into<PathBuf>) -> Self {
        let game_root = game_root.into();
        let profile_dir = game_root.join("R2Northstar");
        Self {
            mods_dir: profile_dir.join("mods"),
            state_file: profile_dir.join("enabledmods.json"),
            game_root,
        }
    }
}

/// Installed framework version, or `unknown` when it can't be found.
pub fn detect_version(game_root: &Path) -> String {
    if let Ok(raw) = fs::read_to_string(game_root.join(VERSION_FILE)) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let client_descriptor = GamePaths::new(game_root)
        .mods_dir
        .join(CLIENT_MOD)
        .join(descriptor::DESCRIPTOR_FILE);
    if let Ok(descriptor) = descriptor::read_descriptor(&client_descriptor) {
        if let Some(version) = descriptor.version {
            return version;
        }
    }

    UNKNOWN_VERSION.to_string()
}

pub fn is_installed(game_root: &Path) -> bool {
    detect_version(game_root) != UNKNOWN_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn layout_is_relative_to_game_root() {
        let paths = GamePaths::new("/games/Titanfall2");
        assert_eq!(paths.mods_dir, PathBuf::from("/games/Titanfall2/R2Northstar/mods"));
        assert_eq!(
            paths.state_file,
            PathBuf::from("/games/Titanfall2/R2Northstar/enabledmods.json")
        );
    }

    #[test]
    fn version_file_wins() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join(VERSION_FILE), "v1.19.4\n").unwrap();
        assert_eq!(detect_version(root.path()), "v1.19.4");
        assert!(is_installed(root.path()));
    }

    #[test]
    fn falls_back_to_client_mod_version() {
        let root = TempDir::new().unwrap();
        let client = GamePaths::new(root.path()).mods_dir.join(CLIENT_MOD);
        fs::create_dir_all(&client).unwrap();
        fs::write(
            client.join("mod.json"),
            r#"{"Name": "Northstar.Client", "Version": "1.20.0"}"#,
        )
        .unwrap();
        assert_eq!(detect_version(root.path()), "1.20.0");
    }

    #[test]
    fn empty_directory_is_not_installed() {
        let root = TempDir::new().unwrap();
        assert_eq!(detect_version(root.path()), UNKNOWN_VERSION);
        assert!(!is_installed(root.path()));
    }
}
