pub mod classifier;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod game;
pub mod installer;
pub mod logging;
pub mod manager;
pub mod notifier;
pub mod registry;
pub mod stager;
pub mod state;

pub use error::{ModError, ModResult};
pub use installer::{ContainerPolicy, InstallOptions, InstalledPackage};
pub use manager::{ModManager, ALL_MODS};
pub use notifier::{ModEvent, Notifier};
pub use registry::{ModList, ModPackage};
