use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ModEvent {
    /// `malformed` only changes how the result is worded to the user.
    Installed { name: String, malformed: bool },
    Failed { path: PathBuf, reason: String },
    Removed {
        name: String,
        manifest_name: Option<String>,
    },
    Toggled { name: String, enabled: bool },
    /// Sent at most once per top-level install.
    Duplicate { name: String },
    ListChanged,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: ModEvent);
}

impl<F> Notifier for F
where
    F: Fn(ModEvent) + Send + Sync,
{
    fn notify(&self, event: ModEvent) {
        self(event)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: ModEvent) {}
}

/// Reports every event through `tracing`; the notifier the CLI runs with.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: ModEvent) {
        match event {
            ModEvent::Installed {
                name,
                malformed: false,
            } => info!("installed mod {name}"),
            ModEvent::Installed {
                name,
                malformed: true,
            } => info!("installed mod {name} (archive layout was unusual, check it loads)"),
            ModEvent::Failed { path, reason } => {
                warn!("failed to install {}: {reason}", path.display())
            }
            ModEvent::Removed {
                name,
                manifest_name,
            } => match manifest_name {
                Some(manifest_name) => info!("removed mod {name} ({manifest_name})"),
                None => info!("removed mod {name}"),
            },
            ModEvent::Toggled { name, enabled } => {
                let state = if enabled { "enabled" } else { "disabled" };
                info!("{state} mod {name}");
            }
            ModEvent::Duplicate { name } => {
                warn!("duplicate mod folder name {name}; later copies get a suffix")
            }
            ModEvent::ListChanged => {}
        }
    }
}
