use std::{io, path::PathBuf};
use thiserror::Error;

pub type ModResult<T> = std::result::Result<T, ModError>;

#[derive(Debug, Error)]
pub enum ModError {
    #[error("Northstar is not installed in {}", .game_path.display())]
    PrerequisiteMissing { game_path: PathBuf },

    #[error("not a valid mod: {}", .path.display())]
    InvalidPackage { path: PathBuf },

    #[error("failed to copy {} to {}", .from.display(), .to.display())]
    CopyFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to extract {}", .archive.display())]
    ExtractFailure {
        archive: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("mod not found: {0}")]
    PackageNotFound(String),

    #[error("another install is already running")]
    InstallInProgress,

    #[error("mod state file {} is unusable", .path.display())]
    State {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("download failed: {url}")]
    Download {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ModError {
    pub fn exit_code(&self) -> i32 {
        1
    }

    pub(crate) fn state(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        ModError::State {
            path: path.into(),
            source: source.into(),
        }
    }
}
