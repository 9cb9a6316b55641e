//! Recursive install of a folder, a folder of folders, or an archive into the mods
//! directory.
//!
//! One top-level call owns the staging area and the batch of claimed folder names.
//! Recursion is bounded: an archive re-enters on its staging root, a container on each
//! package child, and nothing goes deeper than [`MAX_DEPTH`]. Only package folders claim
//! a name in the batch. A copy that fails halfway leaves the partially written destination
//! folder in place. Copies skip symlinks and archive or VCS debris (`__MACOSX`, `.git`, ...).

use crate::classifier::{self, ArchiveFormat, PackageKind};
use crate::descriptor::{self, MANIFEST_FILE};
use crate::error::{ModError, ModResult};
use crate::notifier::{ModEvent, Notifier};
use crate::stager::StagingArea;
use anyhow::Context;
use filetime::{set_file_mtime, FileTime};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, TryLockError},
    time::UNIX_EPOCH,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const DUPLICATE_SUFFIX: &str = " (dupe)";
/// Container → package. An archive's staging root counts as the container level.
pub const MAX_DEPTH: usize = 2;
/// Where package-manager archives keep their payload next to `manifest.json`.
const PAYLOAD_DIR: &str = "mods";
const FALLBACK_FOLDER_NAME: &str = "unnamed-mod";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerPolicy {
    /// Stop at the first child that installs.
    #[default]
    FirstSuccess,
    InstallAll,
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Written to the author sidecar of every installed folder.
    pub author: Option<String>,
    pub destination_name: Option<String>,
    /// The archive needed reshaping to find the package.
    pub repackaged: bool,
    /// Copied into every installed folder as `manifest.json`.
    pub manifest_source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub folder_name: String,
    pub path: PathBuf,
    pub malformed: bool,
}

/// Folder names claimed during one top-level install.
#[derive(Debug, Default)]
pub struct InstallBatch {
    claimed: HashSet<String>,
    duplicate_reported: bool,
    failure_reported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub name: String,
    /// Set on the first collision of the batch only.
    pub report_duplicate: bool,
}

impl InstallBatch {
    pub fn claim(&mut self, candidate: &str) -> Claim {
        let mut name = candidate.to_string();
        let mut report_duplicate = false;
        while self.claimed.contains(&name) {
            if !self.duplicate_reported {
                self.duplicate_reported = true;
                report_duplicate = true;
            }
            name.push_str(DUPLICATE_SUFFIX);
        }
        self.claimed.insert(name.clone());
        Claim {
            name,
            report_duplicate,
        }
    }
}

/// Held for the duration of one top-level install.
pub struct InstallSlot<'a> {
    _guard: MutexGuard<'a, ()>,
}

pub struct InstallerService {
    mods_dir: PathBuf,
    staging: StagingArea,
    policy: ContainerPolicy,
    notifier: Arc<dyn Notifier>,
    slot: Mutex<()>,
}

impl InstallerService {
    pub fn new(
        mods_dir: impl Into<PathBuf>,
        staging: StagingArea,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            mods_dir: mods_dir.into(),
            staging,
            policy: ContainerPolicy::default(),
            notifier,
            slot: Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: ContainerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn mods_dir(&self) -> &Path {
        &self.mods_dir
    }

    /// Claims the single top-level install slot, failing instead of waiting when another
    /// install holds it.
    pub fn try_begin(&self) -> ModResult<InstallSlot<'_>> {
        match self.slot.try_lock() {
            Ok(guard) => Ok(InstallSlot { _guard: guard }),
            Err(TryLockError::WouldBlock) => Err(ModError::InstallInProgress),
            Err(TryLockError::Poisoned(poisoned)) => Ok(InstallSlot {
                _guard: poisoned.into_inner(),
            }),
        }
    }

    pub fn install(
        &self,
        path: &Path,
        options: InstallOptions,
    ) -> ModResult<Vec<InstalledPackage>> {
        let _slot = self.try_begin()?;
        let mut batch = InstallBatch::default();
        info!("installing from {}", path.display());

        let result = self.install_path(path, &options, 0, &mut batch);
        match &result {
            Ok(installed) => {
                for package in installed {
                    self.notifier.notify(ModEvent::Installed {
                        name: package.folder_name.clone(),
                        malformed: package.malformed,
                    });
                }
                self.notifier.notify(ModEvent::ListChanged);
            }
            Err(err) => {
                warn!("install of {} failed: {err}", path.display());
                if !batch.failure_reported {
                    self.notifier.notify(ModEvent::Failed {
                        path: path.to_path_buf(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        result
    }

    fn install_path(
        &self,
        path: &Path,
        options: &InstallOptions,
        depth: usize,
        batch: &mut InstallBatch,
    ) -> ModResult<Vec<InstalledPackage>> {
        if depth > MAX_DEPTH {
            debug!(depth, "{} is nested too deep", path.display());
            return Err(invalid(path));
        }

        let kind = classifier::classify(path);
        debug!(depth, ?kind, "classified {}", path.display());
        match kind {
            PackageKind::SinglePackage => {
                let package = self.install_single(path, options, batch)?;
                Ok(vec![package])
            }
            PackageKind::BrokenDescriptor { reason } => {
                self.report_failure(batch, path, &reason);
                Err(invalid(path))
            }
            PackageKind::Container => {
                let children = classifier::package_children(path);
                self.install_children(path, children, options, depth, batch)
            }
            PackageKind::Archive(format) if depth == 0 => {
                self.install_archive(path, format, options, batch)
            }
            PackageKind::Archive(_) => {
                debug!("not extracting nested archive {}", path.display());
                Err(invalid(path))
            }
            PackageKind::Invalid => Err(invalid(path)),
        }
    }

    fn install_single(
        &self,
        path: &Path,
        options: &InstallOptions,
        batch: &mut InstallBatch,
    ) -> ModResult<InstalledPackage> {
        let folder_name = options
            .destination_name
            .as_deref()
            .map(sanitize_folder_name)
            .unwrap_or_else(|| folder_name_for(path));
        let dest = self.mods_dir.join(&folder_name);

        if let Err(err) = self.replace_folder(path, &dest, options) {
            self.report_failure(batch, path, &err.to_string());
            return Err(err);
        }

        info!("installed {} as {folder_name}", path.display());
        Ok(InstalledPackage {
            folder_name,
            path: dest,
            malformed: options.repackaged,
        })
    }

    fn replace_folder(&self, source: &Path, dest: &Path, options: &InstallOptions) -> ModResult<()> {
        fs::create_dir_all(&self.mods_dir)?;
        if same_path(source, dest) {
            debug!("{} is already in place", dest.display());
        } else {
            if dest.exists() {
                fs::remove_dir_all(dest)?;
            }
            copy_dir(source, dest).map_err(|source_err| ModError::CopyFailure {
                from: source.to_path_buf(),
                to: dest.to_path_buf(),
                source: source_err,
            })?;
        }

        if let Some(manifest) = &options.manifest_source {
            let target = dest.join(MANIFEST_FILE);
            fs::copy(manifest, &target)
                .context("copy manifest")
                .map_err(|source_err| ModError::CopyFailure {
                    from: manifest.clone(),
                    to: target,
                    source: source_err,
                })?;
        }

        if let Some(author) = &options.author {
            descriptor::write_author(dest, author).map_err(|source_err| ModError::CopyFailure {
                from: source.to_path_buf(),
                to: dest.join(descriptor::AUTHOR_FILE),
                source: source_err,
            })?;
        }
        Ok(())
    }

    fn install_children(
        &self,
        parent: &Path,
        children: Vec<PathBuf>,
        options: &InstallOptions,
        depth: usize,
        batch: &mut InstallBatch,
    ) -> ModResult<Vec<InstalledPackage>> {
        let mut installed = Vec::new();
        for child in children {
            // Wrapper folders are walked through without taking a name in the batch.
            let destination_name = if classifier::classify(&child) == PackageKind::SinglePackage {
                let candidate = folder_name_for(&child);
                let claim = batch.claim(&candidate);
                if claim.report_duplicate {
                    self.notifier.notify(ModEvent::Duplicate { name: candidate });
                }
                Some(claim.name)
            } else {
                None
            };
            let child_options = InstallOptions {
                destination_name,
                ..options.clone()
            };
            match self.install_path(&child, &child_options, depth + 1, batch) {
                Ok(mut packages) => {
                    installed.append(&mut packages);
                    if self.policy == ContainerPolicy::FirstSuccess {
                        break;
                    }
                }
                Err(err) => debug!("skipping {}: {err}", child.display()),
            }
        }

        if installed.is_empty() {
            return Err(invalid(parent));
        }
        Ok(installed)
    }

    fn install_archive(
        &self,
        archive: &Path,
        format: ArchiveFormat,
        options: &InstallOptions,
        batch: &mut InstallBatch,
    ) -> ModResult<Vec<InstalledPackage>> {
        self.staging.reset()?;
        if let Err(err) = self.staging.extract(archive, format) {
            self.report_failure(batch, archive, &format!("{err:#}"));
            return Err(err);
        }

        let root = self.staging.root();
        let manifest = root.join(MANIFEST_FILE);
        if !manifest.is_file() {
            let root_options = InstallOptions {
                destination_name: options
                    .destination_name
                    .clone()
                    .or_else(|| archive_stem(archive)),
                ..options.clone()
            };
            return self.install_path(root, &root_options, 1, batch);
        }

        let payload = root.join(PAYLOAD_DIR);
        if descriptor::has_descriptor(&payload) {
            let declared_name = descriptor::read_manifest(&manifest)
                .ok()
                .and_then(|manifest| manifest.name);
            let payload_options = InstallOptions {
                destination_name: declared_name.or_else(|| archive_stem(archive)),
                repackaged: true,
                manifest_source: Some(manifest),
                ..options.clone()
            };
            return self.install_path(&payload, &payload_options, 1, batch);
        }

        let subdirs = classifier::child_dirs(&payload);
        if subdirs.is_empty() {
            return Err(invalid(archive));
        }
        let payload_options = InstallOptions {
            destination_name: None,
            manifest_source: Some(manifest),
            ..options.clone()
        };
        self.install_children(archive, subdirs, &payload_options, 0, batch)
    }

    fn report_failure(&self, batch: &mut InstallBatch, path: &Path, reason: &str) {
        warn!("failed to install {}: {reason}", path.display());
        batch.failure_reported = true;
        self.notifier.notify(ModEvent::Failed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        });
    }
}

fn invalid(path: &Path) -> ModError {
    ModError::InvalidPackage {
        path: path.to_path_buf(),
    }
}

/// Folder name for `path`: its last component, made safe to use as a directory name.
pub fn folder_name_for(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .or_else(|| {
            fs::canonicalize(path)
                .ok()
                .and_then(|path| path.file_name().map(|name| name.to_string_lossy().to_string()))
        })
        .unwrap_or_default();
    sanitize_folder_name(&name)
}

pub fn sanitize_folder_name(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim_end();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_FOLDER_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

fn archive_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(sanitize_folder_name)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn copy_dir(source: &Path, dest: &Path) -> anyhow::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(source).context("rel path")?;
        if rel
            .components()
            .any(|part| classifier::is_ignored_name(&part.as_os_str().to_string_lossy()))
        {
            debug!("not copying {}", entry.path().display());
            continue;
        }
        let target = dest.join(rel);
        if entry.file_type().is_symlink() {
            debug!("not copying symlink {}", entry.path().display());
            continue;
        }
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).context("create dir")?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).context("create file dir")?;
            }
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copy {}", entry.path().display()))?;
            preserve_mtime(entry.path(), &target);
        }
    }
    Ok(())
}

fn preserve_mtime(source: &Path, dest: &Path) {
    let Ok(meta) = fs::metadata(source) else {
        return;
    };
    let Ok(modified) = meta.modified() else {
        return;
    };
    let Ok(duration) = modified.duration_since(UNIX_EPOCH) else {
        return;
    };
    let mtime = FileTime::from_unix_time(duration.as_secs() as i64, 0);
    let _ = set_file_mtime(dest, mtime);
}
