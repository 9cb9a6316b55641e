use crate::classifier::ArchiveFormat;
use crate::error::{ModError, ModResult};
use anyhow::{Context, Result};
use filetime::{set_file_mtime, FileTime};
use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use time::{Date, Month, PrimitiveDateTime, Time as TimeOfDay};
use tracing::debug;

/// The single extraction workspace. Only a top-level install may reset it, and extraction
/// returns only after every entry has been written, so callers can read the tree as soon
/// as `extract` returns `Ok`.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reset(&self) -> ModResult<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        debug!(staging = %self.root.display(), "staging area reset");
        Ok(())
    }

    pub fn extract(&self, archive: &Path, format: ArchiveFormat) -> ModResult<()> {
        debug!(
            archive = %archive.display(),
            format = format.label(),
            "extracting into staging area"
        );
        let result = match format {
            ArchiveFormat::Zip => self.unpack_zip(archive),
            ArchiveFormat::SevenZip => self.unpack_7z(archive),
        };
        result.map_err(|source| ModError::ExtractFailure {
            archive: archive.to_path_buf(),
            source,
        })
    }

    /// Entries whose names would escape the staging root are dropped.
    fn unpack_zip(&self, archive: &Path) -> Result<()> {
        let file = fs::File::open(archive).context("open zip")?;
        let mut zip = zip::ZipArchive::new(file).context("read zip")?;

        let mut written = 0usize;
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).context("read zip entry")?;
            let Some(relative) = entry.enclosed_name() else {
                debug!(entry = entry.name(), "skipping zip entry outside staging root");
                continue;
            };
            let target = self.root.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target).context("create staged dir")?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).context("create staged dir")?;
            }
            let mut out = fs::File::create(&target).context("create staged file")?;
            io::copy(&mut entry, &mut out).context("write staged file")?;
            if let Some(mtime) = entry.last_modified().and_then(entry_mtime) {
                let _ = set_file_mtime(&target, mtime);
            }
            written += 1;
        }

        debug!(files = written, "zip unpacked");
        Ok(())
    }

    fn unpack_7z(&self, archive: &Path) -> Result<()> {
        if self.run_system_7z(archive)? {
            return Ok(());
        }
        sevenz_rust::decompress_file(archive, &self.root)
            .with_context(|| format!("decompress {}", archive.display()))
    }

    /// Extracts with the `7z` binary. `false` means it is not on `PATH`.
    fn run_system_7z(&self, archive: &Path) -> Result<bool> {
        let spawned = Command::new("7z")
            .arg("x")
            .arg("-y")
            .arg(format!("-o{}", self.root.display()))
            .arg(archive)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();
        let output = match spawned {
            Ok(output) => output,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("7z not found, using built-in decoder");
                return Ok(false);
            }
            Err(err) => return Err(err).context("launch 7z"),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("7z exited with {}: {}", output.status, stderr.trim());
        }
        Ok(true)
    }
}

/// Zip timestamps carry no zone; they are read as UTC.
fn entry_mtime(stamp: zip::DateTime) -> Option<FileTime> {
    let month = Month::try_from(stamp.month()).ok()?;
    let date = Date::from_calendar_date(i32::from(stamp.year()), month, stamp.day()).ok()?;
    let time = TimeOfDay::from_hms(stamp.hour(), stamp.minute(), stamp.second()).ok()?;
    let unix = PrimitiveDateTime::new(date, time).assume_utc().unix_timestamp();
    Some(FileTime::from_unix_time(unix, 0))
}
