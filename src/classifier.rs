use crate::descriptor::{self, DESCRIPTOR_FILE};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("zip") {
            Some(ArchiveFormat::Zip)
        } else if ext.eq_ignore_ascii_case("7z") {
            Some(ArchiveFormat::SevenZip)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZip => "7z",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageKind {
    SinglePackage,
    /// `mod.json` is present but does not parse.
    BrokenDescriptor { reason: String },
    Container,
    Archive(ArchiveFormat),
    Invalid,
}

pub fn classify(path: &Path) -> PackageKind {
    if path.is_file() {
        return match ArchiveFormat::from_path(path) {
            Some(format) => PackageKind::Archive(format),
            None => PackageKind::Invalid,
        };
    }
    if !path.is_dir() {
        return PackageKind::Invalid;
    }

    if descriptor::has_descriptor(path) {
        return match descriptor::read_descriptor(&path.join(DESCRIPTOR_FILE)) {
            Ok(_) => PackageKind::SinglePackage,
            Err(err) => PackageKind::BrokenDescriptor {
                reason: format!("{err:#}"),
            },
        };
    }

    if package_children(path).is_empty() {
        PackageKind::Invalid
    } else {
        PackageKind::Container
    }
}

/// Immediate child directories carrying a `mod.json`, in directory-listing order.
pub fn package_children(dir: &Path) -> Vec<PathBuf> {
    child_dirs(dir)
        .into_iter()
        .filter(|child| descriptor::has_descriptor(child))
        .collect()
}

/// Immediate child directories, in directory-listing order. The order is whatever the
/// platform returns.
pub fn child_dirs(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| !is_ignored_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .filter(|path| path.is_dir())
        .collect()
}

/// Archive-tool and VCS debris that never belongs in a mod folder.
pub fn is_ignored_name(name: &str) -> bool {
    name.eq_ignore_ascii_case("__MACOSX")
        || name.eq_ignore_ascii_case(".ds_store")
        || name.eq_ignore_ascii_case("thumbs.db")
        || name == ".git"
        || name == ".svn"
}
