//! On-disk metadata carried by a mod folder: the required `mod.json` descriptor, the
//! optional package-manager `manifest.json`, and the raw author sidecar.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::{fs, path::Path};

pub const DESCRIPTOR_FILE: &str = "mod.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const AUTHOR_FILE: &str = "thunderstore_author.txt";

/// Parsed `mod.json`. Recognized keys are typed; everything else lands in `extra`, so an
/// unknown key can never overwrite a known one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModDescriptor {
    #[serde(rename = "Name", default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(rename = "Version", default, deserialize_with = "lenient_string")]
    pub version: Option<String>,
    #[serde(rename = "Author", default, deserialize_with = "lenient_string")]
    pub author: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version_number: Option<String>,
}

pub fn read_descriptor(path: &Path) -> Result<ModDescriptor> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_descriptor(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn parse_descriptor(raw: &str) -> Result<ModDescriptor> {
    let descriptor = serde_json::from_str(strip_bom(raw))?;
    Ok(descriptor)
}

pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let manifest =
        serde_json::from_str(strip_bom(&raw)).with_context(|| format!("parse {}", path.display()))?;
    Ok(manifest)
}

/// Author sidecar contents, verbatim. Unreadable files count as absent.
pub fn read_author(mod_dir: &Path) -> Option<String> {
    fs::read_to_string(mod_dir.join(AUTHOR_FILE)).ok()
}

pub fn write_author(mod_dir: &Path, author: &str) -> Result<()> {
    fs::write(mod_dir.join(AUTHOR_FILE), author).context("write author file")?;
    Ok(())
}

pub fn has_descriptor(dir: &Path) -> bool {
    dir.join(DESCRIPTOR_FILE).is_file()
}

fn strip_bom(raw: &str) -> &str {
    raw.strip_prefix('\u{feff}').unwrap_or(raw)
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        Value::String(text) => Some(text),
        Value::Null | Value::Bool(false) => None,
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }))
}
