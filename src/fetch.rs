use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

const USER_AGENT: &str = concat!("northmod/", env!("CARGO_PKG_VERSION"));
const FALLBACK_FILE_NAME: &str = "mod.zip";

/// Produces a local archive path from a remote location.
pub trait ArchiveFetcher: Send + Sync {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest_dir).context("create download dir")?;
        let path = dest_dir.join(file_name_for_url(url));
        if path.exists() {
            fs::remove_file(&path).context("remove stale download")?;
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(120))
            .build();
        let response = agent
            .get(url)
            .set("User-Agent", USER_AGENT)
            .call()
            .context("download mod archive")?;
        let mut reader = response.into_reader();
        let mut file = File::create(&path).context("create download file")?;
        io::copy(&mut reader, &mut file).context("write download file")?;
        file.sync_all().context("flush download file")?;

        debug!(url, path = %path.display(), "download finished");
        Ok(path)
    }
}

/// Last path segment of the URL when it names a supported archive, otherwise `mod.zip`.
pub fn file_name_for_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let lower = segment.to_ascii_lowercase();
    let supported = lower.ends_with(".zip") || lower.ends_with(".7z");
    let safe = !segment.is_empty()
        && segment
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_'));
    if supported && safe {
        segment.to_string()
    } else {
        FALLBACK_FILE_NAME.to_string()
    }
}
