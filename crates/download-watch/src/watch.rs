//! Download synchronization by filesystem polling.
//!
//! The download directory is the rendezvous point between the browser and
//! the engine. A watch snapshots the completed files immediately before the
//! triggering action; afterwards, the first name outside the snapshot that
//! is no longer in progress and holds a stable size is the artifact that
//! action produced. Snapshot-before-trigger is the whole concurrency story:
//! no locks, downloads are attributed by set difference.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::errors::DownloadError;

/// Filename filter: optional prefix plus case-insensitive suffixes
/// (any-of; an empty list accepts every suffix).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NameFilter {
    pub prefix: Option<String>,
    pub suffixes: Vec<String>,
}

impl NameFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            suffixes: Vec::new(),
        }
    }

    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            prefix: None,
            suffixes: vec![suffix.into()],
        }
    }

    pub fn and_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffixes.push(suffix.into());
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        if let Some(prefix) = &self.prefix {
            if !name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if self.suffixes.is_empty() {
            return true;
        }
        let lower = name.to_lowercase();
        self.suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_lowercase()))
    }
}

/// Watcher tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Suffixes marking an in-progress browser download.
    pub in_progress_suffixes: Vec<String>,
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            in_progress_suffixes: vec![".crdownload".to_string()],
            poll_interval_ms: 350,
        }
    }
}

impl WatchConfig {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn is_in_progress(&self, name: &str) -> bool {
        self.in_progress_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
    }
}

/// Before-snapshot of a download directory, taken immediately before the
/// action that triggers the download.
#[derive(Debug)]
pub struct DownloadWatch {
    dir: PathBuf,
    filter: NameFilter,
    cfg: WatchConfig,
    before: HashSet<String>,
}

#[derive(Debug)]
struct CompletedFile {
    name: String,
    size: u64,
    modified: SystemTime,
}

impl DownloadWatch {
    /// Snapshot the completed matching filenames in `dir`.
    pub fn begin(dir: impl Into<PathBuf>, filter: NameFilter) -> Result<Self, DownloadError> {
        Self::begin_with(dir, filter, WatchConfig::default())
    }

    pub fn begin_with(
        dir: impl Into<PathBuf>,
        filter: NameFilter,
        cfg: WatchConfig,
    ) -> Result<Self, DownloadError> {
        let dir = dir.into();
        let before = completed_files(&dir, &filter, &cfg)?
            .into_iter()
            .map(|file| file.name)
            .collect();
        Ok(Self {
            dir,
            filter,
            cfg,
            before,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait for a new completed artifact.
    ///
    /// A file counts as complete once no in-progress marker refers to it
    /// and its size was identical across two consecutive polls (slow
    /// writers produce their final name before their final byte). Among
    /// several candidates the most recently modified wins.
    pub async fn await_new_file(&self, timeout: Duration) -> Result<PathBuf, DownloadError> {
        let deadline = Instant::now() + timeout;
        let mut last_sizes: HashMap<String, u64> = HashMap::new();

        loop {
            let mut fresh: Vec<CompletedFile> = completed_files(&self.dir, &self.filter, &self.cfg)?
                .into_iter()
                .filter(|file| !self.before.contains(&file.name))
                .collect();
            fresh.sort_by_key(|file| file.modified);

            if let Some(candidate) = fresh.pop() {
                match last_sizes.get(&candidate.name) {
                    Some(size) if *size == candidate.size => {
                        info!(name = %candidate.name, size = candidate.size, "download complete");
                        return Ok(self.dir.join(&candidate.name));
                    }
                    _ => {
                        debug!(name = %candidate.name, size = candidate.size, "candidate not stable yet");
                        last_sizes.insert(candidate.name, candidate.size);
                    }
                }
            }

            if Instant::now() >= deadline {
                return Err(DownloadError::DownloadTimeout(format!(
                    "no new stable file in {} within {:?}",
                    self.dir.display(),
                    timeout
                )));
            }
            sleep(self.cfg.poll_interval()).await;
        }
    }
}

/// Wait until no in-progress download remains in `dir`. Used when several
/// downloads may be in flight and completion order is not guaranteed.
pub async fn await_quiescent(
    dir: &Path,
    cfg: &WatchConfig,
    timeout: Duration,
) -> Result<(), DownloadError> {
    let deadline = Instant::now() + timeout;
    loop {
        let names = list_names(dir)?;
        if !names.iter().any(|name| cfg.is_in_progress(name)) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(DownloadError::DownloadTimeout(format!(
                "in-progress downloads still present in {} after {:?}",
                dir.display(),
                timeout
            )));
        }
        sleep(cfg.poll_interval()).await;
    }
}

fn list_names(dir: &Path) -> Result<Vec<String>, DownloadError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| DownloadError::io(&format!("read_dir {}", dir.display()), err))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|err| DownloadError::io(&format!("read_dir {}", dir.display()), err))?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Completed files: regular, matching the filter, not in progress, and
/// without a sibling in-progress marker (`name.crdownload`).
fn completed_files(
    dir: &Path,
    filter: &NameFilter,
    cfg: &WatchConfig,
) -> Result<Vec<CompletedFile>, DownloadError> {
    let names = list_names(dir)?;
    let name_set: HashSet<&String> = names.iter().collect();
    let mut completed = Vec::new();

    for name in &names {
        if cfg.is_in_progress(name) || !filter.matches(name) {
            continue;
        }
        let has_marker = cfg
            .in_progress_suffixes
            .iter()
            .any(|suffix| name_set.contains(&format!("{name}{suffix}")));
        if has_marker {
            continue;
        }

        let path = dir.join(name);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            // Finished or vanished between listing and stat; next poll settles it.
            _ => continue,
        };
        completed.push(CompletedFile {
            name: name.clone(),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn fast_cfg() -> WatchConfig {
        WatchConfig {
            in_progress_suffixes: vec![".crdownload".to_string()],
            poll_interval_ms: 10,
        }
    }

    #[tokio::test]
    async fn detects_file_that_finishes_after_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let watch = DownloadWatch::begin_with(dir.path(), NameFilter::any(), fast_cfg()).unwrap();

        let partial = dir.path().join("report.csv.crdownload");
        let final_path = dir.path().join("report.csv");
        let background = {
            let partial = partial.clone();
            let final_path = final_path.clone();
            tokio::spawn(async move {
                let mut file = File::create(&partial).unwrap();
                file.write_all(b"a,b,c\n1,2,3\n").unwrap();
                sleep(Duration::from_millis(40)).await;
                fs::rename(&partial, &final_path).unwrap();
            })
        };

        let found = watch.await_new_file(Duration::from_secs(5)).await.unwrap();
        background.await.unwrap();
        assert_eq!(found, final_path);
    }

    #[tokio::test]
    async fn never_reports_file_with_in_progress_marker() {
        let dir = tempfile::tempdir().unwrap();
        let watch = DownloadWatch::begin_with(dir.path(), NameFilter::any(), fast_cfg()).unwrap();

        fs::write(dir.path().join("data.xml"), b"<x/>").unwrap();
        fs::write(dir.path().join("data.xml.crdownload"), b"").unwrap();

        let err = watch
            .await_new_file(Duration::from_millis(80))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::DownloadTimeout(_)));
    }

    #[tokio::test]
    async fn snapshot_excludes_preexisting_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.pdf"), b"old").unwrap();
        let watch = DownloadWatch::begin_with(
            dir.path(),
            NameFilter::with_suffix(".pdf"),
            fast_cfg(),
        )
        .unwrap();

        let err = watch
            .await_new_file(Duration::from_millis(80))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::DownloadTimeout(_)));

        fs::write(dir.path().join("new.pdf"), b"fresh").unwrap();
        let found = watch.await_new_file(Duration::from_secs(5)).await.unwrap();
        assert_eq!(found, dir.path().join("new.pdf"));
    }

    #[tokio::test]
    async fn filter_prefix_and_suffix_constrain_matches() {
        let dir = tempfile::tempdir().unwrap();
        let filter = NameFilter::with_prefix("FSist XMLs N").and_suffix(".zip");
        let watch = DownloadWatch::begin_with(dir.path(), filter, fast_cfg()).unwrap();

        fs::write(dir.path().join("unrelated.zip"), b"zzz").unwrap();
        fs::write(dir.path().join("FSist XMLs N 123.ZIP"), b"zip!").unwrap();

        let found = watch.await_new_file(Duration::from_secs(5)).await.unwrap();
        assert_eq!(found, dir.path().join("FSist XMLs N 123.ZIP"));
    }

    #[test]
    fn multi_suffix_filter_accepts_any_listed_extension() {
        let filter = NameFilter::with_suffix(".pdf").and_suffix(".zip");
        assert!(filter.matches("livro.PDF"));
        assert!(filter.matches("export.zip"));
        assert!(!filter.matches("notas.xml"));
    }

    #[tokio::test]
    async fn quiescent_waits_for_markers_to_clear() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("big.zip.crdownload");
        fs::write(&marker, b"...").unwrap();

        let err = await_quiescent(dir.path(), &fast_cfg(), Duration::from_millis(60))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::DownloadTimeout(_)));

        fs::remove_file(&marker).unwrap();
        await_quiescent(dir.path(), &fast_cfg(), Duration::from_secs(1))
            .await
            .unwrap();
    }
}
