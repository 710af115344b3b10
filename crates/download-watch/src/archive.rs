//! Artifact archiving: semantic prefixes, collision-free renames, safe
//! archive extraction.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::DownloadError;

/// Longest prefix kept when building artifact names.
const MAX_PREFIX_LEN: usize = 80;

/// Strip path separators and control characters from a name component and
/// collapse whitespace runs, capping the length.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let mut collapsed = String::with_capacity(cleaned.len());
    let mut last_space = false;
    for c in cleaned.trim().chars() {
        if c == ' ' {
            if !last_space {
                collapsed.push(c);
            }
            last_space = true;
        } else {
            collapsed.push(c);
            last_space = false;
        }
    }
    collapsed.chars().take(MAX_PREFIX_LEN).collect()
}

/// First free variant of `desired`, counting `" (2)"`, `" (3)"`, ... on the
/// file stem.
pub fn unique_destination(desired: PathBuf) -> PathBuf {
    if !desired.exists() {
        return desired;
    }
    let stem = desired
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = desired
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = desired.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut counter = 2;
    loop {
        let candidate = parent.join(format!("{stem} ({counter}){extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename `path` to `"<prefix> <original name>"` in place, de-duplicating
/// on collision so repeated prefixing never overwrites an earlier artifact.
pub fn apply_prefix(path: &Path, prefix: &str) -> Result<PathBuf, DownloadError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| DownloadError::Io(format!("{} has no file name", path.display())))?;
    let safe_prefix = sanitize_component(prefix);
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let desired = parent.join(format!("{safe_prefix} {file_name}"));
    let destination = unique_destination(desired);
    fs::rename(path, &destination)
        .map_err(|err| DownloadError::io(&format!("rename {}", path.display()), err))?;
    info!(from = %path.display(), to = %destination.display(), "artifact prefixed");
    Ok(destination)
}

/// Move `src` over `dest`, deleting any prior occupant so the destination
/// name always holds the most recent outcome. Retries tolerate the window
/// where the browser still holds the fresh file open.
pub async fn replace_file(
    src: &Path,
    dest: &Path,
    attempts: u32,
    delay: Duration,
) -> Result<(), DownloadError> {
    if dest.exists() {
        fs::remove_file(dest)
            .map_err(|err| DownloadError::io(&format!("remove {}", dest.display()), err))?;
    }
    let mut last_err = None;
    for _ in 0..attempts.max(1) {
        match fs::rename(src, dest) {
            Ok(()) => return Ok(()),
            Err(err) => {
                debug!(%err, "rename not possible yet, retrying");
                last_err = Some(err);
                sleep(delay).await;
            }
        }
    }
    Err(DownloadError::Io(format!(
        "could not move {} to {}: {}",
        src.display(),
        dest.display(),
        last_err.map(|err| err.to_string()).unwrap_or_default()
    )))
}

/// Extract a zip archive into `dest_dir`.
///
/// Entries are unpacked into a scratch directory next to the destination;
/// entries whose resolved path would escape the scratch root are dropped.
/// When the archive holds exactly one top-level directory its contents are
/// collapsed into `dest_dir` directly. A pre-existing destination is
/// replaced; the scratch directory is cleaned up unconditionally.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<(), DownloadError> {
    let file = fs::File::open(archive_path)
        .map_err(|err| DownloadError::io(&format!("open {}", archive_path.display()), err))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|err| {
        DownloadError::ExtractionFailure(format!(
            "cannot read {}: {err}",
            archive_path.display()
        ))
    })?;

    if archive.is_empty() {
        return Err(DownloadError::ExtractionFailure(format!(
            "{} holds no entries",
            archive_path.display()
        )));
    }

    let scratch_parent = dest_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&scratch_parent)
        .map_err(|err| DownloadError::io("create scratch parent", err))?;
    // Same filesystem as the destination, so the final moves are renames.
    let scratch = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(&scratch_parent)
        .map_err(|err| DownloadError::io("create scratch dir", err))?;

    let mut unpacked = 0usize;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|err| {
            DownloadError::ExtractionFailure(format!("entry {index} unreadable: {err}"))
        })?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "dropping entry escaping the scratch root");
            continue;
        };
        let out_path = scratch.path().join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|err| DownloadError::io("create extracted dir", err))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| DownloadError::io("create extracted parent", err))?;
        }
        let mut out = fs::File::create(&out_path)
            .map_err(|err| DownloadError::io("create extracted file", err))?;
        io::copy(&mut entry, &mut out)
            .map_err(|err| DownloadError::io("write extracted file", err))?;
        unpacked += 1;
    }

    if unpacked == 0 {
        return Err(DownloadError::ExtractionFailure(format!(
            "{} yielded no extractable entries",
            archive_path.display()
        )));
    }

    let top_level: Vec<PathBuf> = fs::read_dir(scratch.path())
        .map_err(|err| DownloadError::io("list scratch dir", err))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();

    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir)
            .map_err(|err| DownloadError::io("replace destination dir", err))?;
    }

    match top_level.as_slice() {
        [single] if single.is_dir() => {
            fs::rename(single, dest_dir)
                .map_err(|err| DownloadError::io("move extracted tree", err))?;
        }
        _ => {
            fs::create_dir_all(dest_dir)
                .map_err(|err| DownloadError::io("create destination dir", err))?;
            for path in top_level {
                let Some(name) = path.file_name() else {
                    continue;
                };
                fs::rename(&path, dest_dir.join(name))
                    .map_err(|err| DownloadError::io("move extracted entry", err))?;
            }
        }
    }

    info!(
        archive = %archive_path.display(),
        dest = %dest_dir.display(),
        files = unpacked,
        "archive extracted"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn sanitize_strips_path_and_control_characters() {
        assert_eq!(
            sanitize_component("ACME \\ LTDA: <fiscal>"),
            "ACME LTDA fiscal"
        );
        assert_eq!(sanitize_component("  many   spaces  "), "many spaces");
    }

    #[test]
    fn prefix_collision_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ACME invoice.pdf"), b"first").unwrap();
        let source = dir.path().join("invoice.pdf");
        fs::write(&source, b"second").unwrap();

        let renamed = apply_prefix(&source, "ACME").unwrap();
        assert_eq!(renamed, dir.path().join("ACME invoice (2).pdf"));
        assert!(dir.path().join("ACME invoice.pdf").exists());
    }

    #[test]
    fn prefixing_is_injective_across_repeated_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        for round in 0..3 {
            let source = dir.path().join("nota.xml");
            fs::write(&source, format!("round {round}")).unwrap();
            let renamed = apply_prefix(&source, "EMPRESA X").unwrap();
            assert!(!seen.contains(&renamed));
            seen.push(renamed);
        }
        for path in &seen {
            assert!(path.exists());
        }
    }

    #[test]
    fn extraction_collapses_single_top_level_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("export.zip");
        build_zip(
            &archive,
            &[
                ("Data/a.xml", b"<a/>".as_slice()),
                ("Data/b.xml", b"<b/>".as_slice()),
                ("Data/sub/c.pdf", b"%PDF".as_slice()),
            ],
        );

        let dest = dir.path().join("Final");
        extract_archive(&archive, &dest).unwrap();

        assert!(dest.join("a.xml").exists());
        assert!(dest.join("b.xml").exists());
        assert!(dest.join("sub/c.pdf").exists());
        assert!(!dest.join("Data").exists());
    }

    #[test]
    fn extraction_replaces_preexisting_destination() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("export.zip");
        build_zip(&archive, &[("fresh.txt", b"new".as_slice())]);

        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.txt"), b"old").unwrap();

        extract_archive(&archive, &dest).unwrap();
        assert!(dest.join("fresh.txt").exists());
        assert!(!dest.join("stale.txt").exists());
    }

    #[test]
    fn traversal_entries_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        build_zip(
            &archive,
            &[
                ("../escape.txt", b"nope".as_slice()),
                ("good.txt", b"fine".as_slice()),
            ],
        );

        let dest = dir.path().join("nested").join("out");
        extract_archive(&archive, &dest).unwrap();

        assert!(dest.join("good.txt").exists());
        assert!(!dir.path().join("escape.txt").exists());
        assert!(!dir.path().join("nested").join("escape.txt").exists());
    }

    #[test]
    fn empty_archive_is_an_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.zip");
        let file = fs::File::create(&archive).unwrap();
        let writer = zip::ZipWriter::new(file);
        writer.finish().unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, DownloadError::ExtractionFailure(_)));
    }

    #[test]
    fn corrupt_archive_is_an_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip").unwrap();

        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, DownloadError::ExtractionFailure(_)));
    }

    #[tokio::test]
    async fn replace_file_overwrites_previous_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("FSist-NFe entradas.xlsx");
        fs::write(&dest, b"last month").unwrap();
        let fresh = dir.path().join("FSist-NFe-Todas--2025-07.xlsx");
        fs::write(&fresh, b"this month").unwrap();

        replace_file(&fresh, &dest, 4, Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"this month");
        assert!(!fresh.exists());
    }
}
