//! Zip extraction and repackaging.
//!
//! Jars and native bundles are plain zip archives. Extraction goes through a
//! staging directory so a half-written tree never appears at the destination.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::files::{move_path, remove_path};

/// Returns true if an archive entry name falls under one of the excluded
/// prefixes.
fn is_excluded(entry_name: &str, excludes: &[String]) -> bool {
    excludes
        .iter()
        .any(|prefix| !prefix.is_empty() && entry_name.starts_with(prefix.as_str()))
}

// ============================================================================
// Extraction
// ============================================================================

/// Extracts a zip archive into `dest_dir`, skipping excluded entries.
///
/// Entries are first written to `staging_dir` (cleared beforehand), then the
/// staging tree replaces `dest_dir`.
pub fn extract_zip(
    archive_path: &Path,
    staging_dir: &Path,
    dest_dir: &Path,
    excludes: &[String],
) -> Result<()> {
    info!(
        "Extracting {} to {}",
        archive_path.display(),
        dest_dir.display()
    );

    remove_path(staging_dir)?;
    fs::create_dir_all(staging_dir)
        .with_context(|| format!("Failed to create directory: {}", staging_dir.display()))?;

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open zip: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read zip: {}", archive_path.display()))?;

    let mut skipped = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        if is_excluded(entry.name(), excludes) {
            skipped += 1;
            continue;
        }

        let entry_path = match entry.enclosed_name() {
            Some(path) => path.to_owned(),
            None => {
                debug!("Skipping unsafe path in zip: {}", entry.name());
                continue;
            }
        };

        let out_path = staging_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&out_path)
                .with_context(|| format!("Failed to create: {}", out_path.display()))?;
            io::copy(&mut entry, &mut outfile)?;
        }
    }

    remove_path(dest_dir)?;
    if let Some(parent) = dest_dir.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    move_path(staging_dir, dest_dir)?;

    debug!("Zip extraction complete ({} entries excluded)", skipped);
    Ok(())
}

// ============================================================================
// Repackaging
// ============================================================================

/// Builds a zip archive at `output` from every file under `source_dir`.
///
/// Entry names are relative to `source_dir` with forward slashes, written in
/// sorted order so the same tree always produces the same archive.
pub fn repackage(output: &Path, source_dir: &Path) -> Result<()> {
    info!(
        "Repackaging {} into {}",
        source_dir.display(),
        output.display()
    );

    let files = collect_files(source_dir)?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let partial = output.with_extension("part");
    {
        let file = File::create(&partial)
            .with_context(|| format!("Failed to create: {}", partial.display()))?;
        let mut writer = zip::ZipWriter::new(BufWriter::new(file));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, path) in &files {
            writer
                .start_file(name.as_str(), options)
                .with_context(|| format!("Failed to add {} to archive", name))?;
            let mut input = File::open(path)
                .with_context(|| format!("Failed to open: {}", path.display()))?;
            io::copy(&mut input, &mut writer)?;
        }

        let mut inner = writer.finish().context("Failed to finalize archive")?;
        inner.flush()?;
    }

    fs::rename(&partial, output).with_context(|| {
        format!(
            "Failed to move {} to {}",
            partial.display(),
            output.display()
        )
    })?;

    debug!("Repackaged {} files", files.len());
    Ok(())
}

/// Lists files under `root` as `(entry name, path)` pairs, sorted by name.
fn collect_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = fs::read_dir(&current)
            .with_context(|| format!("Failed to read directory: {}", current.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((name, path));
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
