use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::util::{ensure_directory, file_name_str, file_stem_str};

/// Deletes every output file sharing the image's stem, so a rerun can never
/// mix fresh artifacts with leftovers from an earlier invocation. This is
/// the first half of the cleanup/collect contract; `bundle_outputs` is the
/// second.
pub fn remove_stale_outputs(out_dir: &Path, stem: &str) -> Result<usize> {
    let stale = stem_outputs(out_dir, stem)?;

    for path in &stale {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove stale output: {}", path.display()))?;
    }

    if !stale.is_empty() {
        info!(stem, removed = stale.len(), "removed stale outputs");
    }

    Ok(stale.len())
}

/// Collects every output file sharing the image's stem into a fresh
/// `zips/download_<stem>.zip`, each entry stored under the archive's own
/// stem as its folder prefix. Clients rely on both naming conventions.
pub fn bundle_outputs(out_dir: &Path, stem: &str) -> Result<PathBuf> {
    let output_paths = stem_outputs(out_dir, stem)?;

    let zip_path = out_dir.join("zips").join(format!("download_{stem}.zip"));
    if let Some(parent) = zip_path.parent() {
        ensure_directory(parent)?;
    }
    if zip_path.exists() {
        fs::remove_file(&zip_path)
            .with_context(|| format!("failed to remove prior archive: {}", zip_path.display()))?;
    }

    let prefix = file_stem_str(&zip_path)?;
    let file = File::create(&zip_path)
        .with_context(|| format!("failed to create archive: {}", zip_path.display()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for output_path in &output_paths {
        let entry_name = format!("{prefix}/{}", file_name_str(output_path)?);
        writer
            .start_file(entry_name, options)
            .with_context(|| format!("failed to start archive entry: {}", output_path.display()))?;

        let mut input = File::open(output_path)
            .with_context(|| format!("failed to open output file: {}", output_path.display()))?;
        io::copy(&mut input, &mut writer)
            .with_context(|| format!("failed to archive {}", output_path.display()))?;
    }

    writer
        .finish()
        .with_context(|| format!("failed to finalize archive: {}", zip_path.display()))?;

    info!(path = %zip_path.display(), entries = output_paths.len(), "wrote download archive");
    Ok(zip_path)
}

/// Lists regular files in `out_dir` matching the `<stem>*.*` pattern,
/// sorted by name. Subdirectories (including `zips/`) are never matched.
pub fn stem_outputs(out_dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    let mut outputs = Vec::new();

    let entries =
        fs::read_dir(out_dir).with_context(|| format!("failed to read {}", out_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", out_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let name = file_name_str(&path)?;
        if name.starts_with(stem) && name[stem.len()..].contains('.') {
            outputs.push(path);
        }
    }

    outputs.sort();
    Ok(outputs)
}
