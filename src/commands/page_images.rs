use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{info, warn};

use crate::cli::PageImagesArgs;
use crate::util::{
    SPLITS, ensure_directory, file_name_str, file_stem_str, files_with_extension, progress_bar,
};

pub fn run(args: PageImagesArgs) -> Result<()> {
    let pattern = Regex::new(r"^(.+)_page_([0-9]+)_table_(.+)\.xml$")
        .context("failed to compile annotation filename regex")?;

    for split in SPLITS {
        let ann_dir = args.data_dir.join(split);
        if !ann_dir.is_dir() {
            warn!(dir = %ann_dir.display(), "split directory missing, skipping");
            continue;
        }

        let ann_paths = files_with_extension(&ann_dir, "xml")?;
        let images_dir = args.output_dir.join("page_images").join(split);

        info!(
            dir = %images_dir.display(),
            annotations = ann_paths.len(),
            split,
            "generating page image files"
        );

        let progress = progress_bar(ann_paths.len());
        for ann_path in &ann_paths {
            let ann_file_name = file_name_str(ann_path)?;
            let pdf_path = find_pdf_path(&args.pdf_dir, &ann_file_name, &pattern)?;

            let image_path = images_dir.join(image_file_name(ann_path)?);
            ensure_directory(&images_dir)?;
            render_page_image(&pdf_path, &image_path, args.max_dim)?;
            progress.inc(1);
        }
        progress.finish_and_clear();
    }

    info!("completed");
    Ok(())
}

/// The page image keeps the full annotation stem, swapping only the trailing
/// `.xml` extension for `.jpg`.
fn image_file_name(ann_path: &Path) -> Result<String> {
    Ok(format!("{}.jpg", file_stem_str(ann_path)?))
}

/// Resolves the source PDF behind an annotation file. The leading group of
/// the annotation filename encodes nested directory segments joined by `_`;
/// the page number selects a single-page `page_<n>.pdf` inside them. Every
/// segment and the final file must exist; there is no fallback.
fn find_pdf_path(pdf_dir: &Path, ann_file_name: &str, pattern: &Regex) -> Result<PathBuf> {
    let captures = pattern.captures(ann_file_name).with_context(|| {
        format!("annotation filename does not match expected pattern: {ann_file_name}")
    })?;

    let dir_segments = captures
        .get(1)
        .map(|m| m.as_str())
        .context("missing directory capture")?;
    let page_number = captures
        .get(2)
        .map(|m| m.as_str())
        .context("missing page capture")?;

    let mut pdf_path = pdf_dir.to_path_buf();
    for segment in dir_segments.split('_') {
        pdf_path = pdf_path.join(segment);
        if !pdf_path.is_dir() {
            bail!("missing PDF directory segment: {}", pdf_path.display());
        }
    }

    pdf_path = pdf_path.join(format!("page_{page_number}.pdf"));
    if !pdf_path.is_file() {
        bail!("missing PDF file: {}", pdf_path.display());
    }

    Ok(pdf_path)
}

/// Rasterizes the first page as a JPEG whose larger dimension is `max_dim`
/// pixels, aspect ratio preserved. pdftoppm appends the `.jpg` extension to
/// the output root it is given.
fn render_page_image(pdf_path: &Path, image_path: &Path, max_dim: u32) -> Result<()> {
    let output_root = image_path.with_extension("");

    let output = Command::new("pdftoppm")
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg("1")
        .arg("-singlefile")
        .arg("-jpeg")
        .arg("-scale-to")
        .arg(max_dim.to_string())
        .arg(pdf_path)
        .arg(&output_root)
        .output()
        .with_context(|| format!("failed to execute pdftoppm for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftoppm returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    if !image_path.is_file() {
        bail!(
            "pdftoppm did not produce expected image: {}",
            image_path.display()
        );
    }

    Ok(())
}
