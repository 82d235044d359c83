use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{error, info};

use crate::cli::{ProcessArgs, ProcessMode};
use crate::pipeline::{CommandPipeline, PipelineConfig, TablePipeline};
use crate::util::{ensure_directory, file_stem_str, files_with_extension};

use super::outputs::{
    OutputFlags, write_detect_outputs, write_recognize_outputs, write_table_outputs,
};
use super::{archive, tokens};

pub fn run(args: ProcessArgs) -> Result<()> {
    ensure_directory(&args.out_dir)?;

    let pipeline = CommandPipeline::new(PipelineConfig::from_args(&args));

    let image_paths = files_with_extension(&args.image_dir, "jpg")?;
    if image_paths.is_empty() {
        bail!("no images found in {}", args.image_dir.display());
    }

    info!(
        images = image_paths.len(),
        mode = args.mode.as_str(),
        out_dir = %args.out_dir.display(),
        "processing images"
    );

    for image_path in &image_paths {
        let zip_path = process_image(&pipeline, &args, image_path)?;
        info!(
            image = %image_path.display(),
            archive = %zip_path.display(),
            "image processed"
        );
    }

    Ok(())
}

/// Runs one image through the pipeline and returns the download archive path.
/// Cleanup of stale stem-matching outputs always precedes processing, and
/// archive collection always follows it; the two phases are a deliberate
/// contract with archive consumers.
pub fn process_image(
    pipeline: &dyn TablePipeline,
    args: &ProcessArgs,
    image_path: &Path,
) -> Result<PathBuf> {
    let stem = file_stem_str(image_path)?;

    archive::remove_stale_outputs(&args.out_dir, &stem)?;

    let tokens = tokens::load_tokens(args, image_path, &stem)?;
    info!(image = %image_path.display(), tokens = tokens.len(), "tokens loaded");

    let image = image::open(image_path)
        .with_context(|| format!("failed to load image: {}", image_path.display()))?;
    let flags = OutputFlags::from_args(args);

    match args.mode {
        ProcessMode::Detect => {
            let output = pipeline.detect(image_path, &tokens)?;
            info!(objects = output.objects.len(), "tables detected");
            write_detect_outputs(&args.out_dir, &stem, &image, &output, flags)?;
        }
        ProcessMode::Recognize => {
            let output = pipeline.recognize(image_path, &tokens)?;
            info!(
                objects = output.objects.len(),
                cells = output.cells.len(),
                "table structure recognized"
            );
            write_recognize_outputs(&args.out_dir, &stem, &image, &output, flags)?;
        }
        ProcessMode::Extract => {
            let output = pipeline.extract(image_path, &tokens, args.crop_padding)?;
            info!(tables = output.tables.len(), "tables extracted");

            for (index, table) in output.tables.iter().enumerate() {
                if let Err(err) =
                    write_table_outputs(&args.out_dir, &stem, index, &image, table, flags)
                {
                    error!(
                        image = %image_path.display(),
                        table = index,
                        error = %err,
                        "failed to write table outputs"
                    );
                    for cause in err.chain().skip(1) {
                        error!(cause = %cause, "caused by");
                    }
                    return Err(err);
                }
            }
        }
    }

    archive::bundle_outputs(&args.out_dir, &stem)
}
