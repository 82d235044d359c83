use anyhow::Result;
use tracing::{info, warn};

use crate::cli::OcrWordsArgs;
use crate::ocr::OcrEngine;
use crate::util::{SPLITS, file_stem_str, files_with_extension, progress_bar, write_json_pretty};

pub fn run(args: OcrWordsArgs) -> Result<()> {
    let engine = OcrEngine::new(&args.tesseract_cmd, &args.ocr_lang);

    for split in SPLITS {
        let image_dir = args.data_dir.join(split);
        if !image_dir.is_dir() {
            warn!(dir = %image_dir.display(), "split directory missing, skipping");
            continue;
        }

        let image_paths = files_with_extension(&image_dir, "jpg")?;
        let results_dir = args.output_dir.join("ocr_results").join(split);

        info!(
            dir = %results_dir.display(),
            images = image_paths.len(),
            split,
            "generating OCR word files"
        );

        let progress = progress_bar(image_paths.len());
        for image_path in &image_paths {
            let words = engine.image_to_words(image_path)?;

            let file_name = format!("{}_words.json", file_stem_str(image_path)?);
            write_json_pretty(&results_dir.join(file_name), &words)?;
            progress.inc(1);
        }
        progress.finish_and_clear();
    }

    info!("completed");
    Ok(())
}
