use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{ProcessArgs, TokenSource};
use crate::model::{RawToken, Token, TokenFile, normalize_tokens};
use crate::ocr::OcrEngine;
use crate::util::write_json_pretty;

/// Produces the token list for one image according to the selected source.
/// Every path funnels through the same normalization step.
pub fn load_tokens(args: &ProcessArgs, image_path: &Path, stem: &str) -> Result<Vec<Token>> {
    match args.tokens {
        TokenSource::GroundTruth => {
            let words_dir = args
                .table_words_dir
                .as_deref()
                .context("--tokens ground-truth requires --table-words-dir")?;
            read_ground_truth(words_dir, stem)
        }
        TokenSource::Ocr => {
            let tesseract_cmd = args
                .tesseract_cmd
                .as_deref()
                .context("--tokens ocr requires --tesseract-cmd")?;

            let engine = OcrEngine::new(tesseract_cmd, &args.ocr_lang);
            let words = engine.image_to_words(image_path)?;

            if let Some(ocr_words_dir) = &args.ocr_words_dir {
                let words_path = ocr_words_dir.join(format!("{stem}_words.json"));
                write_json_pretty(&words_path, &words)?;
                info!(path = %words_path.display(), words = words.len(), "wrote OCR words");
            }

            let raw = words.into_iter().map(RawToken::from).collect();
            Ok(normalize_tokens(TokenFile::List(raw)))
        }
        TokenSource::None => Ok(Vec::new()),
    }
}

fn read_ground_truth(words_dir: &Path, stem: &str) -> Result<Vec<Token>> {
    let words_path = words_dir.join(format!("{stem}_words.json"));

    if !words_path.is_file() {
        warn!(path = %words_path.display(), "ground-truth words file missing, using no tokens");
        return Ok(Vec::new());
    }

    let raw = fs::read(&words_path)
        .with_context(|| format!("failed to read {}", words_path.display()))?;
    let file: TokenFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", words_path.display()))?;

    Ok(normalize_tokens(file))
}
