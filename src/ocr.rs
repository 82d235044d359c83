use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::model::WordRecord;

/// Rows at this level in the engine's TSV output are individual words;
/// lower levels are page/block/paragraph/line aggregates.
const WORD_LEVEL: u32 = 5;

/// Wraps an external tesseract binary. The binary path is injected here and
/// scoped to the engine instance rather than held as process-wide state.
pub struct OcrEngine {
    tesseract_cmd: PathBuf,
    lang: String,
}

impl OcrEngine {
    pub fn new(tesseract_cmd: impl Into<PathBuf>, lang: impl Into<String>) -> Self {
        Self {
            tesseract_cmd: tesseract_cmd.into(),
            lang: lang.into(),
        }
    }

    /// Runs OCR over one image and returns its word records in engine order.
    pub fn image_to_words(&self, image_path: &Path) -> Result<Vec<WordRecord>> {
        let output = Command::new(&self.tesseract_cmd)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .arg("tsv")
            .output()
            .with_context(|| {
                format!(
                    "failed to execute {} for {}",
                    self.tesseract_cmd.display(),
                    image_path.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "tesseract returned non-zero exit status for {}: {}",
                image_path.display(),
                stderr.trim()
            );
        }

        parse_tsv_words(&output.stdout)
            .with_context(|| format!("failed to parse OCR output for {}", image_path.display()))
    }
}

#[derive(Debug, Deserialize)]
struct TsvRow {
    level: u32,
    block_num: i64,
    line_num: i64,
    word_num: i64,
    left: i64,
    top: i64,
    width: i64,
    height: i64,
    #[serde(default)]
    text: String,
}

/// Reshapes the engine's column-oriented TSV table (a header row naming each
/// column, then one index-aligned row per element) into word records,
/// keeping only word-level rows. Whitespace-only words are kept.
pub fn parse_tsv_words(raw: &[u8]) -> Result<Vec<WordRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(raw);

    let mut words = Vec::new();

    for row in reader.deserialize() {
        let row: TsvRow = row.context("malformed TSV row in OCR output")?;

        if row.level != WORD_LEVEL {
            continue;
        }

        words.push(WordRecord {
            bbox: [row.left, row.top, row.left + row.width, row.top + row.height],
            text: row.text,
            block_num: row.block_num,
            line_num: row.line_num,
            span_num: row.word_num,
        });
    }

    Ok(words)
}
