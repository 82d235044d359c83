use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "tabex",
    version,
    about = "Dataset preparation and model-service tooling for document table extraction"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run OCR over page images and write per-image word files
    OcrWords(OcrWordsArgs),
    /// Render the source PDF page behind each annotation file as a JPEG
    PageImages(PageImagesArgs),
    /// Subsample an annotated dataset into a small fixture set
    Subsample(SubsampleArgs),
    /// Run the table-extraction pipeline over images and package the outputs
    Process(ProcessArgs),
}

#[derive(Args, Debug, Clone)]
pub struct OcrWordsArgs {
    #[arg(long)]
    pub tesseract_cmd: PathBuf,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    #[arg(long)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PageImagesArgs {
    #[arg(long)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub pdf_dir: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 1000)]
    pub max_dim: u32,
}

#[derive(Args, Debug, Clone)]
pub struct SubsampleArgs {
    #[arg(long)]
    pub data_dir: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 800)]
    pub num_train_samples: usize,

    #[arg(long, default_value_t = 100)]
    pub num_val_samples: usize,

    #[arg(long, default_value_t = 100)]
    pub num_test_samples: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProcessMode {
    Detect,
    Recognize,
    Extract,
}

impl ProcessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Recognize => "recognize",
            Self::Extract => "extract",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TokenSource {
    /// Read ground-truth word files from --table-words-dir
    GroundTruth,
    /// Run OCR on each input image
    Ocr,
    /// Pass an empty token list to the pipeline
    None,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    #[arg(long)]
    pub image_dir: PathBuf,

    #[arg(long)]
    pub out_dir: PathBuf,

    #[arg(long, value_enum)]
    pub mode: ProcessMode,

    #[arg(long, value_enum, default_value_t = TokenSource::None)]
    pub tokens: TokenSource,

    #[arg(long)]
    pub table_words_dir: Option<PathBuf>,

    #[arg(long)]
    pub ocr_words_dir: Option<PathBuf>,

    #[arg(long)]
    pub tesseract_cmd: Option<PathBuf>,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    #[arg(long)]
    pub pipeline_cmd: PathBuf,

    #[arg(long)]
    pub detection_config_path: Option<PathBuf>,

    #[arg(long)]
    pub detection_model_path: Option<PathBuf>,

    #[arg(long)]
    pub structure_config_path: Option<PathBuf>,

    #[arg(long)]
    pub structure_model_path: Option<PathBuf>,

    #[arg(long, default_value = "cuda")]
    pub detection_device: String,

    #[arg(long, default_value = "cuda")]
    pub structure_device: String,

    #[arg(long, short = 'o', default_value_t = false)]
    pub objects: bool,

    #[arg(long, short = 'l', default_value_t = false)]
    pub cells: bool,

    #[arg(long, short = 'm', default_value_t = false)]
    pub html: bool,

    #[arg(long, short = 'c', default_value_t = false)]
    pub csv: bool,

    #[arg(long, short = 'p', default_value_t = false)]
    pub crops: bool,

    #[arg(long, short = 'z', default_value_t = false)]
    pub visualize: bool,

    #[arg(long, default_value_t = 10)]
    pub crop_padding: i64,
}
