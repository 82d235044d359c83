use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cli::ProcessArgs;
use crate::model::{DetectOutput, ExtractOutput, RecognizeOutput, Token};

/// The pretrained detection/recognition model behind this seam is an opaque
/// external collaborator; this trait is the whole of its surface. Extract
/// mode reports per-table objects and cells in cropped-table coordinates.
pub trait TablePipeline {
    fn detect(&self, image_path: &Path, tokens: &[Token]) -> Result<DetectOutput>;

    fn recognize(&self, image_path: &Path, tokens: &[Token]) -> Result<RecognizeOutput>;

    fn extract(
        &self,
        image_path: &Path,
        tokens: &[Token],
        crop_padding: i64,
    ) -> Result<ExtractOutput>;
}

/// Model and device selection forwarded verbatim to the inference program.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub program: PathBuf,
    pub detection_config_path: Option<PathBuf>,
    pub detection_model_path: Option<PathBuf>,
    pub structure_config_path: Option<PathBuf>,
    pub structure_model_path: Option<PathBuf>,
    pub detection_device: String,
    pub structure_device: String,
}

impl PipelineConfig {
    pub fn from_args(args: &ProcessArgs) -> Self {
        Self {
            program: args.pipeline_cmd.clone(),
            detection_config_path: args.detection_config_path.clone(),
            detection_model_path: args.detection_model_path.clone(),
            structure_config_path: args.structure_config_path.clone(),
            structure_model_path: args.structure_model_path.clone(),
            detection_device: args.detection_device.clone(),
            structure_device: args.structure_device.clone(),
        }
    }
}

/// Production pipeline: shells out to the configured inference program with
/// a JSON request on stdin and a JSON response on stdout.
pub struct CommandPipeline {
    config: PipelineConfig,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    mode: &'static str,
    image_path: String,
    tokens: &'a [Token],
    #[serde(skip_serializing_if = "Option::is_none")]
    crop_padding: Option<i64>,
}

impl CommandPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    fn invoke<T: DeserializeOwned>(
        &self,
        mode: &'static str,
        image_path: &Path,
        tokens: &[Token],
        crop_padding: Option<i64>,
    ) -> Result<T> {
        let request = InferenceRequest {
            mode,
            image_path: image_path.display().to_string(),
            tokens,
            crop_padding,
        };
        let payload = serde_json::to_vec(&request).context("failed to serialize request")?;

        let mut command = Command::new(&self.config.program);
        command.arg("--mode").arg(mode);
        command
            .arg("--detection-device")
            .arg(&self.config.detection_device);
        command
            .arg("--structure-device")
            .arg(&self.config.structure_device);
        if let Some(path) = &self.config.detection_config_path {
            command.arg("--detection-config-path").arg(path);
        }
        if let Some(path) = &self.config.detection_model_path {
            command.arg("--detection-model-path").arg(path);
        }
        if let Some(path) = &self.config.structure_config_path {
            command.arg("--structure-config-path").arg(path);
        }
        if let Some(path) = &self.config.structure_model_path {
            command.arg("--structure-model-path").arg(path);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| {
                format!(
                    "failed to execute inference program: {}",
                    self.config.program.display()
                )
            })?;

        child
            .stdin
            .take()
            .context("inference program stdin unavailable")?
            .write_all(&payload)
            .with_context(|| {
                format!(
                    "failed to send request to inference program for {}",
                    image_path.display()
                )
            })?;

        let output = child.wait_with_output().with_context(|| {
            format!(
                "failed to wait for inference program: {}",
                self.config.program.display()
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "inference program returned non-zero exit status for {} in {} mode: {}",
                image_path.display(),
                mode,
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout).with_context(|| {
            format!(
                "failed to parse inference response for {} in {} mode",
                image_path.display(),
                mode
            )
        })
    }
}

impl TablePipeline for CommandPipeline {
    fn detect(&self, image_path: &Path, tokens: &[Token]) -> Result<DetectOutput> {
        self.invoke("detect", image_path, tokens, None)
    }

    fn recognize(&self, image_path: &Path, tokens: &[Token]) -> Result<RecognizeOutput> {
        self.invoke("recognize", image_path, tokens, None)
    }

    fn extract(
        &self,
        image_path: &Path,
        tokens: &[Token],
        crop_padding: i64,
    ) -> Result<ExtractOutput> {
        self.invoke("extract", image_path, tokens, Some(crop_padding))
    }
}
