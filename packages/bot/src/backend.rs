//! Image generation backends.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use bot_core::{GenerationSettings, ModelRef, Precision};
use bytes::Bytes;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::BotConfig;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("model not loaded")]
    NotLoaded,

    #[error("generator command is not configured")]
    NoCommand,

    #[error("failed to run generator: {0}")]
    Io(#[from] std::io::Error),

    #[error("generator exited with {status}: {stderr}")]
    Process { status: String, stderr: String },

    #[error("generator did not return a PNG image")]
    NotPng,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Model currently held by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModel {
    pub model: ModelRef,
    pub vae: Option<String>,
    pub loras: Vec<String>,
}

impl LoadedModel {
    /// Whether a request for `model` with `vae` can reuse this model.
    pub fn matches(&self, model: &ModelRef, vae: Option<&str>) -> bool {
        &self.model == model && self.vae.as_deref() == vae
    }
}

/// Something that turns generation settings into a PNG.
///
/// Calls are serialized by the request queue, so implementations may keep
/// mutable model state without locking of their own.
pub trait ImageBackend: Send + Sync + 'static {
    fn load_model(
        &mut self,
        model: &ModelRef,
        vae: Option<&str>,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn load_lora(&mut self, lora: &str) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn generate(
        &mut self,
        settings: &GenerationSettings,
    ) -> impl Future<Output = Result<Bytes, BackendError>> + Send;

    fn unload(&mut self);

    fn loaded(&self) -> Option<&LoadedModel>;
}

/// Request written to the generator's stdin.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    /// Local checkpoint path, or a hub repository id.
    model: String,
    single_file: bool,
    pipeline: &'static str,
    vae: Option<String>,
    loras: Vec<String>,
    precision: Precision,
    use_xformers: bool,
    settings: &'a GenerationSettings,
}

/// Runs an external generator once per image.
///
/// The generator receives a JSON request on stdin and must write the PNG
/// to stdout. Model and LoRA selections are resolved against the configured
/// directories and passed along with every request.
#[derive(Debug)]
pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
    models_path: PathBuf,
    lora_path: PathBuf,
    vae_path: PathBuf,
    precision: Precision,
    use_xformers: bool,
    loaded: Option<LoadedModel>,
}

impl ProcessBackend {
    pub fn new(command: &[String], config: &BotConfig) -> Result<Self, BackendError> {
        let (program, args) = command.split_first().ok_or(BackendError::NoCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            models_path: config.models_path.clone(),
            lora_path: config.lora_path.clone(),
            vae_path: config.vae_path.clone(),
            precision: config.precision,
            use_xformers: config.use_xformers,
            loaded: None,
        })
    }

    fn request<'a>(
        &self,
        loaded: &LoadedModel,
        settings: &'a GenerationSettings,
    ) -> GenerateRequest<'a> {
        let local = self.models_path.join(&loaded.model.name);
        let model = if local.exists() {
            local.display().to_string()
        } else {
            loaded.model.name.clone()
        };

        GenerateRequest {
            single_file: loaded.model.is_single_file(),
            model,
            pipeline: if loaded.model.kind.is_xl() { "xl" } else { "sd" },
            vae: loaded
                .vae
                .as_deref()
                .and_then(|vae| existing(&self.vae_path, vae))
                .map(|vae| self.vae_path.join(vae).display().to_string()),
            loras: loaded
                .loras
                .iter()
                .map(|lora| self.lora_path.join(lora).display().to_string())
                .collect(),
            precision: self.precision,
            use_xformers: self.use_xformers,
            settings,
        }
    }

    async fn run(&self, input: Vec<u8>) -> Result<Bytes, BackendError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await?;
            // Closing stdin tells the generator the request is complete.
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BackendError::Process {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if !output.stdout.starts_with(PNG_SIGNATURE) {
            return Err(BackendError::NotPng);
        }
        Ok(Bytes::from(output.stdout))
    }
}

impl ImageBackend for ProcessBackend {
    async fn load_model(&mut self, model: &ModelRef, vae: Option<&str>) -> Result<(), BackendError> {
        // Reuse checks compare the requested name, even for a missing file.
        if let Some(name) = vae.filter(|name| existing(&self.vae_path, name).is_none()) {
            tracing::warn!("VAE {} not found under {}", name, self.vae_path.display());
        }
        tracing::info!("Using model {} (vae: {:?})", model, vae);
        self.loaded = Some(LoadedModel {
            model: model.clone(),
            vae: vae.map(str::to_string),
            loras: Vec::new(),
        });
        Ok(())
    }

    async fn load_lora(&mut self, lora: &str) -> Result<(), BackendError> {
        let Some(loaded) = self.loaded.as_mut() else {
            return Err(BackendError::NotLoaded);
        };
        match existing(&self.lora_path, lora) {
            Some(lora) if !loaded.loras.contains(&lora) => loaded.loras.push(lora),
            Some(_) => {}
            None => tracing::warn!("LoRA {} not found under {}", lora, self.lora_path.display()),
        }
        Ok(())
    }

    async fn generate(&mut self, settings: &GenerationSettings) -> Result<Bytes, BackendError> {
        let loaded = self.loaded.as_ref().ok_or(BackendError::NotLoaded)?;
        let input = serde_json::to_vec(&self.request(loaded, settings))?;
        self.run(input).await
    }

    fn unload(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            tracing::info!("Unloaded model {}", loaded.model);
        }
    }

    fn loaded(&self) -> Option<&LoadedModel> {
        self.loaded.as_ref()
    }
}

/// `name` if it exists under `dir`.
fn existing(dir: &Path, name: &str) -> Option<String> {
    dir.join(name).exists().then(|| name.to_string())
}

#[cfg(all(test, unix))]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::collections::HashMap;
    use std::error::Error;

    use bot_core::ModelKind;

    use super::*;

    fn config(dir: &Path) -> Result<BotConfig, Box<dyn Error>> {
        let vars: HashMap<&str, String> = HashMap::from([
            ("ALLOWED_USER_ID", "1".to_string()),
            ("MODELS_PATH", dir.join("models").display().to_string()),
            ("LORA_PATH", dir.join("lora").display().to_string()),
            ("VAE_PATH", dir.join("vae").display().to_string()),
            ("STORAGE_BACKEND", "memory".to_string()),
        ]);
        Ok(BotConfig::from_lookup(|name| vars.get(name).cloned())?)
    }

    fn shell(script: &str, config: &BotConfig) -> Result<ProcessBackend, BackendError> {
        let command = ["sh".to_string(), "-c".to_string(), script.to_string()];
        ProcessBackend::new(&command, config)
    }

    #[tokio::test]
    async fn generate_requires_a_loaded_model() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut backend = shell("cat >/dev/null", &config(dir.path())?)?;
        let result = backend.generate(&GenerationSettings::default()).await;
        assert!(matches!(result, Err(BackendError::NotLoaded)));
        Ok(())
    }

    #[tokio::test]
    async fn generate_returns_png_from_stdout() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut backend = shell(
            r"cat >/dev/null; printf '\211PNG\r\n\032\n'",
            &config(dir.path())?,
        )?;
        backend
            .load_model(&ModelRef::parse("xl#base", &ModelKind::Sd)?, None)
            .await?;

        let png = backend.generate(&GenerationSettings::default()).await?;
        assert!(png.starts_with(PNG_SIGNATURE));
        Ok(())
    }

    #[tokio::test]
    async fn failures_carry_stderr() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let cfg = config(dir.path())?;
        let model = ModelRef::parse("sd#base", &ModelKind::Sd)?;

        let mut failing = shell("cat >/dev/null; echo 'CUDA out of memory' >&2; exit 3", &cfg)?;
        failing.load_model(&model, None).await?;
        match failing.generate(&GenerationSettings::default()).await {
            Err(BackendError::Process { stderr, .. }) => assert_eq!(stderr, "CUDA out of memory"),
            other => panic!("expected process error, got {other:?}"),
        }

        let mut silent = shell("cat >/dev/null; echo not-an-image", &cfg)?;
        silent.load_model(&model, None).await?;
        assert!(matches!(
            silent.generate(&GenerationSettings::default()).await,
            Err(BackendError::NotPng)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_files_are_skipped_and_reload_resets_loras() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("lora"))?;
        std::fs::write(dir.path().join("lora").join("detail.safetensors"), b"")?;
        let mut backend = shell("cat >/dev/null", &config(dir.path())?)?;
        let model = ModelRef::parse("sd#base", &ModelKind::Sd)?;

        backend.load_model(&model, Some("missing.safetensors")).await?;
        backend.load_lora("detail.safetensors").await?;
        backend.load_lora("detail.safetensors").await?;
        backend.load_lora("absent.safetensors").await?;

        let loaded = backend.loaded().expect("model loaded");
        assert_eq!(loaded.loras, vec!["detail.safetensors"]);
        // A missing VAE is not passed on, but the model stays reusable.
        assert!(loaded.matches(&model, Some("missing.safetensors")));
        assert!(!loaded.matches(&model, None));
        let settings = GenerationSettings::default();
        assert_eq!(backend.request(loaded, &settings).vae, None);

        backend.load_model(&model, None).await?;
        assert!(backend.loaded().expect("model loaded").loras.is_empty());

        backend.unload();
        assert!(backend.loaded().is_none());
        Ok(())
    }

    #[test]
    fn empty_command_is_rejected() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        assert!(matches!(
            ProcessBackend::new(&[], &config(dir.path())?),
            Err(BackendError::NoCommand)
        ));
        Ok(())
    }
}
