//! Generation settings chosen by the user and their validation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest edge accepted for generated images.
const MIN_EDGE: u32 = 64;
const MAX_EDGE: u32 = 2048;
const MAX_STEPS: u32 = 150;
const MIN_CFG: f32 = 1.0;
const MAX_CFG: f32 = 30.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("invalid number for {param}: {value}")]
    InvalidNumber { param: Parameter, value: String },

    #[error("{param} must be within {range}, got {value}")]
    OutOfRange {
        param: Parameter,
        value: String,
        range: String,
    },

    #[error("invalid size {0:?}, expected WIDTHxHEIGHT (for example 512x768)")]
    InvalidSize(String),

    #[error("size edges must be multiples of 8 between 64 and 2048, got {0}")]
    SizeOutOfRange(String),

    #[error("unknown sampler: {0}")]
    UnknownSampler(String),

    #[error("unknown precision {0:?}, expected fp16 or fp32")]
    UnknownPrecision(String),

    #[error("model must not be empty")]
    EmptyModel,
}

/// A user-settable generation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Model,
    Vae,
    Lora,
    Sampler,
    CfgScale,
    Steps,
    Size,
    Prompt,
    NegativePrompt,
    Seed,
}

impl Parameter {
    pub const ALL: [Parameter; 10] = [
        Parameter::Model,
        Parameter::Vae,
        Parameter::Lora,
        Parameter::Sampler,
        Parameter::CfgScale,
        Parameter::Steps,
        Parameter::Size,
        Parameter::Prompt,
        Parameter::NegativePrompt,
        Parameter::Seed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Parameter::Model => "model",
            Parameter::Vae => "vae",
            Parameter::Lora => "lora",
            Parameter::Sampler => "sampler",
            Parameter::CfgScale => "cfg_scale",
            Parameter::Steps => "steps",
            Parameter::Size => "size",
            Parameter::Prompt => "prompt",
            Parameter::NegativePrompt => "negative_prompt",
            Parameter::Seed => "seed",
        }
    }

    /// Two-letter command alias (`/sm`, `/st`, ...), if the parameter has one.
    pub fn alias(self) -> Option<&'static str> {
        match self {
            Parameter::Model => Some("sm"),
            Parameter::Vae => Some("sv"),
            Parameter::Lora => Some("sl"),
            Parameter::Sampler => Some("ss"),
            Parameter::CfgScale => Some("sc"),
            Parameter::Steps => Some("st"),
            Parameter::Size => Some("sz"),
            Parameter::Prompt => Some("sp"),
            Parameter::NegativePrompt => Some("sn"),
            Parameter::Seed => None,
        }
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.alias() == Some(alias))
    }

    /// Human-readable label used in the settings panel.
    pub fn label(self) -> &'static str {
        match self {
            Parameter::Model => "Model",
            Parameter::Vae => "VAE",
            Parameter::Lora => "LoRA",
            Parameter::Sampler => "Sampler",
            Parameter::CfgScale => "CFG Scale",
            Parameter::Steps => "Steps",
            Parameter::Size => "Size",
            Parameter::Prompt => "Prompt",
            Parameter::NegativePrompt => "Negative prompt",
            Parameter::Seed => "Seed",
        }
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "cfg" => Ok(Parameter::CfgScale),
            other => Self::ALL
                .into_iter()
                .find(|p| p.as_str() == other)
                .ok_or_else(|| SettingsError::UnknownParameter(s.to_string())),
        }
    }
}

/// Diffusion sampler offered to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sampler {
    #[default]
    #[serde(rename = "Euler a")]
    EulerA,
    #[serde(rename = "DPM++ SDE")]
    DpmPpSde,
    #[serde(rename = "DPM++ 2S a Karras")]
    DpmPp2SaKarras,
    #[serde(rename = "DPM++ 2M Karras")]
    DpmPp2MKarras,
    #[serde(rename = "DPM++ SDE Karras")]
    DpmPpSdeKarras,
    #[serde(rename = "UniPC")]
    UniPc,
}

/// Every sampler, in menu order.
pub const SAMPLERS: [Sampler; 6] = [
    Sampler::EulerA,
    Sampler::DpmPpSde,
    Sampler::DpmPp2SaKarras,
    Sampler::DpmPp2MKarras,
    Sampler::DpmPpSdeKarras,
    Sampler::UniPc,
];

impl Sampler {
    pub fn as_str(self) -> &'static str {
        match self {
            Sampler::EulerA => "Euler a",
            Sampler::DpmPpSde => "DPM++ SDE",
            Sampler::DpmPp2SaKarras => "DPM++ 2S a Karras",
            Sampler::DpmPp2MKarras => "DPM++ 2M Karras",
            Sampler::DpmPpSdeKarras => "DPM++ SDE Karras",
            Sampler::UniPc => "UniPC",
        }
    }
}

impl std::fmt::Display for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sampler {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SAMPLERS
            .into_iter()
            .find(|sampler| sampler.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SettingsError::UnknownSampler(s.to_string()))
    }
}

/// Output image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Result<Self, SettingsError> {
        let valid = |edge: u32| (MIN_EDGE..=MAX_EDGE).contains(&edge) && edge % 8 == 0;
        if !valid(width) || !valid(height) {
            return Err(SettingsError::SizeOutOfRange(format!("{width}x{height}")));
        }
        Ok(Self { width, height })
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            width: 512,
            height: 768,
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SettingsError::InvalidSize(s.to_string());
        let lowered = s.trim().to_ascii_lowercase();
        let (w, h) = lowered.split_once('x').ok_or_else(invalid)?;
        let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(width, height)
    }
}

impl TryFrom<String> for ImageSize {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageSize> for String {
    fn from(size: ImageSize) -> Self {
        size.to_string()
    }
}

/// Model family; decides which diffusion pipeline the backend builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Sd,
    Xl,
    Pony,
    Other(String),
}

impl ModelKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "sd" | "sd15" | "sd1.5" | "" => ModelKind::Sd,
            "xl" | "sdxl" => ModelKind::Xl,
            "pony" => ModelKind::Pony,
            other => ModelKind::Other(other.to_string()),
        }
    }

    /// SDXL-based families need the XL pipeline.
    pub fn is_xl(&self) -> bool {
        matches!(self, ModelKind::Xl | ModelKind::Pony)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ModelKind::Sd => "sd",
            ModelKind::Xl => "xl",
            ModelKind::Pony => "pony",
            ModelKind::Other(other) => other,
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model selection: `"<kind>#<name>"`, or a bare name of the fallback kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub kind: ModelKind,
    pub name: String,
}

impl ModelRef {
    pub fn parse(data: &str, fallback: &ModelKind) -> Result<Self, SettingsError> {
        let data = data.trim();
        let (kind, name) = match data.split_once('#') {
            Some((kind, name)) => (ModelKind::parse(kind), name.trim()),
            None => (fallback.clone(), data),
        };
        if name.is_empty() {
            return Err(SettingsError::EmptyModel);
        }
        Ok(Self {
            kind,
            name: name.to_string(),
        })
    }

    /// Whether the name points at a single checkpoint file rather than a hub repo.
    pub fn is_single_file(&self) -> bool {
        self.name.ends_with(".safetensors") || self.name.ends_with(".ckpt")
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.kind, self.name)
    }
}

/// Floating point precision for model weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Fp16,
    Fp32,
}

impl FromStr for Precision {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fp16" | "half" => Ok(Precision::Fp16),
            "fp32" | "full" => Ok(Precision::Fp32),
            _ => Err(SettingsError::UnknownPrecision(s.to_string())),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Fp16 => f.write_str("fp16"),
            Precision::Fp32 => f.write_str("fp32"),
        }
    }
}

/// Everything a single generation request needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Model selection as entered, `"<kind>#<name>"` or a bare name.
    pub model: String,
    /// Custom VAE file; `None` keeps the model's built-in VAE.
    #[serde(default)]
    pub vae: Option<String>,
    #[serde(default)]
    pub lora: Option<String>,
    #[serde(default)]
    pub sampler: Sampler,
    pub cfg_scale: f32,
    pub steps: u32,
    #[serde(default)]
    pub size: ImageSize,
    pub prompt: String,
    pub negative_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationSettings {
    /// Default settings for the given model.
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            vae: None,
            lora: None,
            sampler: Sampler::default(),
            cfg_scale: 7.0,
            steps: 24,
            size: ImageSize::default(),
            prompt: "masterpiece, best quality, 1girl".to_string(),
            negative_prompt: "lowres, text, jpeg artifacts, ugly, (worst quality, low quality, \
                              bad quality), (blurry), missing fingers, extra fingers, extra legs, \
                              extra hands"
                .to_string(),
            seed: None,
        }
    }

    /// Parse and apply a single parameter value.
    pub fn set(&mut self, param: Parameter, value: &str) -> Result<(), SettingsError> {
        let raw = value.trim();
        match param {
            Parameter::Model => {
                if raw.is_empty() {
                    return Err(SettingsError::EmptyModel);
                }
                self.model = raw.to_string();
            }
            Parameter::Vae => self.vae = optional(raw, "default"),
            Parameter::Lora => self.lora = optional(raw, "none"),
            Parameter::Sampler => self.sampler = raw.parse()?,
            Parameter::CfgScale => {
                let cfg = raw
                    .parse::<f32>()
                    .map_err(|_| invalid_number(param, raw))?;
                if !(MIN_CFG..=MAX_CFG).contains(&cfg) {
                    return Err(SettingsError::OutOfRange {
                        param,
                        value: raw.to_string(),
                        range: format!("{MIN_CFG}..={MAX_CFG}"),
                    });
                }
                self.cfg_scale = cfg;
            }
            Parameter::Steps => {
                let steps = raw
                    .parse::<u32>()
                    .map_err(|_| invalid_number(param, raw))?;
                if !(1..=MAX_STEPS).contains(&steps) {
                    return Err(SettingsError::OutOfRange {
                        param,
                        value: raw.to_string(),
                        range: format!("1..={MAX_STEPS}"),
                    });
                }
                self.steps = steps;
            }
            Parameter::Size => self.size = raw.parse()?,
            Parameter::Prompt => self.prompt = raw.to_string(),
            Parameter::NegativePrompt => self.negative_prompt = raw.to_string(),
            Parameter::Seed => {
                self.seed = match raw.to_ascii_lowercase().as_str() {
                    "" | "random" | "none" => None,
                    _ => Some(raw.parse().map_err(|_| invalid_number(param, raw))?),
                };
            }
        }
        Ok(())
    }

    /// Current value of a parameter as shown to the user.
    pub fn display_value(&self, param: Parameter) -> String {
        match param {
            Parameter::Model => self.model.clone(),
            Parameter::Vae => self.vae.clone().unwrap_or_else(|| "default".to_string()),
            Parameter::Lora => self.lora.clone().unwrap_or_else(|| "None".to_string()),
            Parameter::Sampler => self.sampler.to_string(),
            Parameter::CfgScale => format!("{:.1}", self.cfg_scale),
            Parameter::Steps => self.steps.to_string(),
            Parameter::Size => self.size.to_string(),
            Parameter::Prompt => self.prompt.clone(),
            Parameter::NegativePrompt => self.negative_prompt.clone(),
            Parameter::Seed => self
                .seed
                .map_or_else(|| "random".to_string(), |seed| seed.to_string()),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::with_model("sd#stable-diffusion-v1-5/stable-diffusion-v1-5")
    }
}

fn optional(raw: &str, none_word: &str) -> Option<String> {
    if raw.is_empty() || raw.eq_ignore_ascii_case(none_word) || raw.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(raw.to_string())
    }
}

fn invalid_number(param: Parameter, raw: &str) -> SettingsError {
    SettingsError::InvalidNumber {
        param,
        value: raw.to_string(),
    }
}
