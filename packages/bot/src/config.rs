//! Bot configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use bot_core::{GenerationSettings, ModelKind, Precision, SettingsError};
use storage::{StorageConfig, StorageError};

use crate::transport::UserId;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Runtime configuration for the bot.
///
/// | Env Var              | Default                                        |
/// |----------------------|------------------------------------------------|
/// | `ALLOWED_USER_ID`    | required                                       |
/// | `BOT_TOKEN`          | unset                                          |
/// | `MODELS_PATH`        | `models/checkpoints`                           |
/// | `LORA_PATH`          | `models/lora`                                  |
/// | `VAE_PATH`           | `models/vae`                                   |
/// | `DEFAULT_MODEL`      | `stable-diffusion-v1-5/stable-diffusion-v1-5`  |
/// | `DEFAULT_MODEL_TYPE` | `sd`                                           |
/// | `DEFAULT_PRECISION`  | `fp16`                                         |
/// | `USE_XFORMERS`       | `false`                                        |
/// | `GENERATOR_COMMAND`  | required by the `image-bot` binary             |
/// | `STATUS_POLL_SECS`   | `5`                                            |
///
/// Storage variables are documented on [`StorageConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Chat platform token. The console transport does not need one.
    pub bot_token: Option<String>,
    /// The only user the bot serves.
    pub allowed_user_id: UserId,
    pub models_path: PathBuf,
    pub lora_path: PathBuf,
    pub vae_path: PathBuf,
    pub default_model: String,
    /// Kind assumed for model names without a `<kind>#` prefix.
    pub default_model_kind: ModelKind,
    pub precision: Precision,
    pub use_xformers: bool,
    /// Program and arguments of the external generator.
    pub generator_command: Vec<String>,
    /// How often queued requests get their status message refreshed.
    pub status_poll: Duration,
    pub storage: StorageConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`BotConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).and_then(non_empty);

        let allowed_user_id = var("ALLOWED_USER_ID").ok_or(ConfigError::Missing("ALLOWED_USER_ID"))?;
        let allowed_user_id = allowed_user_id
            .parse::<i64>()
            .map(UserId)
            .map_err(|e| ConfigError::Invalid {
                var: "ALLOWED_USER_ID",
                value: allowed_user_id.clone(),
                reason: e.to_string(),
            })?;

        let precision = match var("DEFAULT_PRECISION") {
            Some(value) => value.parse()?,
            None => Precision::default(),
        };

        let use_xformers = match var("USE_XFORMERS") {
            Some(value) => parse_bool("USE_XFORMERS", &value)?,
            None => false,
        };

        let status_poll = match var("STATUS_POLL_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "STATUS_POLL_SECS",
                        value,
                        reason: "expected a positive number of seconds".to_string(),
                    });
                }
            },
            None => Duration::from_secs(5),
        };

        Ok(Self {
            bot_token: var("BOT_TOKEN"),
            allowed_user_id,
            models_path: var("MODELS_PATH")
                .unwrap_or_else(|| "models/checkpoints".into())
                .into(),
            lora_path: var("LORA_PATH").unwrap_or_else(|| "models/lora".into()).into(),
            vae_path: var("VAE_PATH").unwrap_or_else(|| "models/vae".into()).into(),
            default_model: var("DEFAULT_MODEL")
                .unwrap_or_else(|| "stable-diffusion-v1-5/stable-diffusion-v1-5".into()),
            default_model_kind: ModelKind::parse(&var("DEFAULT_MODEL_TYPE").unwrap_or_default()),
            precision,
            use_xformers,
            generator_command: var("GENERATOR_COMMAND")
                .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            status_poll,
            storage: StorageConfig::from_lookup(&lookup)?,
        })
    }

    /// The external generator command, for backends that run one.
    pub fn require_generator_command(&self) -> Result<&[String], ConfigError> {
        if self.generator_command.is_empty() {
            return Err(ConfigError::Missing("GENERATOR_COMMAND"));
        }
        Ok(&self.generator_command)
    }

    /// Settings a user starts from, and returns to with `/default`.
    pub fn default_settings(&self) -> GenerationSettings {
        GenerationSettings::with_model(self.default_model.clone())
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true/false".to_string(),
        }),
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::collections::HashMap;

    use storage::StorageBackendConfig;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn requires_allowed_user() {
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("ALLOWED_USER_ID"))
        ));
        assert!(matches!(
            BotConfig::from_lookup(lookup(&[("ALLOWED_USER_ID", "me")])),
            Err(ConfigError::Invalid { var: "ALLOWED_USER_ID", .. })
        ));
    }

    #[test]
    fn defaults_fill_the_rest() -> Result<(), ConfigError> {
        let config = BotConfig::from_lookup(lookup(&[("ALLOWED_USER_ID", "42")]))?;
        assert_eq!(config.allowed_user_id, UserId(42));
        assert_eq!(config.models_path, PathBuf::from("models/checkpoints"));
        assert_eq!(config.default_model_kind, ModelKind::Sd);
        assert_eq!(config.precision, Precision::Fp16);
        assert!(!config.use_xformers);
        assert!(config.generator_command.is_empty());
        assert!(matches!(
            config.require_generator_command(),
            Err(ConfigError::Missing("GENERATOR_COMMAND"))
        ));
        assert_eq!(config.status_poll, Duration::from_secs(5));
        assert_eq!(
            config.storage.backend,
            StorageBackendConfig::Filesystem {
                root: PathBuf::from("./outputs")
            }
        );
        assert_eq!(config.default_settings().model, config.default_model);
        Ok(())
    }

    #[test]
    fn overrides_are_parsed() -> Result<(), ConfigError> {
        let config = BotConfig::from_lookup(lookup(&[
            ("ALLOWED_USER_ID", "7"),
            ("DEFAULT_MODEL_TYPE", "pony"),
            ("DEFAULT_PRECISION", "fp32"),
            ("USE_XFORMERS", "yes"),
            ("GENERATOR_COMMAND", "python3 generate.py --quiet"),
            ("STATUS_POLL_SECS", "2"),
            ("STORAGE_BACKEND", "memory"),
        ]))?;
        assert!(config.default_model_kind.is_xl());
        assert_eq!(config.precision, Precision::Fp32);
        assert!(config.use_xformers);
        assert_eq!(
            config.require_generator_command()?,
            ["python3", "generate.py", "--quiet"]
        );
        assert_eq!(config.status_poll, Duration::from_secs(2));
        assert_eq!(config.storage.backend, StorageBackendConfig::Memory);
        Ok(())
    }

    #[test]
    fn rejects_bad_values() {
        for (var, value) in [
            ("USE_XFORMERS", "maybe"),
            ("STATUS_POLL_SECS", "0"),
            ("DEFAULT_PRECISION", "int8"),
            ("STORAGE_BACKEND", "s3"),
        ] {
            let result = BotConfig::from_lookup(lookup(&[("ALLOWED_USER_ID", "1"), (var, value)]));
            assert!(result.is_err(), "{var}={value} should be rejected");
        }
    }
}
