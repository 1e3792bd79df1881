//! Lists models, LoRAs and VAEs available on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bot_core::SAMPLERS;

use crate::config::BotConfig;

const WEIGHT_EXTENSIONS: [&str; 2] = ["safetensors", "ckpt"];

/// Kind of selectable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Models,
    Loras,
    Vaes,
    Samplers,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Models => "models",
            ResourceKind::Loras => "LoRAs",
            ResourceKind::Vaes => "VAEs",
            ResourceKind::Samplers => "samplers",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceScanner {
    models_path: PathBuf,
    lora_path: PathBuf,
    vae_path: PathBuf,
}

impl ResourceScanner {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            models_path: config.models_path.clone(),
            lora_path: config.lora_path.clone(),
            vae_path: config.vae_path.clone(),
        }
    }

    /// Directory scanned for `kind`, `None` for samplers.
    pub fn directory(&self, kind: ResourceKind) -> Option<&Path> {
        match kind {
            ResourceKind::Models => Some(&self.models_path),
            ResourceKind::Loras => Some(&self.lora_path),
            ResourceKind::Vaes => Some(&self.vae_path),
            ResourceKind::Samplers => None,
        }
    }

    pub async fn scan(&self, kind: ResourceKind) -> std::io::Result<Vec<String>> {
        match self.directory(kind) {
            Some(dir) => scan_directory(dir).await,
            None => Ok(SAMPLERS.iter().map(|s| s.to_string()).collect()),
        }
    }
}

/// Weight files directly under `dir`, sorted. A missing directory has none.
async fn scan_directory(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_weights = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| WEIGHT_EXTENSIONS.contains(&ext));
        if !is_weights {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::error::Error;

    use super::*;

    #[tokio::test]
    async fn lists_weight_files_sorted() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        for name in ["b.safetensors", "a.ckpt", "notes.txt", "c.safetensors.part"] {
            std::fs::write(dir.path().join(name), b"")?;
        }
        assert_eq!(
            scan_directory(dir.path()).await?,
            vec!["a.ckpt", "b.safetensors"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_is_empty() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        assert!(scan_directory(&dir.path().join("nope")).await?.is_empty());
        Ok(())
    }
}
