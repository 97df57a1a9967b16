mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to load config file: {:?}", path))?;

    Ok(config)
}

/// Parse and validate configuration text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./streamforged.toml",
        "~/.config/streamforged/config.toml",
        "/etc/streamforged/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.streaming.chunk_size == 0 {
        anyhow::bail!("streaming.chunk_size must be greater than 0");
    }

    if config.streaming.liveness_check_interval == 0 {
        anyhow::bail!("streaming.liveness_check_interval must be greater than 0");
    }

    if config.streaming.max_concurrent_streams == 0 {
        anyhow::bail!("streaming.max_concurrent_streams must be greater than 0");
    }

    if config.hls.segment_duration_secs == 0 {
        anyhow::bail!("hls.segment_duration_secs must be greater than 0");
    }

    if let Some(secret) = &config.signing.secret {
        if secret.trim().is_empty() {
            anyhow::bail!("signing.secret is set but empty");
        }
    }

    for rule in &config.transcoding.rules {
        if rule.steps.is_empty() || rule.steps.len() > streamforged_av::chain::MAX_STAGES {
            anyhow::bail!(
                "Transcoding rule '{}' needs 1 to {} steps, has {}",
                rule.name,
                streamforged_av::chain::MAX_STAGES,
                rule.steps.len()
            );
        }
        if rule.source_formats.is_empty() {
            tracing::warn!("Transcoding rule '{}' has no source formats", rule.name);
        }
    }

    if let Some(catalog) = &config.library.catalog {
        if !catalog.exists() {
            tracing::warn!("Library catalog does not exist: {:?}", catalog);
        }
    }

    if !config
        .users
        .iter()
        .any(|u| u.name == config.streaming.default_user)
    {
        tracing::warn!(
            "Default user '{}' is not listed under [[users]]; it will be created with the stream role",
            config.streaming.default_user
        );
    }

    Ok(())
}
