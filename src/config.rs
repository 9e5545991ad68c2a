// Project-level push configuration (ecr-push.toml / .ecr-push.toml)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

pub const CONFIG_FILE_NAME: &str = "ecr-push.toml";
pub const HIDDEN_CONFIG_FILE_NAME: &str = ".ecr-push.toml";

/// Root structure for ecr-push.toml / .ecr-push.toml
#[derive(Debug, Deserialize, Default)]
pub struct ProjectPushConfig {
    /// Optional version (must be 1 if present)
    pub version: Option<u32>,

    /// Image settings (optional)
    #[serde(default)]
    pub image: Option<ImageConfig>,

    /// AWS settings (optional)
    #[serde(default)]
    pub aws: Option<AwsConfig>,
}

/// What to build and how to build it
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ImageConfig {
    /// Repository / image name
    pub name: Option<String>,

    /// Image tag
    pub tag: Option<String>,

    /// Dockerfile path, relative to the build context
    pub dockerfile: Option<String>,

    /// Build arguments passed to the build
    /// Format: KEY=VALUE or KEY (to pass from environment)
    pub build_args: Option<Vec<String>>,

    /// Container CLI to use (docker or podman)
    pub container_cli: Option<String>,

    /// Remove dangling images after the push
    pub prune: Option<bool>,
}

/// Where to push
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub profile: Option<String>,

    /// How AWS is reached (cli or sdk)
    pub backend: Option<String>,

    /// Enable vulnerability scanning when creating the repository
    pub scan_on_push: Option<bool>,
}

/// Load project configuration from ecr-push.toml or .ecr-push.toml
///
/// Searches for ecr-push.toml first, then .ecr-push.toml in the given directory.
/// Returns Ok(None) if no config file is found.
/// Returns Err if file exists but cannot be read or parsed, or if version is unsupported.
pub fn load_project_config(dir: &Path) -> Result<Option<ProjectPushConfig>> {
    let visible = dir.join(CONFIG_FILE_NAME);
    let hidden = dir.join(HIDDEN_CONFIG_FILE_NAME);

    if visible.exists() && hidden.exists() {
        warn!(
            "Both {} and {} found. Using {}.",
            CONFIG_FILE_NAME, HIDDEN_CONFIG_FILE_NAME, CONFIG_FILE_NAME
        );
    }

    let config_path = if visible.exists() {
        visible
    } else if hidden.exists() {
        hidden
    } else {
        return Ok(None);
    };

    info!("Loading project config from {}", config_path.display());
    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    // Deserialize and collect any unused fields
    let mut unused_fields = Vec::new();
    let deserializer = toml::Deserializer::new(&content);
    let config: ProjectPushConfig = serde_ignored::deserialize(deserializer, |path| {
        unused_fields.push(path.to_string());
    })
    .with_context(|| format!("Failed to parse {}", config_path.display()))?;

    for field in &unused_fields {
        warn!(
            "Unknown configuration field in {}: {}",
            config_path.display(),
            field
        );
    }

    match config.version {
        Some(1) => {}
        Some(version) => anyhow::bail!(
            "Unsupported {} version: {}. This CLI supports version 1.",
            CONFIG_FILE_NAME,
            version
        ),
        None => debug!("No version specified in {}, using latest", CONFIG_FILE_NAME),
    }

    Ok(Some(config))
}
