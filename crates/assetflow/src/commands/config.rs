//! Configuration file loading (assetflow.toml).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use assetflow_pipeline::PipelineConfig;
use assetflow_server::DevServerConfig;
use serde::Deserialize;

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default)]
    styles: StylesConfig,
    #[serde(default)]
    scripts: ScriptsConfig,
    #[serde(default)]
    images: ImagesConfig,
    #[serde(default)]
    sprite: SpriteConfig,
    #[serde(default)]
    server: ServerConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathsConfig {
    #[serde(default = "default_app")]
    app: PathBuf,
    #[serde(default = "default_dist")]
    dist: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            app: default_app(),
            dist: default_dist(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StylesConfig {
    entries: Option<Vec<PathBuf>>,
    browsers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ScriptsConfig {
    entries: Option<Vec<PathBuf>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ImagesConfig {
    avif_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SpriteConfig {
    example: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ServerConfig {
    host: Option<String>,
    port: Option<u16>,
    open: Option<bool>,
    settle_ms: Option<u64>,
}

fn default_app() -> PathBuf {
    PathBuf::from("app")
}
fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub server: DevServerConfig,
}

/// Resolve a configured path against the directory holding the config file.
fn rebase(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path
    } else {
        base.join(path)
    }
}

impl ConfigFile {
    /// Apply the file on top of the default layout. Relative paths are taken
    /// from `base`.
    pub fn into_settings(self, base: &Path) -> Result<Settings> {
        let mut pipeline = PipelineConfig::with_dirs(
            rebase(base, self.paths.app),
            rebase(base, self.paths.dist),
        );

        if let Some(entries) = self.styles.entries {
            pipeline.style_entries = entries.into_iter().map(|p| rebase(base, p)).collect();
        }
        if let Some(browsers) = self.styles.browsers {
            pipeline.browsers = browsers;
        }
        if let Some(entries) = self.scripts.entries {
            pipeline.script_entries = entries.into_iter().map(|p| rebase(base, p)).collect();
        }
        if let Some(quality) = self.images.avif_quality {
            if !(1..=100).contains(&quality) {
                anyhow::bail!("images.avif_quality must be between 1 and 100, got {}", quality);
            }
            pipeline.avif_quality = quality;
        }
        if let Some(example) = self.sprite.example {
            pipeline.sprite_example = example;
        }

        let mut server = DevServerConfig::default();
        if let Some(host) = self.server.host {
            server.host = host;
        }
        if let Some(port) = self.server.port {
            server.port = port;
        }
        if let Some(open) = self.server.open {
            server.open = open;
        }
        if let Some(ms) = self.server.settle_ms {
            server.settle = Duration::from_millis(ms);
        }

        Ok(Settings { pipeline, server })
    }
}

/// Load settings from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
///
/// Paths in the file are relative to the file's directory; without a file
/// the default layout is relative to the working directory.
pub fn load(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::debug!("No {} found, using defaults", path.display());
        return ConfigFile::default().into_settings(Path::new(""));
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());

    config.into_settings(path.parent().unwrap_or(Path::new("")))
}
