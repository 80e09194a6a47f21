//! Configuration loading from modkit.toml.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use surface::{ModPackageDefinition, ModPackageRegistry};

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the audit database and live state are kept.
    pub data_dir: Option<PathBuf>,

    /// Default log filter when `MODKIT_LOG` is unset.
    pub log_level: String,

    /// Suppress the legacy break-insertion toolbar group.
    pub cutover_enabled: bool,

    /// Command catalog for module diagnostics. Unset skips command checks.
    pub known_commands: Option<Vec<String>>,

    /// Toolbar ids owned by built-in surfaces; mods cannot claim them.
    pub reserved_toolbar_ids: Vec<String>,

    /// Package id to activate after loading `packages`.
    pub active_package: Option<String>,

    /// Mod package definitions (JSON files).
    pub packages: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_level: "warn".to_string(),
            cutover_enabled: false,
            known_commands: None,
            reserved_toolbar_ids: Vec::new(),
            active_package: None,
            packages: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `explicit` if given, else `default_path` if it exists, else defaults.
    pub fn discover(explicit: Option<&Path>, default_path: &Path) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if default_path.exists() => Self::load(default_path),
            None => Ok(Self::default()),
        }
    }

    /// Load every configured package and activate `active_package`.
    pub fn package_registry(&self) -> Result<ModPackageRegistry, ConfigError> {
        let mut registry = ModPackageRegistry::new();
        for path in &self.packages {
            let package = ModPackageDefinition::load(path).map_err(|source| ConfigError::Package {
                path: path.clone(),
                source,
            })?;
            if registry.register(package) {
                tracing::warn!(path = %path.display(), "package id registered twice; last one wins");
            }
        }
        registry
            .set_active(self.active_package.as_deref())
            .map_err(|source| ConfigError::Package {
                path: PathBuf::from("active_package"),
                source,
            })?;
        Ok(registry)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("failed to load package {path}: {source}")]
    Package {
        path: PathBuf,
        #[source]
        source: surface::Error,
    },
}
