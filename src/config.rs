//! Configuration for chatflow.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CHATFLOW_HOME, CHATFLOW_TENANTS)
//! 2. Config file (.chatflow/config.yaml)
//! 3. Defaults (~/.chatflow)
//!
//! Config file discovery searches the current directory and parents for
//! `.chatflow/config.yaml`. The loaded config is a plain value: built once
//! at startup and passed to the components that need it, never read
//! through ambient globals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::resilience::{DependencyPolicy, Resilience};
use crate::router::RouterSettings;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub router: Option<RouterSettings>,

    #[serde(default)]
    pub idempotency: Option<IdempotencySettings>,

    #[serde(default)]
    pub resilience: Option<ResilienceSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to the config file)
    pub home: Option<String>,

    /// Tenants file (relative to the config file)
    pub tenants: Option<String>,
}

/// Idempotency record retention
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencySettings {
    /// Record TTL in seconds; must exceed the platform's retry window.
    /// Default: 48 hours.
    #[serde(default = "default_idempotency_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_idempotency_ttl_secs() -> u64 {
    48 * 60 * 60
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_idempotency_ttl_secs(),
        }
    }
}

/// Per-dependency resilience policies
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResilienceSettings {
    /// Policy applied when a dependency has no override
    #[serde(default)]
    pub default: DependencyPolicy,

    /// Overrides keyed by dependency name ("llm", "payment", "transport",
    /// "ledger")
    #[serde(default)]
    pub dependencies: HashMap<String, DependencyPolicy>,
}

impl ResilienceSettings {
    /// Build the process-wide resilience layer from these settings
    pub fn build(&self) -> Resilience {
        let mut resilience = Resilience::new(self.default.clone());
        for (dependency, policy) in &self.dependencies {
            resilience = resilience.with_policy(dependency.clone(), policy.clone());
        }
        resilience
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ChatflowConfig {
    /// Engine state directory (conversation logs, transcripts)
    pub home: PathBuf,

    /// Tenants file, if configured
    pub tenants_file: Option<PathBuf>,

    pub router: RouterSettings,
    pub idempotency: IdempotencySettings,
    pub resilience: ResilienceSettings,

    /// Path the config was loaded from (if a file was found)
    pub config_file: Option<PathBuf>,
}

impl Default for ChatflowConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            tenants_file: None,
            router: RouterSettings::default(),
            idempotency: IdempotencySettings::default(),
            resilience: ResilienceSettings::default(),
            config_file: None,
        }
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatflow")
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".chatflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

impl ChatflowConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self> {
        let config_file = find_config_file();

        let (file, base_dir) = match &config_file {
            Some(path) => {
                let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
                (load_config_file(path)?, base)
            }
            None => (ConfigFile::default(), PathBuf::new()),
        };

        let home = if let Ok(env_home) = std::env::var("CHATFLOW_HOME") {
            PathBuf::from(env_home)
        } else if let Some(home) = &file.paths.home {
            resolve_path(&base_dir, home)
        } else {
            default_home()
        };

        let tenants_file = if let Ok(env_tenants) = std::env::var("CHATFLOW_TENANTS") {
            Some(PathBuf::from(env_tenants))
        } else {
            file.paths
                .tenants
                .as_deref()
                .map(|p| resolve_path(&base_dir, p))
        };

        Ok(Self {
            home,
            tenants_file,
            router: file.router.unwrap_or_default(),
            idempotency: file.idempotency.unwrap_or_default(),
            resilience: file.resilience.unwrap_or_default(),
            config_file,
        })
    }

    /// Directory for JSONL conversation logs
    pub fn conversations_dir(&self) -> PathBuf {
        self.home.join("conversations")
    }

    /// Directory for transcripts
    pub fn transcripts_dir(&self) -> PathBuf {
        self.home.join("transcripts")
    }
}
