//! # Configuration
//!
//! `tessera.toml` holds the database location, the log format and the
//! policies to seed into a vault:
//!
//! ```toml
//! database = "tessera.db"
//! log_format = "json"
//!
//! [[tool_policies]]
//! org_id = "acme"
//! tool_name = "search"
//! mode = "approve"
//! allowed_roles = ["security"]
//! constraints = { max_args_bytes = 4096, allow_network = true }
//!
//! [[model_policies]]
//! org_id = "acme"
//! provider = "openai"
//! model_name = "gpt-4o"
//! max_rpm = 60
//! max_failures = 5
//! cooldown_seconds = 300
//! ```
//!
//! Command-line flags win over file values.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tessera_core::{Actor, ModelPolicy, TesseraError, ToolPolicy, Vault};

/// Config file read when neither `--config` nor `TESSERA_CONFIG` is set.
pub const DEFAULT_CONFIG_FILE: &str = "tessera.toml";

/// Vault file used when neither the flag nor the config names one.
pub const DEFAULT_DATABASE: &str = "tessera.db";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TESSERA_CONFIG";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// CONFIG
// =============================================================================

/// Parsed `tessera.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: Option<PathBuf>,
    /// `json` or `text`.
    pub log_format: Option<String>,
    pub tool_policies: Vec<ToolPolicy>,
    pub model_policies: Vec<ModelPolicy>,
}

impl Config {
    /// Parse config text.
    pub fn from_toml_str(text: &str) -> Result<Self, TesseraError> {
        let config: Config = toml::from_str(text)
            .map_err(|e| TesseraError::Schema(format!("invalid config: {}", e)))?;
        if let Some(format) = config.log_format.as_deref() {
            if format != "json" && format != "text" {
                return Err(TesseraError::Schema(format!(
                    "invalid config: log_format must be 'json' or 'text', got '{}'",
                    format
                )));
            }
        }
        Ok(config)
    }

    /// Load the config named by `explicit`, else by `TESSERA_CONFIG`, else
    /// `tessera.toml` in the working directory.
    ///
    /// Only the default file may be absent; a named file that does not
    /// exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, TesseraError> {
        let env = std::env::var(CONFIG_ENV).ok();
        let (path, named) = resolve_path(explicit, env.as_deref());
        if !named && !path.exists() {
            tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Read and parse one config file.
    ///
    /// A missing or unreadable file is `Io`; an oversized one is `Schema`.
    pub fn from_file(path: &Path) -> Result<Self, TesseraError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            TesseraError::Io(format!("config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TesseraError::Schema(format!(
                "config '{}' is {} bytes, maximum is {}",
                path.display(),
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            TesseraError::Io(format!("read config '{}': {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Self::from_toml_str(&text)
    }

    /// The vault path: the flag, else the config value, else `tessera.db`.
    #[must_use]
    pub fn database_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    /// Write every configured policy into the vault. Each write is audited
    /// by the engine as a `config` event attributed to `actor`.
    pub fn seed(&self, vault: &Vault, actor: &Actor) -> Result<SeedReport, TesseraError> {
        let tools = vault.tools();
        for policy in &self.tool_policies {
            tools.set_policy(policy, actor)?;
        }
        let models = vault.models();
        for policy in &self.model_policies {
            models.set_policy(policy, actor)?;
        }
        tracing::info!(
            tool_policies = self.tool_policies.len(),
            model_policies = self.model_policies.len(),
            "policies seeded"
        );
        Ok(SeedReport {
            tool_policies: self.tool_policies.len(),
            model_policies: self.model_policies.len(),
        })
    }
}

/// Counts written by [`Config::seed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub tool_policies: usize,
    pub model_policies: usize,
}

/// Pick the config path. The flag beats the environment; the bool says
/// whether the path was named explicitly.
fn resolve_path(explicit: Option<&Path>, env: Option<&str>) -> (PathBuf, bool) {
    match (explicit, env) {
        (Some(path), _) => (path.to_path_buf(), true),
        (None, Some(env)) if !env.is_empty() => (PathBuf::from(env), true),
        _ => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    }
}

// =============================================================================
// TESTS
// =============================================================================
