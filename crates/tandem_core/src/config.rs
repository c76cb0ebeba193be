//! Configuration types for Tandem.
//!
//! This module provides the [`Config`] struct which stores the replica's
//! identity and tool defaults. Configuration is persisted as TOML (typically
//! at `~/.config/tandem/config.toml` on Unix systems).
//!
//! # Key Configuration Fields
//!
//! - `actor_id`: Stable identity of this replica; a random one is used when unset
//! - `data_dir`: Directory holding document snapshots
//! - `default_doc`: Document id used when a command does not name one
//! - `simulation`: Defaults for the mesh simulator
//!
//! # Example
//!
//! ```ignore
//! use tandem_core::config::Config;
//!
//! // Load from default location (native only)
//! let config = Config::load()?;
//!
//! // The configured actor, or a fresh random one
//! let actor = config.actor()?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TandemError};
use crate::types::ActorId;

/// Defaults for `tandem simulate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of replicas in the mesh
    pub replicas: usize,

    /// Number of random steps (edits and deliveries) to run
    pub steps: usize,

    /// Seed for the random number generator; random when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            replicas: 5,
            steps: 200,
            seed: None,
        }
    }
}

/// `Config` is a data structure that represents the parts of Tandem that the user can configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Actor id used for local edits
    /// Each replica needs its own; leave unset to get a random id per run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,

    /// Directory where document snapshots are kept
    pub data_dir: PathBuf,

    /// Document id used when none is given
    #[serde(default = "default_doc_id")]
    pub default_doc: String,

    /// Mesh simulator defaults
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_doc_id() -> String {
    "default".to_string()
}

impl Config {
    /// Create a new config with the given data directory
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            actor_id: None,
            data_dir,
            default_doc: default_doc_id(),
            simulation: SimulationConfig::default(),
        }
    }

    /// The configured actor, or a fresh random one when none is set.
    pub fn actor(&self) -> Result<ActorId> {
        match &self.actor_id {
            Some(id) => ActorId::new(id.as_str()),
            None => Ok(ActorId::random()),
        }
    }

    /// Path of the snapshot file for a document id.
    pub fn doc_path(&self, doc_id: &str) -> PathBuf {
        self.data_dir.join(format!("{doc_id}.json"))
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TandemError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| TandemError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Load config from a specific path, returning the default if it is missing or unreadable.
    pub fn load_from_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("[Config] using defaults, {}", e);
                Self::default()
            }
        }
    }
}

// ============================================================================
// Native-only implementation (not available in WASM)
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tandem");
        Self::new(data_dir)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Config {
    /// Get the config file path (~/.config/tandem/config.toml)
    /// Only available on native platforms
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tandem").join("config.toml"))
    }

    /// Load config from default location, or return default if file doesn't exist
    /// Only available on native platforms
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }

        // Return default config if file doesn't exist
        Ok(Config::default())
    }

    /// Save config to default location
    /// Only available on native platforms
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or(TandemError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Initialize config with a fresh random actor id and save it
    /// Only available on native platforms
    pub fn init(data_dir: PathBuf) -> Result<Self> {
        let config = Config {
            actor_id: Some(ActorId::random().to_string()),
            ..Config::new(data_dir)
        };

        config.save()?;
        Ok(config)
    }
}

// ============================================================================
// WASM-specific implementation
// ============================================================================

#[cfg(target_arch = "wasm32")]
impl Default for Config {
    fn default() -> Self {
        // In WASM there is no data directory; snapshots live in a virtual one
        Self::new(PathBuf::from("/tandem"))
    }
}
