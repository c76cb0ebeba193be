//! Shared utilities for CLI commands

use chrono::{DateTime, Local};
use std::fmt::Display;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tandem_core::config::Config;
use tandem_core::{ActorId, DocHandle, OpSetEngine, Result, TandemError};

/// Document handle type used by the CLI.
pub type CliDoc = DocHandle<OpSetEngine>;

/// Loaded configuration plus the engine every command shares.
pub struct CliContext {
    pub config: Config,
    /// Config file given with `--config`, if any
    pub config_path: Option<PathBuf>,
    pub engine: Arc<OpSetEngine>,
}

impl CliContext {
    /// Load the config from `--config` or the default location.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = match &config_path {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        Ok(Self {
            config,
            config_path,
            engine: Arc::new(OpSetEngine::new()),
        })
    }

    /// Actor for local edits.
    pub fn actor(&self) -> Result<ActorId> {
        if self.config.actor_id.is_none() {
            log::warn!(
                "[CLI] no actor_id configured; using a random one for this run (run `tandem config init`)"
            );
        }
        self.config.actor()
    }

    /// Load a snapshot file edited by the configured actor.
    pub fn open_doc(&self, file: &Path) -> Result<CliDoc> {
        self.open_doc_as(file, self.actor()?)
    }

    /// Map a bare document name such as `notes` into the data directory.
    /// Anything else is used as given.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        let mut components = file.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if file.extension().is_none() => {
                self.config.doc_path(&name.to_string_lossy())
            }
            _ => file.to_path_buf(),
        }
    }

    /// Load a snapshot file edited by `actor`.
    pub fn open_doc_as(&self, file: &Path, actor: ActorId) -> Result<CliDoc> {
        let file = self.resolve(file);
        let bytes = std::fs::read(&file).map_err(|e| TandemError::FileRead {
            path: file.clone(),
            source: e,
        })?;
        DocHandle::load(Arc::clone(&self.engine), actor, &bytes)
    }

    /// Write a snapshot file.
    pub fn save_doc(&self, doc: &CliDoc, file: &Path) -> Result<()> {
        let file = self.resolve(file);
        let bytes = doc.save()?;
        if let Some(parent) = file.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file, bytes).map_err(|e| TandemError::FileWrite {
            path: file.clone(),
            source: e,
        })
    }
}

/// Parse a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Pretty-print a JSON value.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

/// Render a change timestamp (milliseconds since the epoch) as local time.
pub fn format_time(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(time) => time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => millis.to_string(),
    }
}

/// Report an error and return false.
pub fn fail(e: impl Display) -> bool {
    eprintln!("✗ {}", e);
    false
}
