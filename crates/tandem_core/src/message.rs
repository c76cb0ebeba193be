//! Wire-level sync messages.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::change::Change;
use crate::clock::Clock;
use crate::error::{Result, TandemError};

/// One protocol turn for one document.
///
/// `clock` reflects the sender's full knowledge of the document after
/// applying any `changes` carried by this same message. A message without
/// changes is a pure clock announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Document the message is about.
    pub doc_id: String,
    /// Sender's clock for the document.
    pub clock: Clock,
    /// Changes the receiver is believed to be missing.
    #[serde(default)]
    pub changes: Vec<Change>,
}

impl Message {
    /// A clock-only announcement.
    pub fn announce(doc_id: impl Into<String>, clock: Clock) -> Self {
        Self {
            doc_id: doc_id.into(),
            clock,
            changes: Vec::new(),
        }
    }

    /// A message carrying changes.
    pub fn with_changes(doc_id: impl Into<String>, clock: Clock, changes: Vec<Change>) -> Self {
        Self {
            doc_id: doc_id.into(),
            clock,
            changes,
        }
    }

    /// Whether the message carries no changes.
    pub fn is_announcement(&self) -> bool {
        self.changes.is_empty()
    }

    /// Structural validation: a non-empty document id and well-formed actor
    /// ids. Changes are validated by the engine when applied.
    pub fn validate(&self) -> Result<()> {
        if self.doc_id.is_empty() {
            return Err(TandemError::InvalidMessage("missing docId".to_string()));
        }
        self.clock.validate()?;
        for change in &self.changes {
            change.actor.validate()?;
        }
        Ok(())
    }

    /// Parse and validate a JSON message.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        if raw.get("docId").and_then(|v| v.as_str()).is_none() {
            return Err(TandemError::InvalidMessage("missing docId".to_string()));
        }
        let message: Message = serde_json::from_value(raw)
            .map_err(|e| TandemError::InvalidMessage(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
