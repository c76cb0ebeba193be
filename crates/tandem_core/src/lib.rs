#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Change records and operations
pub mod change;

/// Vector clocks
pub mod clock;

/// Configuration options
pub mod config;

/// Peer synchronization protocol
pub mod connection;

/// Multi-document registry
pub mod doc_set;

/// Replicated state engines
pub mod engine;

/// Error (common error types)
pub mod error;

/// Document handles
pub mod handle;

/// Change history with lazy snapshots
pub mod history;

/// Merge and diff between handles
pub mod merge;

/// In-process replica mesh (simulation and tests)
pub mod mesh;

/// Wire messages
pub mod message;

/// Patches describing the effect of changes
pub mod patch;

/// Document paths and local mutations
pub mod path;

/// Handler registry
pub mod registry;

/// Identifiers and scalar values
pub mod types;

/// Single-document wrapper with notifications
pub mod watchable;

pub use change::{Change, Op, OpAction};
pub use clock::Clock;
pub use config::Config;
pub use connection::{Connection, ConnectionState};
pub use doc_set::DocSet;
pub use engine::{Engine, OpSet, OpSetEngine};
pub use error::{ErrorKind, Result, TandemError};
pub use handle::DocHandle;
pub use history::{History, HistoryEntry, get_history};
pub use merge::{diff, merge};
pub use mesh::Mesh;
pub use message::Message;
pub use patch::{Diff, DiffAction, Patch};
pub use path::{Mutation, PathSegment, parse_path};
pub use registry::HandlerId;
pub use types::{ActorId, Value};
pub use watchable::WatchableDoc;
