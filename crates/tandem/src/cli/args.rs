//! Command-line argument structures and enums

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(version)]
#[command(about = "Edit and synchronize replicated JSON documents", long_about = None)]
pub struct Cli {
    /// Use this config file instead of the default location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty document snapshot
    New {
        /// Snapshot file to create
        file: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print a document as JSON
    Show {
        /// Snapshot file
        file: PathBuf,

        /// Also print the clock and queued changes
        #[arg(short, long)]
        verbose: bool,
    },

    /// Set a map property or list element
    Set {
        /// Snapshot file
        file: PathBuf,

        /// Dotted path, e.g. "todos.0.title"
        path: String,

        /// JSON value
        value: String,

        /// Description stored with the change
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Insert a list element before the given index
    Insert {
        /// Snapshot file
        file: PathBuf,

        /// Dotted path ending in a list index, e.g. "todos.0"
        path: String,

        /// JSON value
        value: String,

        /// Description stored with the change
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Delete a map property or list element
    Delete {
        /// Snapshot file
        file: PathBuf,

        /// Dotted path
        path: String,

        /// Description stored with the change
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Merge another replica's changes into a document
    Merge {
        /// Snapshot file to update
        file: PathBuf,

        /// Snapshot file to read changes from
        from: PathBuf,
    },

    /// List the changes of a document
    History {
        /// Snapshot file
        file: PathBuf,

        /// Show only the last N changes
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the document after each change
        #[arg(short, long)]
        snapshots: bool,
    },

    /// Synchronize two snapshot files through the sync protocol
    Sync {
        /// First snapshot file
        a: PathBuf,

        /// Second snapshot file
        b: PathBuf,
    },

    /// Run a randomized convergence simulation
    Simulate {
        /// Number of replicas (default: config's simulation.replicas)
        #[arg(short, long)]
        replicas: Option<usize>,

        /// Number of random steps (default: config's simulation.steps)
        #[arg(short = 'n', long)]
        steps: Option<usize>,

        /// Random seed (default: config's simulation.seed, else random)
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration
    Show,

    /// Write a config file with a fresh actor id
    Init {
        /// Directory for document snapshots
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}
