/// Clap argument definitions
mod args;

/// Config command handlers
mod config;

/// Document commands (`new`, `show`, `set`, `insert`, `delete`, `merge`, `history`)
mod document;

/// Randomized mesh simulation
mod simulate;

/// Two-file synchronization through the sync protocol
mod sync;

/// Shared CLI utilities
mod util;

use clap::Parser;

use tandem_core::Mutation;
use tandem_core::path::parse_path;

pub use args::Cli;
use args::Commands;
use util::CliContext;

/// Main entry point for the CLI
pub fn run_cli() {
    let cli = Cli::parse();

    // Config commands must work even when the config file is broken
    let success = match cli.command {
        Commands::Config { command } => config::handle_config_command(command, cli.config),
        command => match CliContext::load(cli.config) {
            Ok(ctx) => run_command(&ctx, command),
            Err(e) => util::fail(e),
        },
    };

    if !success {
        std::process::exit(1);
    }
}

/// Execute a command. Returns true on success.
fn run_command(ctx: &CliContext, command: Commands) -> bool {
    match command {
        Commands::New { file, force } => document::handle_new(ctx, &file, force),

        Commands::Show { file, verbose } => document::handle_show(ctx, &file, verbose),

        Commands::Set {
            file,
            path,
            value,
            message,
        } => match parse_path(&path) {
            Ok(path) => {
                let value = util::parse_value(&value);
                document::handle_mutation(ctx, &file, Mutation::Set { path, value }, message)
            }
            Err(e) => util::fail(e),
        },

        Commands::Insert {
            file,
            path,
            value,
            message,
        } => match parse_path(&path) {
            Ok(path) => {
                let value = util::parse_value(&value);
                document::handle_mutation(ctx, &file, Mutation::Insert { path, value }, message)
            }
            Err(e) => util::fail(e),
        },

        Commands::Delete {
            file,
            path,
            message,
        } => match parse_path(&path) {
            Ok(path) => document::handle_mutation(ctx, &file, Mutation::Delete { path }, message),
            Err(e) => util::fail(e),
        },

        Commands::Merge { file, from } => document::handle_merge(ctx, &file, &from),

        Commands::History {
            file,
            limit,
            snapshots,
        } => document::handle_history(ctx, &file, limit, snapshots),

        Commands::Sync { a, b } => sync::handle_sync(ctx, &a, &b),

        Commands::Simulate {
            replicas,
            steps,
            seed,
        } => simulate::handle_simulate(ctx, replicas, steps, seed),

        Commands::Config { command } => {
            config::handle_config_command(command, ctx.config_path.clone())
        }
    }
}
