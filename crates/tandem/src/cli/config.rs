//! Config command handlers

use std::path::PathBuf;

use tandem_core::config::Config;

use crate::cli::args::ConfigCommands;
use crate::cli::util::fail;

/// Handle `config` subcommands. Returns true on success.
pub fn handle_config_command(command: Option<ConfigCommands>, config_path: Option<PathBuf>) -> bool {
    match command {
        None | Some(ConfigCommands::Show) => show_config(config_path),
        Some(ConfigCommands::Init { data_dir, force }) => init_config(config_path, data_dir, force),
    }
}

/// Show the current tandem configuration
fn show_config(config_path: Option<PathBuf>) -> bool {
    let path = config_path.or_else(Config::config_path);
    let config = match &path {
        Some(path) if path.exists() => match Config::load_from(path) {
            Ok(config) => config,
            Err(e) => return fail(e),
        },
        _ => {
            println!("(no config file, showing defaults)");
            Config::default()
        }
    };

    println!("Tandem Configuration");
    println!("====================");
    match &config.actor_id {
        Some(actor) => println!("Actor id: {}", actor),
        None => println!("Actor id: (random per run)"),
    }
    println!("Data directory: {}", config.data_dir.display());
    println!("Default document: {}", config.default_doc);
    println!(
        "Simulation: {} replicas, {} steps, seed {}",
        config.simulation.replicas,
        config.simulation.steps,
        config
            .simulation
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "random".to_string())
    );
    if let Some(path) = path {
        println!("Config file: {}", path.display());
    }
    true
}

/// Write a config file with a fresh actor id
fn init_config(config_path: Option<PathBuf>, data_dir: Option<PathBuf>, force: bool) -> bool {
    let data_dir = data_dir.unwrap_or_else(|| Config::default().data_dir);
    let Some(path) = config_path.clone().or_else(Config::config_path) else {
        return fail("could not determine a config directory; pass --config");
    };
    if path.exists() && !force {
        return fail(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }

    let result = match config_path {
        Some(path) => {
            let config = Config {
                actor_id: Some(tandem_core::ActorId::random().to_string()),
                ..Config::new(data_dir)
            };
            config.save_to(&path).map(|()| config)
        }
        None => Config::init(data_dir),
    };
    match result {
        Ok(config) => {
            println!("✓ Wrote {}", path.display());
            if let Some(actor) = config.actor_id {
                println!("  Actor id: {}", actor);
            }
            true
        }
        Err(e) => fail(e),
    }
}
