//! `tandem` command-line interface.

/// CLI module - command-line interface for tandem
mod cli;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    cli::run_cli();
}
