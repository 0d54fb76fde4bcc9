mod cli;
mod cmd;
mod config_gen;
mod format;
mod signal;
mod table;

use clap::Parser;

use stowage_core::app::RuntimeConfig;
use stowage_core::config;

use cli::{Cli, Commands};
use config_gen::run_config_generate;

fn main() {
    let cli = Cli::parse();

    // The daemon is a long-running service; default it to info.
    let filter = match cli.verbose {
        0 if matches!(cli.command, Commands::Daemon) => "info",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // `config` writes a template and needs no existing file.
    if let Commands::Config { dest } = &cli.command {
        if let Err(e) = run_config_generate(dest.as_deref()) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let Some(source) = config::resolve_config_path(cli.config.as_deref()) else {
        eprintln!("Error: no configuration file found.");
        eprintln!("Searched:");
        for (path, level) in config::default_config_search_paths() {
            eprintln!("  {} ({})", path.display(), level);
        }
        eprintln!();
        eprintln!("Run `stowage config` to generate a starter config file.");
        std::process::exit(1);
    };

    tracing::info!("Using config: {source}");

    let resolved = match config::load_and_resolve(source.path()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let runtime = RuntimeConfig { source, resolved };

    let result = match &cli.command {
        Commands::Daemon => cmd::daemon::run_daemon(&runtime),
        Commands::Run => cmd::run::run_once(&runtime),
        Commands::List => cmd::list::run_list(&runtime),
        Commands::Config { .. } => Ok(true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::debug!(command = cli.command.name(), "command failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
