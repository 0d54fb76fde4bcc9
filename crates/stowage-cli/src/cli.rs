use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stowage",
    version,
    about = "Daily archive-and-upload backups to S3-compatible storage",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $STOWAGE_CONFIG             (environment variable)
  3. ./stowage.yaml              (project)
  4. Platform user config dir + /stowage/config.yaml (e.g. ~/.config or %APPDATA%)
  5. Platform system config path (Unix: /etc/stowage/config.yaml, Windows: %PROGRAMDATA%/stowage/config.yaml)

Environment variables:
  STOWAGE_CONFIG                              Path to configuration file
  AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY    Storage credentials when not set in the file
  EMAIL_ADDRESS, EMAIL_PASSWORD               SMTP credentials when not set in the file"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides STOWAGE_CONFIG and default search)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler: back up once a day at schedule.at until interrupted
    Daemon,

    /// Archive, purge, upload, validate and notify once, right now
    Run,

    /// Show remote backups and which ones the retention window would purge
    List,

    /// Generate a starter configuration file
    Config {
        /// Destination path (skips interactive prompt)
        dest: Option<String>,
    },
}

impl Commands {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Daemon => "daemon",
            Self::Run => "run",
            Self::List => "list",
            Self::Config { .. } => "config",
        }
    }
}
