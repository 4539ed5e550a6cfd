//! Main entry point for the StoryKeep CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use shared::config::Config;
use std::path::PathBuf;
use tracing::debug;

use commands::{
    config::ConfigFormat,
    session::{ProfileArgs, RegisterArgs},
};

mod commands;
mod tracer;

/// StoryKeep CLI
#[derive(Parser)]
#[command(name = "storykeep")]
#[command(about = "Command-line client for the StoryKeep memory tracker", long_about = None)]
struct Cli {
    /// Path to the configuration file (YAML, JSON or TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the StoryKeep CLI
#[derive(Subcommand)]
enum Commands {
    /// Sign in and store the issued tokens
    Login,
    /// Create an account and sign in
    Register(RegisterArgs),
    /// Sign out and remove stored credentials
    Logout,
    /// Show the signed-in user's profile
    Me,
    /// Report whether the stored session is still valid
    Status,
    /// Update profile settings
    Profile(ProfileArgs),
    /// Supervise the session and sign out after inactivity
    Watch,

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell to generate the completion script for
        #[arg(long, short, value_enum)]
        shell: Shell,
    },

    /// Generate a configuration file holding the defaults
    Config {
        #[arg(long, short, value_enum, default_value_t = ConfigFormat::Yaml)]
        format: ConfigFormat,

        /// Where to write the file. Defaults to `storykeep.<format>` in the current directory.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
            return Ok(());
        }
        Commands::Config { format, output } => {
            return commands::config::generate_config(format, output.as_deref());
        }
        command => command,
    };

    let config = Config::load_config(cli.config).context("failed to load configuration")?;
    tracer::init(&config.logging)?;
    debug!(base_url = %config.api.base_url, "configuration loaded");

    match command {
        Commands::Login => commands::session::login(&config).await,
        Commands::Register(args) => commands::session::register(&config, args).await,
        Commands::Logout => commands::session::logout(&config).await,
        Commands::Me => commands::session::me(&config).await,
        Commands::Status => commands::session::status(&config).await,
        Commands::Profile(args) => commands::session::profile(&config, args).await,
        Commands::Watch => commands::watch::watch(&config).await,
        Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
    }
}
