//! Projector CLI — open virtual displays and drive the platform services.
//!
//! Usage:
//!   projector check              Check remote service availability
//!   projector open [OPTIONS]     Open a virtual display and hold it
//!   projector tasks [OPTIONS]    List running tasks
//!   projector grant-ops          Allow the agent's own app-ops
//!   projector config [--init]    Show or write the configuration file
//!
//! Every command runs against the in-process loopback platform.

use clap::{Parser, Subcommand};
use projector_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "projector",
    about = "Capability-gated virtual displays over hidden platform services",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check remote service availability
    Check,

    /// Open a virtual display and hold it until interrupted
    Open {
        /// Display name (defaults to the configured name)
        #[arg(short, long)]
        name: Option<String>,

        /// Width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Density in dpi
        #[arg(long)]
        density: Option<u32>,

        /// Comma separated display flags, e.g. "public,own_content_only"
        #[arg(long)]
        flags: Option<String>,

        /// Release after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        hold_secs: Option<u64>,

        /// Simulate the user revoking capture after this many seconds
        #[arg(long)]
        revoke_after: Option<u64>,

        /// Simulate the user declining the capture prompt
        #[arg(long)]
        deny: bool,
    },

    /// List running tasks, most recent first
    Tasks {
        /// Maximum number of tasks
        #[arg(long, default_value = "10")]
        max: usize,

        /// Only tasks on this display
        #[arg(long)]
        display: Option<i32>,
    },

    /// Allow every app-op the agent needs for itself
    GrantOps,

    /// Show the configuration
    Config {
        /// Write the current configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    projector_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Check => commands::check::run(&config),
        Commands::Open {
            name,
            width,
            height,
            density,
            flags,
            hold_secs,
            revoke_after,
            deny,
        } => {
            commands::open::run(
                &config,
                commands::open::OpenArgs {
                    name,
                    width,
                    height,
                    density,
                    flags,
                    hold_secs,
                    revoke_after,
                    deny,
                },
            )
            .await
        }
        Commands::Tasks { max, display } => commands::tasks::run(&config, max, display),
        Commands::GrantOps => commands::grant_ops::run(&config),
        Commands::Config { init } => commands::config::run(&config, init),
    }
}
