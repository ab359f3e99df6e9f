//! assetflow CLI - static-site asset builds with a live-reload dev server.

use std::path::PathBuf;

use anyhow::Result;
use assetflow_pipeline::TaskName;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "assetflow")]
#[command(about = "Static-site asset build tool with live-reload dev server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to assetflow.toml config file
    #[arg(short, long, default_value = "assetflow.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble pages from templates and fragments
    Pages,

    /// Convert source fonts to WOFF, TTF and WOFF2
    Fonts,

    /// Compile, prefix and minify the stylesheet
    Styles,

    /// Pack SVG icons into a stack sprite
    Sprite,

    /// Optimize images and convert them to AVIF
    Images,

    /// Concatenate and minify scripts
    Scripts,

    /// Serve the app directory and rebuild on change
    Watching {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Open browser on start
        #[arg(long)]
        open: bool,
    },

    /// Copy build artifacts into the distribution directory
    Building,

    /// Rebuild the distribution directory from scratch
    Build,

    /// Build styles, scripts and pages, then watch
    Default,

    /// Scaffold a project in the current directory
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Preview the built distribution
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "4000")]
        port: u16,

        /// Directory to serve (defaults to config or "dist")
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Show every task and what it runs
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let command = cli.command.unwrap_or(Commands::Default);

    let task = match command {
        Commands::Init { yes } => return commands::init::run(yes).await,
        Commands::List => {
            commands::list::run();
            return Ok(());
        }
        Commands::Serve { port, dir, no_open } => {
            let settings = commands::config::load(&cli.config)?;
            let dir = dir.unwrap_or(settings.pipeline.dist_dir);
            return commands::serve::run(port, dir, !no_open).await;
        }
        Commands::Watching { port, open } => {
            let mut settings = commands::config::load(&cli.config)?;
            if let Some(port) = port {
                settings.server.port = port;
            }
            settings.server.open |= open;
            return commands::task::run(TaskName::Watching, settings).await;
        }
        Commands::Pages => TaskName::Pages,
        Commands::Fonts => TaskName::Fonts,
        Commands::Styles => TaskName::Styles,
        Commands::Sprite => TaskName::Sprite,
        Commands::Images => TaskName::Images,
        Commands::Scripts => TaskName::Scripts,
        Commands::Building => TaskName::Building,
        Commands::Build => TaskName::Build,
        Commands::Default => TaskName::Default,
    };

    let settings = commands::config::load(&cli.config)?;
    commands::task::run(task, settings).await
}
