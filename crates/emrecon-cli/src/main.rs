mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emrecon", about = "Maximum-a-posteriori cryo-EM single-particle refinement")]
#[command(version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the EM refinement loop against a particle database.
    Refine(commands::refine::RefineArgs),
    /// Inspect an MRC volume or particle image's header.
    Info(commands::info::InfoArgs),
    /// Print a default refinement configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Refine(args) => commands::refine::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Config => commands::config::run(),
    }
}
