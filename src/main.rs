//! Mini-VMHost CLI Application
//!
//! A command-line interface for running async call scenarios against the
//! in-memory host.

use clap::{Parser, Subcommand};
use mini_vmhost::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vmhost")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A metered VM host with asynchronous cross-contract calls", long_about = None)]
struct Cli {
    /// Host configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file
    Run {
        /// Scenario file path
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Assemble a contract
    Compile {
        /// Assembly source file
        #[arg(short, long)]
        file: PathBuf,

        /// Write the compiled module as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Disassemble bytecode
    Disasm {
        /// Hex-encoded bytecode
        #[arg(long)]
        hex: String,
    },

    /// Show a persisted async context
    Inspect {
        /// Context file (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { file } => cli::cmd_run(config, &file),
        Commands::Compile { file, output } => cli::cmd_compile(&file, output.as_deref()),
        Commands::Disasm { hex } => cli::cmd_disasm(&hex),
        Commands::Inspect { file } => cli::cmd_inspect(&config, &file),
    }
}
