mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "claim-form")]
#[command(version, about = "Edit, validate and submit an insurance claim", long_about = None)]
struct Cli {
    /// Config file (defaults apply if it does not exist)
    #[arg(short, long, default_value = "rusty-forms.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List category options from the lookup service
    Categories,

    /// Apply edits and print the resulting errors
    Validate {
        #[command(flatten)]
        edits: Edits,
    },

    /// Apply edits and submit the claim
    Submit {
        #[command(flatten)]
        edits: Edits,
    },
}

/// Changes applied to the initial claim, in this order: sets, part toggles,
/// added witnesses, removed witnesses
#[derive(Args, Debug, Default)]
pub struct Edits {
    /// Write a field, e.g. `amount=120` or `witnesses[1].email=a@b.cz`. Values parse as JSON, else text.
    #[arg(long = "set", value_name = "PATH=VALUE")]
    pub sets: Vec<String>,

    /// Toggle a damaged part (roof, front, side, rear)
    #[arg(long = "toggle-part", value_name = "PART")]
    pub toggle_parts: Vec<String>,

    /// Append a witness as `name,email`
    #[arg(long = "add-witness", value_name = "NAME,EMAIL")]
    pub add_witnesses: Vec<String>,

    /// Remove the witness at this position
    #[arg(long = "remove-witness", value_name = "INDEX")]
    pub remove_witnesses: Vec<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Categories => commands::categories::execute(&cli.config).await,
        Commands::Validate { edits } => commands::submit::validate(&cli.config, &edits).await,
        Commands::Submit { edits } => commands::submit::execute(&cli.config, &edits).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

/// Logs go to stderr so the submitted record on stdout stays clean
fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}
