//! placedrill CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "placedrill", version, about = "Adaptive language placement with spaced rechecks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console session against the persistent store
    Run {
        /// Learner identifier for this session
        #[arg(long, default_value = "local")]
        learner: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Autoplay a scripted learner against an in-memory store
    Simulate {
        /// Content directory (placement.json, exercises.json, rules.json)
        #[arg(long, default_value = "./content")]
        content: PathBuf,

        /// Probability of a deliberately wrong answer
        #[arg(long, default_value = "0.2")]
        error_rate: f64,

        /// RNG seed; fixed seeds reproduce the same run
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Maximum learner turns before giving up
        #[arg(long, default_value = "200")]
        max_turns: usize,

        /// UI language the simulated learner picks
        #[arg(long, default_value = "en")]
        lang: String,
    },

    /// Validate a content directory
    Validate {
        /// Content directory to check
        #[arg(long, default_value = "./content")]
        content: PathBuf,
    },

    /// Create starter config and a sample content directory
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("placedrill=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { learner, config } => commands::run::execute(learner, config).await,
        Commands::Simulate {
            content,
            error_rate,
            seed,
            max_turns,
            lang,
        } => commands::simulate::execute(content, error_rate, seed, max_turns, lang).await,
        Commands::Validate { content } => commands::validate::execute(content),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
