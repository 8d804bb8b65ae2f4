//! `filing-qa`: parse IRS 990 filings, load their embeddings into Qdrant,
//! and answer questions about them.
//!
//! Commands:
//! - `parse`: parse extracted XML filings, embed them, write batch files
//! - `load`: blue/green load of the batch files into the vector index
//! - `ask`: answer one question, or run an interactive loop

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{Layer, filter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "filing-qa",
    about = "Question answering over IRS Form 990 filings",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse extracted filings, embed them and write batch files
    Parse {
        /// Directory holding the extracted `*.xml` filings of one segment
        #[arg(long)]
        xml_dir: PathBuf,

        /// Filing year of the segment
        #[arg(long)]
        year: u32,

        /// Segment label, e.g. `01A`
        #[arg(long)]
        segment: String,

        /// Only embed the first N parsed filings
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Load batch files into a fresh collection and swap the alias over
    Load {
        /// Load every record of every batch file instead of a sample
        #[arg(long)]
        full: bool,

        /// Stable alias to publish under (defaults to QDRANT_COLLECTION)
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Answer a question; without one, ask interactively until an empty line
    Ask {
        question: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Parse {
            xml_dir,
            year,
            segment,
            limit,
        } => commands::parse::run(&xml_dir, year, &segment, limit).await?,
        Commands::Load { full, collection } => commands::load::run(full, collection).await?,
        Commands::Ask { question } => commands::ask::run(question).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let (default, level) = if verbose {
        ("debug", Level::DEBUG)
    } else {
        ("info", Level::INFO)
    };
    let env_filter = ai_llm_service::telemetry::env_filter_with_level(default, level);

    let not_provider = filter::filter_fn(|meta| {
        !meta
            .target()
            .starts_with(ai_llm_service::telemetry::TARGET_PREFIX)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact()
                .with_filter(not_provider),
        )
        .with(ai_llm_service::telemetry::layer())
        .init();
}
