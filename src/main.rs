mod bootstrap;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use repoqa_core::QaError;
use repoqa_core::config::Config;
use repoqa_core::qa::QaPipeline;
use repoqa_core::synthesizer::{Answer, Synthesizer, Verification};
use repoqa_core::verify::verify_schema;
use repoqa_index::indexer::{CodeIndexer, IndexReport};
use repoqa_index::retriever::CodeRetriever;
use tokio_util::sync::CancellationToken;

/// Exit status used when Ctrl-C stopped the command.
const EXIT_INTERRUPTED: u8 = 130;
const EXIT_NO_CONTENT: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "repoqa", version, about = "Index a repository and ask questions about its code")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, env = "REPOQA_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan, chunk and embed a repository into the vector store.
    Ingest {
        /// Repository root. Defaults to `index.codebase_path`.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Re-embed every chunk even if its fingerprint is unchanged.
        #[arg(long)]
        force: bool,
    },
    /// Answer a question from the indexed code, with citations.
    Ask {
        question: String,
        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
        /// Fail instead of printing an answer whose citations could not be verified.
        #[arg(long)]
        require_verified: bool,
    },
    /// Check that stored documents carry every schema field.
    Verify {
        /// Number of stored documents to inspect.
        #[arg(long, default_value_t = 10)]
        sample: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_subscriber();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    config.validate()?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Command::Ingest { root, force } => ingest(&config, root, force, &cancel).await,
        Command::Ask {
            question,
            json,
            require_verified,
        } => ask(&config, &question, json, require_verified, &cancel).await,
        Command::Verify { sample } => verify(&config, sample).await,
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping");
            cancel.cancel();
        }
    });
}

async fn ingest(
    config: &Config,
    root: Option<PathBuf>,
    force: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    bootstrap::ensure_persistent_records(config)?;
    let root = root.unwrap_or_else(|| PathBuf::from(&config.index.codebase_path));
    let provider = bootstrap::create_provider(config)?;
    bootstrap::health_check(&provider).await;
    let vectors = bootstrap::create_vector_store(config)?;
    let records = bootstrap::create_record_store(config).await?;

    let indexer = CodeIndexer::new(vectors, records, Arc::new(provider), config.indexer_config(force));
    let report = indexer
        .index(&root, cancel)
        .await
        .with_context(|| format!("failed to index {}", root.display()))?;

    print!("{}", format_report(&report));
    if report.cancelled {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn ask(
    config: &Config,
    question: &str,
    json: bool,
    require_verified: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    let provider = Arc::new(bootstrap::create_provider(config)?);
    let vectors = bootstrap::create_vector_store(config)?;

    let retriever = CodeRetriever::new(vectors, Arc::clone(&provider), config.retrieval_config());
    let synthesizer = Synthesizer::new(provider, config.synthesizer_config());
    let pipeline = QaPipeline::new(
        config.intent_classifier()?,
        config.retrieval.profiles.clone(),
        retriever,
        synthesizer,
    )
    .with_require_verified(require_verified || config.synthesis.require_verified);

    match pipeline.ask(question, cancel).await {
        Ok(answer) => {
            print_answer(&answer, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(QaError::NoRelevantContent) => {
            eprintln!("No relevant content found in the index.");
            Ok(ExitCode::from(EXIT_NO_CONTENT))
        }
        Err(QaError::Unverified(answer)) => {
            print_answer(&answer, json)?;
            eprintln!("The answer could not be verified against its citations.");
            Ok(ExitCode::FAILURE)
        }
        Err(QaError::Cancelled) => Ok(ExitCode::from(EXIT_INTERRUPTED)),
        Err(e) => Err(e).context("failed to answer question"),
    }
}

async fn verify(config: &Config, sample: u32) -> anyhow::Result<ExitCode> {
    let vectors = bootstrap::create_vector_store(config)?;
    let records = if bootstrap::records_are_persistent(config) {
        Some(bootstrap::create_record_store(config).await?)
    } else {
        None
    };

    let report = verify_schema(
        vectors.as_ref(),
        records.as_deref(),
        &config.store.collection,
        sample,
    )
    .await
    .context("schema verification failed")?;

    print!("{report}");
    if report.sampled == 0 {
        println!("no documents sampled");
    }
    Ok(if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_answer(answer: &Answer, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
    } else {
        print!("{}", format_answer(answer));
    }
    Ok(())
}

fn format_answer(answer: &Answer) -> String {
    let mut out = format!("{}\n", answer.text);
    if let Verification::Unverified {
        rejected,
        missing_citations,
    } = &answer.verification
    {
        out.push_str("\n[unverified]");
        if !rejected.is_empty() {
            out.push_str(&format!(" removed citations: {}", rejected.join(", ")));
        }
        if *missing_citations {
            out.push_str(" no supporting citations");
        }
        out.push('\n');
    }
    out.push_str("\nSources:\n");
    for source in &answer.sources {
        out.push_str(&format!(
            "  {}:{}-{} -> {}\n",
            source.filename, source.line_start, source.line_end, source.path
        ));
    }
    out
}

fn format_report(report: &IndexReport) -> String {
    let mut out = format!(
        "run {}: {} files scanned, {} indexed, {} unchanged, {} skipped, {} failed, {} removed\n\
         chunks: {} created, {} updated, {} unchanged, {} deleted, {} failed\n",
        report.run_id,
        report.files_scanned,
        report.files_indexed,
        report.files_unchanged,
        report.files_skipped,
        report.files_failed,
        report.files_removed,
        report.chunks_created,
        report.chunks_updated,
        report.chunks_unchanged,
        report.chunks_deleted,
        report.chunks_failed,
    );
    for skipped in &report.skipped {
        out.push_str(&format!("skipped: {skipped}\n"));
    }
    for failure in &report.failures {
        out.push_str(&format!("failed: {failure}\n"));
    }
    if report.cancelled {
        out.push_str("interrupted before all files were processed\n");
    }
    out.push_str(&format!("finished in {} ms\n", report.duration_ms));
    out
}
