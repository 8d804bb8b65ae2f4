//! `parse`: XML filings → documents → embedding batch files.

use std::path::Path;

use ai_llm_service::{OpenAiService, config_openai_embedding};
use colored::Colorize;
use rag_store::{
    EmbedStageOptions, LoaderConfig, OpenAiEmbedder, RagConfig, compute_search_embeddings,
};
use tracing::info;

pub async fn run(xml_dir: &Path, year: u32, segment: &str, limit: Option<usize>) -> anyhow::Result<()> {
    let parsed = filings::parse_dir(xml_dir)?;

    println!("{}", format!("Return types in {year}/{segment}:").bold());
    for (return_type, count) in parsed.tally.iter() {
        println!("  {:<8} {}", return_type, count.to_string().cyan());
    }
    println!(
        "  {} documents kept, {} skipped, {} malformed",
        parsed.documents.len().to_string().green(),
        parsed.skipped,
        parsed.malformed
    );

    if parsed.documents.is_empty() {
        println!("{}", "Nothing to embed.".yellow());
        return Ok(());
    }

    let rag = RagConfig::from_env()?;
    let loader = LoaderConfig::from_env()?;
    let embedder = OpenAiEmbedder::new(
        OpenAiService::new(config_openai_embedding()?)?,
        rag.embedding_dim,
    );

    let opts = EmbedStageOptions {
        retry: loader.retry,
        limit,
        ..Default::default()
    };
    let out_dir = loader.embeddings_dir();
    info!(out_dir = %out_dir.display(), "writing batch files");

    let report =
        compute_search_embeddings(&parsed.documents, &embedder, &out_dir, year, segment, &opts)
            .await?;

    println!(
        "{} {} documents into {} files ({} tokens)",
        "Embedded".green().bold(),
        report.documents,
        report.files.len(),
        report.total_tokens
    );
    Ok(())
}
