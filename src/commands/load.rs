//! `load`: publish the batch files under the stable alias.

use colored::Colorize;
use rag_store::{LoadMode, LoaderConfig, RagConfig, RagStore};

pub async fn run(full: bool, collection: Option<String>) -> anyhow::Result<()> {
    let rag = RagStore::new(RagConfig::from_env()?)?;
    let loader = LoaderConfig::from_env()?;
    let mode = if full { LoadMode::Full } else { LoadMode::quick() };

    let report = rag
        .load_batch_files(&loader, collection.as_deref(), mode)
        .await?;

    let alias = collection.as_deref().unwrap_or(&rag.config().collection);
    println!(
        "{} {} records in {} batches; {} now points at {}",
        "Loaded".green().bold(),
        report.records,
        report.batches,
        alias.cyan(),
        report.staging
    );
    if !report.removed.is_empty() {
        println!("Removed old collections: {}", report.removed.join(", "));
    }
    Ok(())
}
