use anyhow::{Context, Result};
use clap::Parser;
use docentity::clients::{DocumentCloudClient, GoogleEntityAnalyzer, WikidataLookup};
use docentity::{Cli, Collaborators, EntityPipeline, RunSummary};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let timeout = cli.request_timeout();

    let documentcloud = DocumentCloudClient::new(
        cli.documentcloud_token.clone(),
        cli.documentcloud_api.clone(),
        timeout,
        cli.max_retries,
    )?;
    let analyzer = GoogleEntityAnalyzer::new(
        cli.google_api_key.clone(),
        cli.google_endpoint.clone(),
        timeout,
        cli.max_retries,
    )?;
    let lookup = WikidataLookup::new(cli.wikidata_endpoint.clone(), timeout, cli.max_retries)?;

    let pipeline = EntityPipeline::new(
        Collaborators {
            text: &documentcloud,
            analyzer: &analyzer,
            lookup: &lookup,
            catalog: &documentcloud,
        },
        cli.pipeline_config(),
    );

    let documents = cli.document_refs();
    info!(
        documents = documents.len(),
        byte_limit = pipeline.config().byte_limit(),
        bulk_limit = pipeline.config().bulk_limit(),
        "starting entity extraction"
    );

    let mut totals = RunSummary::default();
    for document in &documents {
        let outcome = pipeline.process_document(document);
        if let Some(message) = outcome.user_message() {
            println!("{message}");
        }
        totals.record(&outcome);
    }

    let line = serde_json::to_string(&totals).context("failed to serialize run summary")?;
    println!("{line}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
