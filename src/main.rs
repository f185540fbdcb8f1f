use anyhow::{Context, Result};
use clap::Parser;
use docflow::{
    api,
    config::{self, Config},
    embedding::build_embedding_client,
    logging,
    metrics::PipelineMetrics,
    pipeline::{DocumentIngestionPipeline, PipelineComponents, PipelineOptions},
    processing::{DocumentProcessor, TextParser},
    qdrant::QdrantVectorIndex,
    sources::{build_source_handler, source_specs},
    storage::LocalObjectStore,
    tracking::JsonlExperimentTracker,
};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "docflow",
    about = "Ingest documents from a watched folder and an optional API into Qdrant"
)]
struct Cli {
    /// Directory to watch (overrides INGEST_WATCH_DIRECTORY).
    #[arg(long)]
    watch_dir: Option<PathBuf>,
    /// Endpoint to poll for new documents (overrides INGEST_API_ENDPOINT).
    #[arg(long)]
    api_endpoint: Option<String>,
    /// Port for the health and metrics server (overrides METRICS_PORT).
    #[arg(long)]
    metrics_port: Option<u16>,
    /// File receiving a copy of the logs (overrides LOG_FILE).
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let config = match configure(Cli::parse()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("docflow: {err:#}");
            std::process::exit(1);
        }
    };
    let log_guard = match logging::init_tracing(&config.log_file) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("docflow: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(config).await {
        tracing::error!(error = %format!("{err:#}"), "docflow exited with an error");
        // `exit` skips destructors; flush the file writer first.
        drop(log_guard);
        std::process::exit(1);
    }
}

fn configure(cli: Cli) -> Result<Config> {
    let mut config = config::load_config().context("failed to load configuration")?;
    if let Some(watch_dir) = cli.watch_dir {
        config.watch_directory = watch_dir;
    }
    if let Some(endpoint) = cli.api_endpoint {
        config.api_endpoint = Some(endpoint);
    }
    if let Some(port) = cli.metrics_port {
        config.metrics_port = Some(port);
    }
    if let Some(log_file) = cli.log_file {
        config.log_file = log_file;
    }
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        watch_directory = %config.watch_directory.display(),
        formats = ?config.supported_formats,
        api_endpoint = config.api_endpoint.as_deref().unwrap_or("-"),
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        "Starting docflow"
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let embedding_client =
        build_embedding_client(&config).context("failed to build embedding client")?;
    let processor = DocumentProcessor::new(
        embedding_client,
        config.chunk_size,
        config.chunk_overlap,
        config.embedding_model.clone(),
    )?;
    let vector_index = QdrantVectorIndex::new(
        &config.qdrant_url,
        config.qdrant_collection_name.clone(),
        config.qdrant_api_key.clone(),
        config.embedding_dimension,
    )?;
    vector_index
        .ensure_collection()
        .await
        .context("failed to prepare Qdrant collection")?;
    let tracker = JsonlExperimentTracker::new(&config.tracking_dir, config.experiment_name.clone())?;

    let components = PipelineComponents {
        parser: Arc::new(TextParser),
        processor: Arc::new(processor),
        vector_index: Arc::new(vector_index),
        object_store: Arc::new(LocalObjectStore::new(
            &config.object_store_root,
            &config.object_store_bucket,
        )),
        tracker: Arc::new(tracker),
        metrics: Arc::clone(&metrics),
    };
    let pipeline = DocumentIngestionPipeline::new(
        components,
        PipelineOptions {
            shutdown_timeout: config.shutdown_timeout,
            ..PipelineOptions::default()
        },
    );
    for (name, spec) in source_specs(&config) {
        let handler = build_source_handler(&spec)
            .with_context(|| format!("failed to build source handler '{name}'"))?;
        pipeline.add_source_handler(name, handler)?;
    }

    if let Some(port) = config.metrics_port {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .with_context(|| format!("failed to bind metrics port {port}"))?;
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(err) = api::serve(listener, metrics).await {
                tracing::error!(error = %err, "Metrics server stopped");
            }
        });
    }

    pipeline.run().await?;
    Ok(())
}
