use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mimalloc::MiMalloc;
use scaphub::config::AppConfig;
use scaphub::errors::ScanError;
use scaphub::models::event::ObjectCreatedEvent;
use scaphub::services::findings::HttpFindingsSubmitter;
use scaphub::services::ignore_list::PgIgnoreList;
use scaphub::services::metrics::EmfMetricsEmitter;
use scaphub::services::object_store::FsObjectStore;
use scaphub::services::parameters::RedisParameterStore;
use scaphub::services::pipeline::{ScanPipeline, ScanSummary};
use scaphub::services::results_table::PgResultsTable;
use scaphub::ScanHandles;
use tokio::io::AsyncReadExt;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // stdout carries the metric lines; logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "scaphub=info".into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(summary) => {
            tracing::info!(
                summary = %serde_json::to_string(&summary).unwrap_or_default(),
                "Scan complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => match e.downcast_ref::<ScanError>() {
            Some(scan_error) => {
                tracing::error!(code = scan_error.code(), error = %scan_error, "Scan failed");
                ExitCode::from(scan_error.exit_code())
            }
            None => {
                tracing::error!(error = %format!("{e:#}"), "Startup failed");
                ExitCode::FAILURE
            }
        },
    }
}

async fn run() -> anyhow::Result<ScanSummary> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let event = ObjectCreatedEvent::from_json(&read_event().await?)?;

    let handles = build_handles(&config).await?;
    let pipeline = ScanPipeline::new(handles, Duration::from_secs(config.invocation_timeout_secs));

    let invocation_id = Uuid::new_v4();
    let summary = pipeline
        .process(&event, &config.invoked_function_arn)
        .instrument(tracing::info_span!("invocation", %invocation_id))
        .await?;
    Ok(summary)
}

/// Trigger event from the file named by the first argument, else stdin.
async fn read_event() -> Result<Vec<u8>, ScanError> {
    match std::env::args().nth(1) {
        Some(path) => tokio::fs::read(&path)
            .await
            .map_err(|e| ScanError::InvalidTrigger(format!("Failed to read {path}: {e}"))),
        None => {
            let mut data = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut data)
                .await
                .map_err(|e| ScanError::InvalidTrigger(format!("Failed to read stdin: {e}")))?;
            Ok(data)
        }
    }
}

async fn build_handles(config: &AppConfig) -> anyhow::Result<ScanHandles> {
    let pool = scaphub::db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .map_err(|e| ScanError::IgnoreListUnavailable(format!("Database unreachable: {e}")))?;
    let parameters = RedisParameterStore::connect(&config.redis_url)
        .await
        .map_err(|e| ScanError::ConfigUnavailable(format!("Redis unreachable: {e}")))?;
    let findings = HttpFindingsSubmitter::new(config.findings_endpoint.clone())
        .context("Failed to build findings client")?;
    tracing::info!(
        object_store_root = %config.object_store_root,
        findings_endpoint = %config.findings_endpoint,
        "Collaborators ready"
    );

    Ok(ScanHandles {
        objects: Arc::new(FsObjectStore::new(&config.object_store_root)),
        parameters: Arc::new(parameters),
        ignore_list: Arc::new(PgIgnoreList::new(pool.clone())),
        results: Arc::new(PgResultsTable::new(pool)),
        metrics: Arc::new(EmfMetricsEmitter::stdout()),
        findings: Arc::new(findings),
    })
}
