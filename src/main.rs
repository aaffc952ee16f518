use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use hospital_places_enricher::{
    Pipeline, SerperClient, StopReason,
    args::Args,
    common::install_ctrlc_handler,
    config::{EnricherConfig, load_dotenv},
    constants::SERPER_API_DOC_URL,
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    load_dotenv();
    let args = Args::parse();
    let config = EnricherConfig::from_args(&args).context("Invalid configuration")?;

    let api_key = match (&config.api_key, config.offline) {
        (Some(key), _) => key.clone(),
        (None, true) => String::new(),
        (None, false) => bail!(
            "No Serper API key. Pass --api-key or set SERPER_API_KEY (see {SERPER_API_DOC_URL}), \
or run with --skip-api to use cached responses only."
        ),
    };
    let client = SerperClient::new(&config.endpoint, &api_key, config.timeout)
        .context("Failed building HTTP client")?;

    info!(
        input = %config.paths.input.display(),
        primary_output = %config.paths.primary_output.display(),
        secondary_output = %config.paths.secondary_output.display(),
        "using files"
    );

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&shutdown_requested));

    let mut pipeline = Pipeline::prepare(&config, client).context("Failed preparing run")?;
    let summary = pipeline
        .run(&shutdown_requested)
        .await
        .context("Enrichment run failed")?;

    println!(
        "Processed {} rows ({} failed) starting at row {} of {}: {} new places, {} fuzzy matches, {} cache hits, {} live lookups ({} API requests).",
        summary.rows_processed,
        summary.rows_failed,
        summary.start_row,
        summary.total_rows,
        summary.primary_rows,
        summary.secondary_rows,
        summary.cache_hits,
        summary.live_lookups,
        summary.api_requests,
    );
    println!(
        "Skipped {} candidates already in {}, {} repeated within a row, {} outside the region; {} lookups failed.",
        summary.already_emitted,
        config.paths.registry_db.display(),
        summary.duplicate_candidates,
        summary.out_of_region,
        summary.failed_lookups,
    );
    match summary.stop_reason {
        StopReason::Completed => {}
        StopReason::Interrupted => println!(
            "Stopped after Ctrl-C. Progress is saved; rerun to resume."
        ),
        StopReason::BudgetExhausted => println!(
            "Stopped at the live lookup budget. Rerun to continue with the next row."
        ),
    }
    if shutdown_requested.load(Ordering::SeqCst) {
        std::process::exit(130);
    }
    Ok(())
}
