use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Result, bail};
use tracing::debug;

use crate::args::Args;
use crate::constants::{
    DEFAULT_CACHE_DB_FILE, DEFAULT_INPUT_FILE, DEFAULT_PRIMARY_OUTPUT_FILE, DEFAULT_PROGRESS_FILE,
    DEFAULT_REGISTRY_DB_FILE, DEFAULT_SECONDARY_OUTPUT_FILE, MAX_RETRY_DELAY_SECS,
};
use crate::fetch::RetryPolicy;
use crate::keys::VicinityParams;
use crate::scoring::ScorerKind;

#[derive(Debug, Clone, PartialEq)]
pub struct RunPaths {
    pub input: PathBuf,
    pub primary_output: PathBuf,
    pub secondary_output: PathBuf,
    pub progress: PathBuf,
    pub registry_db: PathBuf,
    pub cache_db: PathBuf,
}

impl RunPaths {
    pub fn under(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            input: data_dir.join(DEFAULT_INPUT_FILE),
            primary_output: data_dir.join(DEFAULT_PRIMARY_OUTPUT_FILE),
            secondary_output: data_dir.join(DEFAULT_SECONDARY_OUTPUT_FILE),
            progress: data_dir.join(DEFAULT_PROGRESS_FILE),
            registry_db: data_dir.join(DEFAULT_REGISTRY_DB_FILE),
            cache_db: data_dir.join(DEFAULT_CACHE_DB_FILE),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub paths: RunPaths,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub vicinity: VicinityParams,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub fuzzy_threshold: f64,
    pub scorer: ScorerKind,
    pub region_guard: bool,
    pub offline: bool,
    pub max_new_lookups: Option<usize>,
    pub reset_progress: bool,
    pub reset_registry: bool,
    pub reset_cache: bool,
}

impl EnricherConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        if !(0.0..=100.0).contains(&args.fuzzy_threshold) {
            bail!(
                "--fuzzy-threshold must be within 0..=100, got {}",
                args.fuzzy_threshold
            );
        }
        if !args.base_delay_secs.is_finite() || args.base_delay_secs < 0.0 {
            bail!("--base-delay-secs must be a non-negative number");
        }
        if args.base_delay_secs > MAX_RETRY_DELAY_SECS {
            bail!("--base-delay-secs must not exceed {MAX_RETRY_DELAY_SECS} seconds");
        }
        if !args.backoff_factor.is_finite() || args.backoff_factor < 1.0 {
            bail!("--backoff-factor must be at least 1.0");
        }
        if args.vicinity_precision > 10 {
            bail!("--vicinity-precision above 10 decimals is not meaningful");
        }
        if args.result_limit == 0 {
            bail!("--result-limit must be positive");
        }

        let retry = RetryPolicy {
            max_attempts: args.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(args.base_delay_secs),
            backoff_factor: args.backoff_factor,
        };
        let longest = retry.longest_delay_secs();
        if longest.is_nan() || longest > MAX_RETRY_DELAY_SECS {
            bail!(
                "retry backoff would wait {longest:.0}s before the last attempt; \
lower --base-delay-secs, --backoff-factor or --max-attempts (limit {MAX_RETRY_DELAY_SECS}s)"
            );
        }

        let defaults = RunPaths::under(&args.data_dir);
        let paths = RunPaths {
            input: args.input_path.clone().unwrap_or(defaults.input),
            primary_output: args
                .primary_output
                .clone()
                .unwrap_or(defaults.primary_output),
            secondary_output: args
                .secondary_output
                .clone()
                .unwrap_or(defaults.secondary_output),
            progress: args.progress_path.clone().unwrap_or(defaults.progress),
            registry_db: args.registry_db.clone().unwrap_or(defaults.registry_db),
            cache_db: args.cache_db.clone().unwrap_or(defaults.cache_db),
        };

        Ok(Self {
            paths,
            api_key: args
                .api_key
                .clone()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            endpoint: args.endpoint.clone(),
            vicinity: VicinityParams {
                precision: args.vicinity_precision,
                radius_meters: args.radius_meters,
                result_limit: args.result_limit,
            },
            retry,
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
            fuzzy_threshold: args.fuzzy_threshold,
            scorer: args.scorer,
            region_guard: args.region_guard,
            offline: args.skip_api,
            max_new_lookups: args.max_new_lookups,
            reset_progress: args.reset_progress,
            reset_registry: args.reset_registry,
            reset_cache: args.reset_cache,
        })
    }
}

/// Loads `.env` from the working directory when present.
pub fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}
