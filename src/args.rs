use std::path::PathBuf;

use clap::Parser;

use crate::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY_SECS, DEFAULT_FUZZY_THRESHOLD, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RADIUS_METERS, DEFAULT_RESULT_LIMIT, DEFAULT_SERPER_MAPS_URL, DEFAULT_TIMEOUT_SECS,
    DEFAULT_VICINITY_PRECISION,
};
use crate::scoring::ScorerKind;

#[derive(Debug, Clone, Parser)]
#[command(name = "hospital_places_enricher")]
#[command(
    about = "Enrich hospital-location rows with nearby places, with a resumable ledger, global dedupe and a vicinity cache"
)]
pub struct Args {
    /// Directory holding the input, outputs, progress ledger and stores.
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Input CSV path. Defaults to <data_dir>/input.csv.
    #[arg(long)]
    pub input_path: Option<PathBuf>,

    /// Primary output (globally new places). Defaults to <data_dir>/output_1.csv.
    #[arg(long)]
    pub primary_output: Option<PathBuf>,

    /// Secondary output (fuzzy address matches). Defaults to <data_dir>/output_2.csv.
    #[arg(long)]
    pub secondary_output: Option<PathBuf>,

    /// Progress ledger path. Defaults to <data_dir>/progress_log.json.
    #[arg(long)]
    pub progress_path: Option<PathBuf>,

    /// Global place registry SQLite path. Defaults to <data_dir>/serper_seen.sqlite3.
    #[arg(long)]
    pub registry_db: Option<PathBuf>,

    /// Vicinity cache SQLite path. Defaults to <data_dir>/vicinity_cache.sqlite3.
    #[arg(long)]
    pub cache_db: Option<PathBuf>,

    /// Serper API key.
    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Serper Maps endpoint.
    #[arg(long, default_value = DEFAULT_SERPER_MAPS_URL)]
    pub endpoint: String,

    /// Results requested per search (and processed per row).
    #[arg(long, default_value_t = DEFAULT_RESULT_LIMIT)]
    pub result_limit: u32,

    /// Search radius in meters. 0 omits the radius from the request.
    #[arg(long, default_value_t = DEFAULT_RADIUS_METERS)]
    pub radius_meters: u32,

    /// Decimal places kept when bucketing coordinates into cache keys (3 is roughly 100 m).
    #[arg(long, default_value_t = DEFAULT_VICINITY_PRECISION)]
    pub vicinity_precision: u32,

    /// Attempts per live lookup before the row is recorded as failed.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Wait before the first retry, in seconds.
    #[arg(long, default_value_t = DEFAULT_BASE_DELAY_SECS)]
    pub base_delay_secs: f64,

    /// Multiplier applied to the wait after each failed attempt.
    #[arg(long, default_value_t = DEFAULT_BACKOFF_FACTOR)]
    pub backoff_factor: f64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Minimum address similarity (0-100) for the secondary output.
    #[arg(long, default_value_t = DEFAULT_FUZZY_THRESHOLD)]
    pub fuzzy_threshold: f64,

    /// Address similarity algorithm.
    #[arg(long, value_enum, default_value_t = ScorerKind::Indel)]
    pub scorer: ScorerKind,

    /// Drop candidates that are neither inside India's bounding box nor carry an Indian address/PIN.
    #[arg(long, default_value_t = false)]
    pub region_guard: bool,

    /// Only use cached responses; cache misses are recorded as row failures.
    #[arg(long, default_value_t = false)]
    pub skip_api: bool,

    /// Optional cap on live (uncached) lookups in this run. The run stops at the first row past the cap.
    #[arg(long)]
    pub max_new_lookups: Option<usize>,

    /// Delete the progress ledger first and start from the first row.
    #[arg(long, default_value_t = false)]
    pub reset_progress: bool,

    /// Delete the global place registry first, so previously emitted places can reappear.
    #[arg(long, default_value_t = false)]
    pub reset_registry: bool,

    /// Delete the vicinity cache first, forcing fresh API calls.
    #[arg(long, default_value_t = false)]
    pub reset_cache: bool,
}
