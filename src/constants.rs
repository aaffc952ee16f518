pub const DEFAULT_SERPER_MAPS_URL: &str = "https://google.serper.dev/maps";
pub const SERPER_API_DOC_URL: &str = "https://serper.dev/playground";

pub const DEFAULT_INPUT_FILE: &str = "input.csv";
pub const DEFAULT_PRIMARY_OUTPUT_FILE: &str = "output_1.csv";
pub const DEFAULT_SECONDARY_OUTPUT_FILE: &str = "output_2.csv";
pub const DEFAULT_PROGRESS_FILE: &str = "progress_log.json";
pub const DEFAULT_REGISTRY_DB_FILE: &str = "serper_seen.sqlite3";
pub const DEFAULT_CACHE_DB_FILE: &str = "vicinity_cache.sqlite3";

pub const DEFAULT_RESULT_LIMIT: u32 = 20;
pub const DEFAULT_RADIUS_METERS: u32 = 200;
pub const DEFAULT_VICINITY_PRECISION: u32 = 3;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY_SECS: f64 = 0.8;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.6;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 75.0;
pub const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

pub const COL_ASSOCIATE_HOSPITAL: &str = "Associate Hospital";
pub const COL_LATITUDE: &str = "OLat";
pub const COL_LONGITUDE: &str = "OLong";
pub const COL_PIN: &str = "pin";
pub const COL_TAGGED_ADDRESS: &str = "Tagged Address";

pub const REQUIRED_INPUT_COLUMNS: [&str; 5] = [
    COL_ASSOCIATE_HOSPITAL,
    COL_LATITUDE,
    COL_LONGITUDE,
    COL_PIN,
    COL_TAGGED_ADDRESS,
];

pub const PRIMARY_OUTPUT_COLUMNS: [&str; 9] = [
    "Name",
    "Address",
    "Lat",
    "Long",
    "Website",
    "Pincode",
    "Category",
    "CID",
    "InputRowIndex",
];

pub const FUZZY_SCORE_COLUMN: &str = "FuzzyScore";

pub const INDIA_LAT_RANGE: (f64, f64) = (6.0, 37.5);
pub const INDIA_LON_RANGE: (f64, f64) = (68.0, 97.5);
