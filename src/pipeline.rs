use std::{
    io::IsTerminal,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{info, warn};

use crate::cache::VicinityCache;
use crate::common::delete_if_exists;
use crate::config::EnricherConfig;
use crate::constants::{FUZZY_SCORE_COLUMN, PRIMARY_OUTPUT_COLUMNS, REQUIRED_INPUT_COLUMNS};
use crate::errors::{EnrichError, EnrichResult, FetchError, RowError};
use crate::fetch::{FetchOrchestrator, ResponseSource};
use crate::places::PlacesClient;
use crate::processor::{ProcessorSettings, RowBatch, RowProcessor};
use crate::progress::{ProgressLedger, RUN_LEVEL_ROW};
use crate::registry::PlaceRegistry;
use crate::scoring::build_scorer;
use crate::tabular::{CsvSink, InputTable, read_rows};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Interrupted,
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total_rows: usize,
    pub start_row: usize,
    pub rows_processed: usize,
    pub rows_failed: usize,
    pub primary_rows: usize,
    pub secondary_rows: usize,
    pub cache_hits: usize,
    pub live_lookups: usize,
    pub api_requests: usize,
    pub failed_lookups: usize,
    pub duplicate_candidates: usize,
    pub already_emitted: usize,
    pub out_of_region: usize,
    pub stop_reason: StopReason,
}

/// Everything a run holds open: input rows, durable stores, output sinks
/// and the progress ledger.
pub struct Pipeline<C> {
    table: InputTable,
    ledger: ProgressLedger,
    processor: RowProcessor<C>,
    primary: CsvSink,
    secondary: CsvSink,
}

impl<C: PlacesClient> Pipeline<C> {
    /// Applies resets, loads the ledger, validates the input and opens the
    /// stores and outputs. Input failures are recorded in the ledger before
    /// the error is returned.
    pub fn prepare(config: &EnricherConfig, client: C) -> Result<Self> {
        let paths = &config.paths;
        for (enabled, path, label) in [
            (config.reset_progress, &paths.progress, "progress ledger"),
            (config.reset_registry, &paths.registry_db, "place registry"),
            (config.reset_cache, &paths.cache_db, "vicinity cache"),
        ] {
            if enabled
                && delete_if_exists(path)
                    .with_context(|| format!("Failed deleting {}", path.display()))?
            {
                info!(path = %path.display(), "reset {label}");
            }
        }

        let mut ledger = ProgressLedger::load(&paths.progress)
            .with_context(|| format!("Failed loading progress from {}", paths.progress.display()))?;

        let table = match load_input(config) {
            Ok(table) => table,
            Err(err) => {
                warn!(%err, "cannot start run");
                ledger
                    .record_error(RUN_LEVEL_ROW, &err.to_string())
                    .context("Failed recording input failure in the progress ledger")?;
                return Err(err).context("Input validation failed");
            }
        };

        let registry = PlaceRegistry::open(&paths.registry_db).with_context(|| {
            format!("Failed opening place registry {}", paths.registry_db.display())
        })?;
        let cache = VicinityCache::open(&paths.cache_db).with_context(|| {
            format!("Failed opening vicinity cache {}", paths.cache_db.display())
        })?;

        let primary_columns: Vec<String> =
            PRIMARY_OUTPUT_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut secondary_columns = table.headers.clone();
        secondary_columns.extend(primary_columns.iter().cloned());
        secondary_columns.push(FUZZY_SCORE_COLUMN.to_string());

        let primary = CsvSink::ensure_with_header(&paths.primary_output, &primary_columns)
            .with_context(|| format!("Failed preparing {}", paths.primary_output.display()))?;
        let secondary = CsvSink::ensure_with_header(&paths.secondary_output, &secondary_columns)
            .with_context(|| format!("Failed preparing {}", paths.secondary_output.display()))?;

        let fetcher = FetchOrchestrator::new(client, cache, config.vicinity, config.retry)
            .with_offline(config.offline)
            .with_max_live_lookups(config.max_new_lookups);
        let processor = RowProcessor::new(
            fetcher,
            registry,
            build_scorer(config.scorer),
            ProcessorSettings {
                result_limit: config.vicinity.result_limit as usize,
                fuzzy_threshold: config.fuzzy_threshold,
                region_guard: config.region_guard,
            },
        );

        Ok(Self {
            table,
            ledger,
            processor,
            primary,
            secondary,
        })
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn processor(&self) -> &RowProcessor<C> {
        &self.processor
    }

    /// Processes rows from the ledger's resume point until the input ends,
    /// `shutdown` is raised or the live-call budget runs out.
    pub async fn run(&mut self, shutdown: &AtomicBool) -> Result<RunSummary> {
        let total_rows = self.table.rows.len();
        let start_row = self.ledger.next_row().min(total_rows);
        let mut summary = RunSummary {
            total_rows,
            start_row,
            rows_processed: 0,
            rows_failed: 0,
            primary_rows: 0,
            secondary_rows: 0,
            cache_hits: 0,
            live_lookups: 0,
            api_requests: 0,
            failed_lookups: 0,
            duplicate_candidates: 0,
            already_emitted: 0,
            out_of_region: 0,
            stop_reason: StopReason::Completed,
        };

        info!(
            total_rows,
            start_row,
            scorer = self.processor.scorer_name(),
            "starting enrichment"
        );
        let progress = row_progress_bar(total_rows, start_row);

        for row in &self.table.rows[start_row..] {
            if shutdown.load(Ordering::SeqCst) {
                summary.stop_reason = StopReason::Interrupted;
                break;
            }
            progress.set_message(format!("row {}", row.index));

            let outcome = match self.processor.process(row).await {
                Ok(batch) => write_batch(&self.primary, &self.secondary, &batch)
                    .map(|()| batch)
                    .map_err(RowError::Processing),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(batch) => {
                    summary.primary_rows += batch.primary.len();
                    summary.secondary_rows += batch.secondary.len();
                    summary.duplicate_candidates += batch.duplicates_in_row;
                    summary.already_emitted += batch.already_emitted;
                    summary.out_of_region += batch.out_of_region;
                    let source = match batch.source {
                        ResponseSource::Cache => "cache",
                        ResponseSource::Api => "api",
                    };
                    info!(
                        row = row.index,
                        vkey = %batch.vkey,
                        source,
                        candidates = batch.candidates,
                        new_places = batch.primary.len(),
                        already_emitted = batch.already_emitted,
                        duplicates_in_row = batch.duplicates_in_row,
                        out_of_region = batch.out_of_region,
                        fuzzy_matches = batch.secondary.len(),
                        "row done"
                    );
                }
                Err(RowError::Fetch(FetchError::BudgetExhausted { budget })) => {
                    warn!(
                        row = row.index,
                        budget, "live lookup budget reached; stopping before this row"
                    );
                    summary.stop_reason = StopReason::BudgetExhausted;
                    break;
                }
                Err(err) => {
                    warn!(row = row.index, %err, "row failed");
                    summary.rows_failed += 1;
                    self.ledger
                        .record_error(row.index as i64, &err.to_string())
                        .context("Failed recording row error in the progress ledger")?;
                }
            }

            self.ledger
                .mark_processed(row.index)
                .context("Failed saving progress ledger")?;
            summary.rows_processed += 1;
            progress.inc(1);
        }

        progress.finish_and_clear();
        let stats = self.processor.fetch_stats();
        summary.cache_hits = stats.cache_hits;
        summary.live_lookups = stats.live_lookups;
        summary.api_requests = stats.api_requests;
        summary.failed_lookups = stats.failed_lookups;

        let known_places = self.processor.registry().claimed_count().unwrap_or_default();
        let cached_vicinities = self
            .processor
            .fetcher()
            .cache()
            .durable_len()
            .unwrap_or_default();
        info!(
            processed = summary.rows_processed,
            failed = summary.rows_failed,
            primary_rows = summary.primary_rows,
            secondary_rows = summary.secondary_rows,
            cache_hits = summary.cache_hits,
            live_lookups = summary.live_lookups,
            failed_lookups = summary.failed_lookups,
            duplicate_candidates = summary.duplicate_candidates,
            already_emitted = summary.already_emitted,
            out_of_region = summary.out_of_region,
            known_places,
            cached_vicinities,
            stop_reason = ?summary.stop_reason,
            progress_file = %self.ledger.path().display(),
            "enrichment finished"
        );
        Ok(summary)
    }
}

fn load_input(config: &EnricherConfig) -> EnrichResult<InputTable> {
    let table = read_rows(&config.paths.input)?;
    let missing = table.missing_columns(&REQUIRED_INPUT_COLUMNS);
    if !missing.is_empty() {
        return Err(EnrichError::MissingColumns(missing));
    }
    Ok(table)
}

fn write_batch(primary: &CsvSink, secondary: &CsvSink, batch: &RowBatch) -> EnrichResult<()> {
    let primary_rows: Vec<Vec<String>> = batch.primary.iter().map(|r| r.to_row()).collect();
    let secondary_rows: Vec<Vec<String>> = batch.secondary.iter().map(|r| r.to_row()).collect();
    primary.append_rows(&primary_rows)?;
    secondary.append_rows(&secondary_rows)
}

fn row_progress_bar(total_rows: usize, start_row: usize) -> ProgressBar {
    let progress = ProgressBar::new(total_rows as u64);
    if !std::io::stderr().is_terminal() {
        progress.set_draw_target(ProgressDrawTarget::hidden());
    }
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:32.cyan/blue}] \
{pos}/{len} ({percent}%) eta {eta_precise} {msg}",
    ) {
        progress.set_style(style.progress_chars("=> "));
    }
    progress.set_position(start_row as u64);
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunPaths;
    use crate::errors::PlacesError;
    use crate::fetch::tests::{ScriptedClient, no_wait, params};
    use crate::scoring::ScorerKind;
    use serde_json::{Value, json};
    use std::{fs, path::Path, time::Duration};
    use tempfile::tempdir;

    const HEADER: &str = "Doctor Contact ID,Associate Hospital,OLat,OLong,pin,Tagged Address";
    const TAGGED: &str = "Apollo Hospital, Bannerghatta Road, Bengaluru 560076";

    fn config(dir: &Path) -> EnricherConfig {
        EnricherConfig {
            paths: RunPaths::under(dir),
            api_key: None,
            endpoint: "http://unused.invalid".into(),
            vicinity: params(),
            retry: no_wait(),
            timeout: Duration::from_secs(1),
            fuzzy_threshold: 75.0,
            scorer: ScorerKind::Levenshtein,
            region_guard: false,
            offline: false,
            max_new_lookups: None,
            reset_progress: false,
            reset_registry: false,
            reset_cache: false,
        }
    }

    fn write_input(dir: &Path, rows: &[&str]) {
        let mut text = format!("{HEADER}\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        fs::write(dir.join("input.csv"), text).unwrap();
    }

    fn read_output(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    fn apollo_places() -> Value {
        json!({"places": [
            {"title": "Apollo Hospital", "address": TAGGED, "latitude": 12.89, "longitude": 77.6, "cid": "X1"},
            {"title": "Corner Clinic", "address": "Brigade Rd, Shanthala Nagar"}
        ]})
    }

    fn single_place(cid: &str) -> Value {
        json!({"places": [{"title": cid, "address": "somewhere", "cid": cid}]})
    }

    async fn run(config: &EnricherConfig, client: ScriptedClient) -> (RunSummary, usize) {
        let mut pipeline = Pipeline::prepare(config, client).unwrap();
        let summary = pipeline.run(&AtomicBool::new(false)).await.unwrap();
        let calls = pipeline.processor().fetcher().client().call_count();
        (summary, calls)
    }

    #[tokio::test]
    async fn end_to_end_with_cache_reuse_and_global_dedupe() {
        let dir = tempdir().unwrap();
        write_input(
            dir.path(),
            &[
                &format!("D1,Apollo,12.9716,77.5946,560001,\"{TAGGED}\""),
                &format!("D2,Apollo,12.97161,77.59462,560001,\"{TAGGED}\""),
            ],
        );
        let cfg = config(dir.path());

        let (summary, calls) = run(&cfg, ScriptedClient::always(apollo_places())).await;
        assert_eq!(calls, 1);
        assert_eq!((summary.cache_hits, summary.live_lookups), (1, 1));
        assert_eq!(summary.rows_processed, 2);
        assert_eq!(summary.already_emitted, 2);
        assert_eq!(summary.stop_reason, StopReason::Completed);

        let primary = read_output(&cfg.paths.primary_output);
        assert_eq!(primary.len(), 2);
        assert_eq!(primary[0][7], "X1");
        assert_eq!(primary[0][5], "560076");
        assert!(primary.iter().all(|r| r[8] == "0"));

        let secondary = read_output(&cfg.paths.secondary_output);
        assert_eq!(secondary.len(), 2);
        assert_eq!(secondary[0][0], "D1");
        assert_eq!(secondary[1][0], "D2");
        assert_eq!(secondary[1][6], "Apollo Hospital");
        assert_eq!(secondary[1].last().unwrap(), "100.00");
        assert_eq!(ProgressLedger::load(&cfg.paths.progress).unwrap().last_processed(), Some(1));

        // second run from scratch: everything is cached and already emitted
        let cfg = EnricherConfig {
            reset_progress: true,
            ..cfg
        };
        let (summary, calls) = run(&cfg, ScriptedClient::always(apollo_places())).await;
        assert_eq!(calls, 0);
        assert_eq!(summary.primary_rows, 0);
        assert_eq!(summary.secondary_rows, 2);
        assert_eq!(read_output(&cfg.paths.primary_output).len(), 2);
        assert_eq!(read_output(&cfg.paths.secondary_output).len(), 4);
    }

    #[tokio::test]
    async fn resumes_after_last_processed_row() {
        let dir = tempdir().unwrap();
        write_input(
            dir.path(),
            &["D1,A,10.0,70.0,111111,x", "D2,B,11.0,71.0,222222,y", "D3,C,12.0,72.0,333333,z"],
        );
        fs::write(
            dir.path().join("progress_log.json"),
            r#"{"last_processed_input_row": 0, "errors": []}"#,
        )
        .unwrap();
        let cfg = config(dir.path());
        let client = ScriptedClient::new(
            vec![Ok(single_place("P2")), Ok(single_place("P3"))],
            json!({"places": []}),
        );

        let (summary, calls) = run(&cfg, client).await;
        assert_eq!(calls, 2);
        assert_eq!(summary.start_row, 1);
        assert_eq!(summary.rows_processed, 2);

        let primary = read_output(&cfg.paths.primary_output);
        let indices: Vec<&str> = primary.iter().map(|r| r[8].as_str()).collect();
        assert_eq!(indices, vec!["1", "2"]);
        assert_eq!(ProgressLedger::load(&cfg.paths.progress).unwrap().last_processed(), Some(2));
    }

    #[tokio::test]
    async fn failed_row_is_recorded_and_skipped() {
        let dir = tempdir().unwrap();
        write_input(dir.path(), &["D1,A,10.0,70.0,111111,x", "D2,B,11.0,71.0,222222,y"]);
        let cfg = config(dir.path());
        let failure = || {
            Err(PlacesError::Status {
                status: 500,
                body: "boom".into(),
            })
        };
        let client = ScriptedClient::new(
            vec![failure(), failure(), failure(), failure()],
            single_place("P2"),
        );

        let (summary, calls) = run(&cfg, client).await;
        assert_eq!(calls, 5);
        assert_eq!(summary.rows_failed, 1);
        assert_eq!(summary.failed_lookups, 1);
        assert_eq!(summary.rows_processed, 2);

        let ledger = ProgressLedger::load(&cfg.paths.progress).unwrap();
        assert_eq!(ledger.last_processed(), Some(1));
        assert_eq!(ledger.state().errors.len(), 1);
        assert_eq!(ledger.state().errors[0].row, 0);
        assert!(ledger.state().errors[0].error.contains("4 attempts"));
        assert_eq!(read_output(&cfg.paths.primary_output).len(), 1);
    }

    #[tokio::test]
    async fn output_append_failure_is_recorded_and_the_run_continues() {
        let dir = tempdir().unwrap();
        write_input(
            dir.path(),
            &[
                &format!("D1,Apollo,12.9716,77.5946,560001,\"{TAGGED}\""),
                &format!("D2,Apollo,12.97161,77.59462,560001,\"{TAGGED}\""),
            ],
        );
        let cfg = config(dir.path());
        let mut pipeline =
            Pipeline::prepare(&cfg, ScriptedClient::always(apollo_places())).unwrap();

        // appends to the primary output now fail
        fs::remove_file(&cfg.paths.primary_output).unwrap();
        fs::create_dir(&cfg.paths.primary_output).unwrap();

        let summary = pipeline.run(&AtomicBool::new(false)).await.unwrap();
        assert_eq!(summary.rows_processed, 2);
        assert_eq!(summary.rows_failed, 1);

        let ledger = ProgressLedger::load(&cfg.paths.progress).unwrap();
        assert_eq!(ledger.last_processed(), Some(1));
        assert_eq!(ledger.state().errors.len(), 1);
        assert_eq!(ledger.state().errors[0].row, 0);
        assert!(ledger.state().errors[0].error.starts_with("row processing failed"));

        // places claimed by the failed row are not offered again, so the
        // second row only writes its fuzzy match
        let secondary = read_output(&cfg.paths.secondary_output);
        assert_eq!(secondary.len(), 1);
        assert_eq!(secondary[0][0], "D2");
        assert_eq!(summary.already_emitted, 2);
    }

    #[tokio::test]
    async fn budget_exhaustion_stops_without_advancing() {
        let dir = tempdir().unwrap();
        write_input(dir.path(), &["D1,A,10.0,70.0,111111,x", "D2,B,11.0,71.0,222222,y"]);
        let cfg = EnricherConfig {
            max_new_lookups: Some(1),
            ..config(dir.path())
        };

        let (summary, calls) = run(&cfg, ScriptedClient::always(single_place("P"))).await;
        assert_eq!(calls, 1);
        assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
        assert_eq!(summary.rows_processed, 1);
        let ledger = ProgressLedger::load(&cfg.paths.progress).unwrap();
        assert_eq!(ledger.last_processed(), Some(0));
        assert!(ledger.state().errors.is_empty());
    }

    #[tokio::test]
    async fn shutdown_flag_stops_before_next_row() {
        let dir = tempdir().unwrap();
        write_input(dir.path(), &["D1,A,10.0,70.0,111111,x"]);
        let cfg = config(dir.path());

        let mut pipeline = Pipeline::prepare(&cfg, ScriptedClient::always(single_place("P"))).unwrap();
        let summary = pipeline.run(&AtomicBool::new(true)).await.unwrap();
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert_eq!(summary.rows_processed, 0);
        assert_eq!(pipeline.ledger().last_processed(), None);
    }

    #[tokio::test]
    async fn offline_miss_is_a_row_failure() {
        let dir = tempdir().unwrap();
        write_input(dir.path(), &["D1,A,10.0,70.0,111111,x"]);
        let cfg = EnricherConfig {
            offline: true,
            ..config(dir.path())
        };

        let (summary, calls) = run(&cfg, ScriptedClient::always(single_place("P"))).await;
        assert_eq!(calls, 0);
        assert_eq!(summary.rows_failed, 1);
        assert_eq!(ProgressLedger::load(&cfg.paths.progress).unwrap().last_processed(), Some(0));
    }

    #[test]
    fn missing_columns_are_recorded_and_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("input.csv"), "Associate Hospital,OLat,OLong\nA,1,2\n").unwrap();
        let cfg = config(dir.path());

        assert!(Pipeline::prepare(&cfg, ScriptedClient::always(json!({"places": []}))).is_err());
        let ledger = ProgressLedger::load(&cfg.paths.progress).unwrap();
        assert_eq!(ledger.last_processed(), None);
        assert_eq!(ledger.state().errors[0].row, RUN_LEVEL_ROW);
        assert!(ledger.state().errors[0].error.contains("pin"));
        assert!(ledger.state().errors[0].error.contains("Tagged Address"));
    }

    #[test]
    fn secondary_header_is_input_then_primary_then_score() {
        let dir = tempdir().unwrap();
        write_input(dir.path(), &[]);
        let cfg = config(dir.path());
        Pipeline::prepare(&cfg, ScriptedClient::always(json!({"places": []}))).unwrap();

        let header = fs::read_to_string(&cfg.paths.secondary_output).unwrap();
        assert_eq!(
            header.trim_end(),
            format!("{HEADER},Name,Address,Lat,Long,Website,Pincode,Category,CID,InputRowIndex,FuzzyScore")
        );
    }
}
