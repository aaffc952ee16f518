use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

use crate::common::parse_coordinate;
use crate::constants::{
    COL_ASSOCIATE_HOSPITAL, COL_LATITUDE, COL_LONGITUDE, COL_PIN, COL_TAGGED_ADDRESS,
    INDIA_LAT_RANGE, INDIA_LON_RANGE,
};
use crate::errors::RowError;
use crate::fetch::{FetchOrchestrator, FetchStats, ResponseSource};
use crate::keys::place_identity_key;
use crate::places::{PlaceCandidate, PlacesClient, candidates_from_response};
use crate::registry::PlaceRegistry;
use crate::scoring::{AddressScorer, round_score};
use crate::tabular::InputRow;

static PINCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9]{6})\b").expect("static pincode pattern"));

/// A row of the primary output.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryRecord {
    pub name: String,
    pub address: String,
    pub lat: String,
    pub long: String,
    pub website: String,
    pub pincode: String,
    pub category: String,
    pub cid: String,
    pub input_row_index: usize,
}

impl PrimaryRecord {
    fn from_candidate(candidate: &PlaceCandidate, input_row_index: usize) -> Self {
        Self {
            name: candidate.title.clone(),
            address: candidate.address.clone(),
            lat: candidate.latitude.clone(),
            long: candidate.longitude.clone(),
            website: candidate.website.clone(),
            pincode: extract_pincode(&candidate.address),
            category: candidate.category.clone(),
            cid: candidate.cid.clone().unwrap_or_default(),
            input_row_index,
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.address.clone(),
            self.lat.clone(),
            self.long.clone(),
            self.website.clone(),
            self.pincode.clone(),
            self.category.clone(),
            self.cid.clone(),
            self.input_row_index.to_string(),
        ]
    }
}

/// A row of the secondary output: the input row, the matched place and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryRecord {
    pub input_values: Vec<String>,
    pub primary: PrimaryRecord,
    pub fuzzy_score: f64,
}

impl SecondaryRecord {
    pub fn to_row(&self) -> Vec<String> {
        let mut row = self.input_values.clone();
        row.extend(self.primary.to_row());
        row.push(format!("{:.2}", self.fuzzy_score));
        row
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub vkey: String,
    pub source: ResponseSource,
    pub primary: Vec<PrimaryRecord>,
    pub secondary: Vec<SecondaryRecord>,
    pub candidates: usize,
    pub duplicates_in_row: usize,
    pub already_emitted: usize,
    pub out_of_region: usize,
}

impl RowBatch {
    fn empty(vkey: String, source: ResponseSource) -> Self {
        Self {
            vkey,
            source,
            primary: Vec::new(),
            secondary: Vec::new(),
            candidates: 0,
            duplicates_in_row: 0,
            already_emitted: 0,
            out_of_region: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorSettings {
    pub result_limit: usize,
    pub fuzzy_threshold: f64,
    pub region_guard: bool,
}

/// Turns one input row into primary and secondary output rows.
pub struct RowProcessor<C> {
    fetcher: FetchOrchestrator<C>,
    registry: PlaceRegistry,
    scorer: Box<dyn AddressScorer>,
    settings: ProcessorSettings,
}

impl<C: PlacesClient> RowProcessor<C> {
    pub fn new(
        fetcher: FetchOrchestrator<C>,
        registry: PlaceRegistry,
        scorer: Box<dyn AddressScorer>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            fetcher,
            registry,
            scorer,
            settings,
        }
    }

    pub fn fetch_stats(&self) -> FetchStats {
        self.fetcher.stats()
    }

    pub fn fetcher(&self) -> &FetchOrchestrator<C> {
        &self.fetcher
    }

    pub fn registry(&self) -> &PlaceRegistry {
        &self.registry
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    pub async fn process(&mut self, row: &InputRow) -> Result<RowBatch, RowError> {
        let resolved = self
            .fetcher
            .resolve(
                row.get(COL_ASSOCIATE_HOSPITAL),
                row.get(COL_LATITUDE),
                row.get(COL_LONGITUDE),
                row.get(COL_PIN),
            )
            .await?;

        let tagged_address = row.get(COL_TAGGED_ADDRESS);
        let mut batch = RowBatch::empty(resolved.vkey, resolved.source);
        let mut seen_in_row = HashSet::new();

        for candidate in candidates_from_response(&resolved.response, self.settings.result_limit)
        {
            batch.candidates += 1;
            let key = place_identity_key(&candidate);
            if !seen_in_row.insert(key.clone()) {
                batch.duplicates_in_row += 1;
                continue;
            }
            if self.settings.region_guard && !within_region(&candidate) {
                batch.out_of_region += 1;
                continue;
            }

            let record = PrimaryRecord::from_candidate(&candidate, row.index);
            if self.registry.try_claim(&key)? {
                batch.primary.push(record.clone());
            } else {
                batch.already_emitted += 1;
            }

            let score = self.scorer.score(&candidate.address, tagged_address);
            if score >= self.settings.fuzzy_threshold {
                batch.secondary.push(SecondaryRecord {
                    input_values: row.values().map(str::to_string).collect(),
                    primary: record,
                    fuzzy_score: round_score(score),
                });
            }
        }

        Ok(batch)
    }
}

/// First 6-digit token in the address; failing that, a 6-digit token in the
/// second-to-last comma-separated segment; otherwise empty.
pub fn extract_pincode(address: &str) -> String {
    if let Some(m) = PINCODE_RE.captures(address).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }
    let parts: Vec<&str> = address
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() >= 2 {
        if let Some(m) = PINCODE_RE
            .captures(parts[parts.len() - 2])
            .and_then(|c| c.get(1))
        {
            return m.as_str().to_string();
        }
    }
    String::new()
}

fn within_region(candidate: &PlaceCandidate) -> bool {
    let in_box = match (
        parse_coordinate(&candidate.latitude),
        parse_coordinate(&candidate.longitude),
    ) {
        (Some(lat), Some(lon)) => {
            (INDIA_LAT_RANGE.0..=INDIA_LAT_RANGE.1).contains(&lat)
                && (INDIA_LON_RANGE.0..=INDIA_LON_RANGE.1).contains(&lon)
        }
        _ => false,
    };
    let address = candidate.address.to_lowercase();
    in_box || address.contains(" india") || PINCODE_RE.is_match(&address)
}
