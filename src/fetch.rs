use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::cache::VicinityCache;
use crate::constants::MAX_RETRY_DELAY_SECS;
use crate::errors::FetchError;
use crate::keys::{VicinityParams, vicinity_key};
use crate::places::{PlacesClient, SearchRequest, validate_response};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based):
    /// `base_delay * backoff_factor^(attempt - 1)`, capped at one hour.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let cap = Duration::from_secs_f64(MAX_RETRY_DELAY_SECS);
        Duration::try_from_secs_f64(self.raw_delay_secs(attempt))
            .map_or(cap, |wait| wait.min(cap))
    }

    /// Longest wait this policy asks for. The final attempt is never followed
    /// by a wait.
    pub fn longest_delay_secs(&self) -> f64 {
        if self.max_attempts < 2 {
            return 0.0;
        }
        self.raw_delay_secs(self.max_attempts - 1)
    }

    fn raw_delay_secs(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        self.base_delay.as_secs_f64() * self.backoff_factor.max(0.0).powi(exponent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Api,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub vkey: String,
    pub response: Value,
    pub source: ResponseSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub cache_hits: usize,
    pub live_lookups: usize,
    pub api_requests: usize,
    pub failed_lookups: usize,
}

/// Serves responses from the vicinity cache and falls back to the places
/// API with retry and backoff on a miss.
pub struct FetchOrchestrator<C> {
    client: C,
    cache: VicinityCache,
    params: VicinityParams,
    retry: RetryPolicy,
    offline: bool,
    max_live_lookups: Option<usize>,
    stats: FetchStats,
}

impl<C: PlacesClient> FetchOrchestrator<C> {
    pub fn new(
        client: C,
        cache: VicinityCache,
        params: VicinityParams,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            cache,
            params,
            retry,
            offline: false,
            max_live_lookups: None,
            stats: FetchStats::default(),
        }
    }

    /// Serve cache hits only; misses fail without touching the network.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Cap on cache misses sent to the API during this run.
    pub fn with_max_live_lookups(mut self, limit: Option<usize>) -> Self {
        self.max_live_lookups = limit;
        self
    }

    pub fn stats(&self) -> FetchStats {
        self.stats
    }

    pub fn cache(&self) -> &VicinityCache {
        &self.cache
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn resolve(
        &mut self,
        keyword: &str,
        lat: &str,
        lon: &str,
        pin: &str,
    ) -> Result<Resolved, FetchError> {
        let vkey = vicinity_key(lat, lon, pin, &self.params);

        if let Some(response) = self.cache.get(&vkey).map_err(FetchError::Cache)? {
            self.stats.cache_hits += 1;
            info!(vkey = %vkey, places = place_count(&response), "cache hit");
            return Ok(Resolved {
                vkey,
                response,
                source: ResponseSource::Cache,
            });
        }

        if self.offline {
            self.stats.failed_lookups += 1;
            return Err(FetchError::Offline { vkey });
        }
        if let Some(budget) = self.max_live_lookups {
            if self.stats.live_lookups >= budget {
                return Err(FetchError::BudgetExhausted { budget });
            }
        }

        self.stats.live_lookups += 1;
        let request = SearchRequest::new(
            keyword,
            lat,
            lon,
            pin,
            self.params.radius_meters,
            self.params.result_limit,
        );
        let response = match self.call_with_retry(&request).await {
            Ok(response) => response,
            Err(err) => {
                self.stats.failed_lookups += 1;
                return Err(err);
            }
        };

        if let Err(err) = self.cache.put(&vkey, &response) {
            warn!(vkey = %vkey, %err, "failed to cache places response");
        }
        Ok(Resolved {
            vkey,
            response,
            source: ResponseSource::Api,
        })
    }

    async fn call_with_retry(&mut self, request: &SearchRequest) -> Result<Value, FetchError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            self.stats.api_requests += 1;
            let outcome = self
                .client
                .search(request)
                .await
                .and_then(|response| validate_response(&response).map(|()| response));

            match outcome {
                Ok(response) => {
                    info!(places = place_count(&response), attempt, "places API ok");
                    return Ok(response);
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt == attempts {
                        warn!(attempts, error = %last_error, "places API failed, giving up");
                        break;
                    }
                    let wait = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        wait_secs = wait.as_secs_f64(),
                        error = %last_error,
                        "places API attempt failed, retrying"
                    );
                    sleep(wait).await;
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts,
            last_error,
        })
    }
}

fn place_count(response: &Value) -> usize {
    response
        .get("places")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}
