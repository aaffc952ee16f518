use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::common::truncate_for_log;
use crate::errors::PlacesError;

/// Body of a Serper Maps search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub q: String,
    pub num: u32,
    pub start: u32,
    pub ll: String,
    pub gl: String,
    pub hl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<u32>,
}

impl SearchRequest {
    pub fn new(keyword: &str, lat: &str, lon: &str, pin: &str, radius: u32, limit: u32) -> Self {
        let keyword = keyword.trim();
        let term = if keyword.is_empty() {
            "hospital".to_string()
        } else {
            format!("{keyword} hospital")
        };
        let (lat, lon) = (lat.trim(), lon.trim());
        Self {
            q: format!("{term} near {lat},{lon} {} India", pin.trim())
                .trim()
                .to_string(),
            num: limit,
            start: 0,
            ll: format!("{lat},{lon}"),
            gl: "in".into(),
            hl: "en".into(),
            radius: (radius > 0).then_some(radius),
        }
    }
}

#[async_trait]
pub trait PlacesClient: Send + Sync {
    /// One search attempt. Implementations do not retry.
    async fn search(&self, request: &SearchRequest) -> Result<Value, PlacesError>;
}

pub struct SerperClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl SerperClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, PlacesError> {
        let http = Client::builder()
            .user_agent(concat!("hospital-places-enricher/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl PlacesClient for SerperClient {
    async fn search(&self, request: &SearchRequest) -> Result<Value, PlacesError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlacesError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body),
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Accepts a JSON object carrying a `places` key. A null value counts as
/// an empty list.
pub fn validate_response(response: &Value) -> Result<(), PlacesError> {
    match response.get("places") {
        Some(Value::Array(_) | Value::Null) => Ok(()),
        None => Err(PlacesError::InvalidResponse(
            "missing 'places' list".into(),
        )),
        Some(_) => Err(PlacesError::InvalidResponse(
            "'places' is not a list".into(),
        )),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceCandidate {
    pub title: String,
    pub address: String,
    pub latitude: String,
    pub longitude: String,
    pub website: String,
    pub category: String,
    pub cid: Option<String>,
}

impl PlaceCandidate {
    pub fn from_value(value: &Value) -> Self {
        let category = text_field(value, "category");
        let category = if category.trim().is_empty() {
            text_field(value, "type")
        } else {
            category
        };
        let cid = text_field(value, "cid");
        Self {
            title: text_field(value, "title"),
            address: text_field(value, "address"),
            latitude: text_field(value, "latitude"),
            longitude: text_field(value, "longitude"),
            website: text_field(value, "website"),
            category: category.trim().to_string(),
            cid: Some(cid.trim().to_string()).filter(|v| !v.is_empty()),
        }
    }
}

/// At most `limit` candidates, in source order.
pub fn candidates_from_response(response: &Value, limit: usize) -> Vec<PlaceCandidate> {
    response
        .get("places")
        .and_then(Value::as_array)
        .map(|places| {
            places
                .iter()
                .take(limit)
                .map(PlaceCandidate::from_value)
                .collect()
        })
        .unwrap_or_default()
}

fn text_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
