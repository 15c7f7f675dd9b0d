//! Client side of the optimization service.

use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::domain::InvError;
use crate::state::UploadedFile;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSummary {
    pub total_savings: f64,
    pub average_stock_reduction: f64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub optimization_date: DateTime<Utc>,
}

impl OptimizationSummary {
    /// Recomputes the summary from a result table: the sum of `cost_savings`
    /// and the mean of `stock_reduction_pct`, both over number cells only.
    pub fn from_table(data: &Table) -> Self {
        let numbers = |name: &str| -> Vec<f64> {
            data.column(name)
                .map(|c| c.values.iter().filter_map(|v| v.as_number()).collect())
                .unwrap_or_default()
        };
        let reductions = numbers("stock_reduction_pct");
        let average_stock_reduction = if reductions.is_empty() {
            0.0
        } else {
            reductions.iter().sum::<f64>() / reductions.len() as f64
        };
        OptimizationSummary {
            total_savings: numbers("cost_savings").iter().sum(),
            average_stock_reduction,
            optimization_date: Utc::now(),
        }
    }
}

/// Accepts RFC 3339 timestamps as well as offset-less ISO timestamps, which
/// are taken as UTC.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub message: String,
    pub summary: OptimizationSummary,
    pub data: Table,
    pub output_file: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

pub trait OptimizationBackend {
    fn health(&self) -> Result<HealthStatus, InvError>;
    fn optimize(&self, files: &[&UploadedFile]) -> Result<OptimizationResult, InvError>;
}

#[derive(Serialize)]
struct FilePayload<'a> {
    name: &'a str,
    data: &'a Table,
}

#[derive(Serialize)]
struct OptimizeRequest<'a> {
    files: Vec<FilePayload<'a>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// JSON-over-HTTP backend rooted at `base_url` (for example `http://host:5000/api`).
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, InvError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpBackend {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }
}

fn check_status(response: Response) -> Result<Response, InvError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);
    Err(InvError::BackendStatus(format!("{status}: {detail}")))
}

impl OptimizationBackend for HttpBackend {
    fn health(&self) -> Result<HealthStatus, InvError> {
        let response = check_status(self.client.get(self.url("health")).send()?)?;
        let health: HealthStatus = response.json()?;
        debug!("Backend at {} is {}", self.base_url, health.status);
        Ok(health)
    }

    fn optimize(&self, files: &[&UploadedFile]) -> Result<OptimizationResult, InvError> {
        let start_time = Instant::now();
        let request = OptimizeRequest {
            files: files
                .iter()
                .map(|f| FilePayload {
                    name: &f.name,
                    data: &f.table,
                })
                .collect(),
        };
        let response = check_status(self.client.post(self.url("optimize")).json(&request).send()?)?;
        let result: OptimizationResult = response.json()?;
        info!(
            "Optimization of {} files returned {} rows in {}ms",
            files.len(),
            result.data.row_count(),
            start_time.elapsed().as_millis()
        );
        Ok(result)
    }
}
