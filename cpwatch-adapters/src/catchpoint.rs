//! Catchpoint adapter using the REST API v2.
//!
//! Resolves folders to tests, downloads aggregated or raw test data from the
//! explorer endpoint and flattens it into a [`TestDataset`].
//!
//! ## Requests Made
//!
//! - **Folder details**: `GET /folders/{id}`
//! - **Tests in a folder**: `GET /tests?parentFolderIds={id}`
//! - **Test data**: `GET /tests/explorer/{aggregated|raw}`, retried on 429
//! - **Enumerations**: `GET /tests/explorer/enumeration`
//!
//! ## Example
//!
//! ```rust,no_run
//! use cpwatch_adapters::catchpoint::{CatchpointAdapter, TestDataRequest, TestSelection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = CatchpointAdapter::builder()
//!         .api_key("my-token")
//!         .build()?;
//!
//!     let request = TestDataRequest::new(TestSelection::TestId("123456".into()));
//!     let dataset = adapter.fetch_test_data(&request).await?;
//!
//!     println!("{} rows, {} excluded", dataset.len(), dataset.excluded_rows().len());
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use cpwatch_types::{DataKind, Interval, Provenance, TestDataset, TestType, TIME_FORMAT};

use crate::extract::{extract, ExtractOptions};
use crate::AdapterError;

/// Public API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://io.catchpoint.com/api/v2";

pub const DEFAULT_METRIC_IDS: [&str; 5] = ["1", "2", "30", "4", "5"];
pub const DEFAULT_DIMENSION_IDS: [&str; 7] = ["2", "7", "22", "4", "85", "1", "94"];
pub const DEFAULT_SUB_SOURCE_IDS: [&str; 1] = ["4"];
pub const DEFAULT_TRACEPOINT_IDS: [&str; 3] = ["10565", "10538", "10545"];

/// Trailing window used when no absolute window is given.
pub const DEFAULT_WINDOW_HOURS: f64 = 1.0;

/// Which tests to fetch data for.
#[derive(Debug, Clone, PartialEq)]
pub enum TestSelection {
    TestId(String),
    TestIds(Vec<String>),
    /// Every test in a folder that matches the type filter.
    Folder { id: String, test_type: TestType },
}

/// Time range of the requested data.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeWindow {
    /// `now - hours .. now`, in UTC.
    Trailing { hours: f64 },
    /// Explicit bounds in `%Y-%m-%dT%H:%M:%S`.
    Absolute { start: String, end: String },
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::Trailing {
            hours: DEFAULT_WINDOW_HOURS,
        }
    }
}

impl TimeWindow {
    /// Resolve to `(start, end)` strings with second precision.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<(String, String), AdapterError> {
        match self {
            TimeWindow::Trailing { hours } => {
                let start = (hours.is_finite() && *hours >= 0.0)
                    .then(|| chrono::Duration::try_milliseconds((hours * 3_600_000.0) as i64))
                    .flatten()
                    .and_then(|delta| now.checked_sub_signed(delta))
                    .ok_or_else(|| {
                        AdapterError::InvalidArgument(format!("window of {} hours", hours))
                    })?;
                Ok((
                    start.format(TIME_FORMAT).to_string(),
                    now.format(TIME_FORMAT).to_string(),
                ))
            }
            TimeWindow::Absolute { start, end } => Ok((reformat(start)?, reformat(end)?)),
        }
    }
}

fn reformat(raw: &str) -> Result<String, AdapterError> {
    NaiveDateTime::parse_from_str(raw.trim(), TIME_FORMAT)
        .map(|t| t.format(TIME_FORMAT).to_string())
        .map_err(|e| AdapterError::InvalidArgument(format!("time {:?}: {}", raw, e)))
}

/// Retry behaviour for rate-limited data requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-issues after the first attempt.
    pub max_retries: u32,
    /// Fixed sleep before each re-issue.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Parameters of one test-data download.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDataRequest {
    pub selection: TestSelection,
    pub window: TimeWindow,
    pub interval: Interval,
    pub kind: DataKind,
    pub metric_ids: Vec<String>,
    pub dimension_ids: Vec<String>,
    pub sub_source_ids: Vec<String>,
    pub tracepoint_ids: Vec<String>,
    pub extract: ExtractOptions,
}

fn owned(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

impl TestDataRequest {
    /// A request with the default window, interval and id lists.
    pub fn new(selection: TestSelection) -> Self {
        Self {
            selection,
            window: TimeWindow::default(),
            interval: Interval::default(),
            kind: DataKind::default(),
            metric_ids: owned(&DEFAULT_METRIC_IDS),
            dimension_ids: owned(&DEFAULT_DIMENSION_IDS),
            sub_source_ids: owned(&DEFAULT_SUB_SOURCE_IDS),
            tracepoint_ids: owned(&DEFAULT_TRACEPOINT_IDS),
            extract: ExtractOptions::default(),
        }
    }

    /// Set the time window.
    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Set the aggregation interval.
    pub fn interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Set the data kind.
    pub fn kind(mut self, kind: DataKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the row inclusion policy.
    pub fn extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract = options;
        self
    }
}

/// A monitoring node a folder schedules tests on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: i64,
    pub name: String,
    pub network_type: String,
}

/// Folder summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderDetails {
    pub id: i64,
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(skip)]
    pub raw_response: serde_json::Value,
}

/// One test found in a folder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestDetails {
    pub id: String,
    pub name: String,
    /// Transaction script, URL, or `"unknown"`.
    pub request_data: String,
    pub test_type: String,
    pub monitor: String,
}

/// Catchpoint adapter for collecting test data.
///
/// # Example
///
/// ```rust,no_run
/// use cpwatch_adapters::catchpoint::CatchpointAdapter;
/// use cpwatch_adapters::TestType;
///
/// # tokio_test::block_on(async {
/// let adapter = CatchpointAdapter::builder()
///     .api_key("token")
///     .build()
///     .unwrap();
///
/// for test in adapter.tests_in_folder("73339", TestType::Web).await.unwrap() {
///     println!("{} {}", test.id, test.request_data);
/// }
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct CatchpointAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
    pacing: Duration,
}

impl CatchpointAdapter {
    /// Create a new builder for configuring the adapter.
    pub fn builder() -> CatchpointAdapterBuilder {
        CatchpointAdapterBuilder::default()
    }

    /// Download and extract test data.
    pub async fn fetch_test_data(
        &self,
        request: &TestDataRequest,
    ) -> Result<TestDataset, AdapterError> {
        let test_ids = self.resolve_selection(&request.selection).await?;
        if test_ids.is_empty() {
            error!("no test ids found");
            let folder = match &request.selection {
                TestSelection::Folder { id, .. } => id.clone(),
                _ => String::new(),
            };
            return Err(AdapterError::NoTests(folder));
        }
        debug!(count = test_ids.len(), "total tests to fetch");

        let (start_time, end_time) = request.window.resolve(Utc::now())?;

        let params: Vec<(&str, String)> = vec![
            ("testIds", test_ids.join(",")),
            ("startTime", start_time.clone()),
            ("endTime", end_time.clone()),
            ("interval", request.interval.code().to_string()),
            ("metricIds", request.metric_ids.join(",")),
            ("dimensionIds", request.dimension_ids.join(",")),
            ("subSourceIds", request.sub_source_ids.join(",")),
            ("tracepointIds", request.tracepoint_ids.join(",")),
        ];
        let url = format!("{}/tests/explorer/{}", self.endpoint, request.kind.path());
        debug!(%url, ?params, "fetching test data");

        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }

        let response = self.get_with_retry(&url, &params).await?;
        let body = response.text().await?;
        let payload = parse_payload(&body)?;

        let provenance = Provenance {
            test_ids,
            start_time,
            end_time,
            interval: Some(request.interval),
            metric_ids: request.metric_ids.clone(),
            dimension_ids: request.dimension_ids.clone(),
            sub_source_ids: request.sub_source_ids.clone(),
            tracepoint_ids: request.tracepoint_ids.clone(),
        };
        extract(payload, &request.extract, provenance)
    }

    /// Folder name, id and scheduled nodes.
    pub async fn folder_details(&self, folder_id: &str) -> Result<FolderDetails, AdapterError> {
        let url = format!("{}/folders/{}", self.endpoint, folder_id);
        let response = self
            .get(&url, &[("showInheritedProperties", "true".to_string())])
            .await?;
        let body = ok_body(response).await?;
        let raw = parse_payload(&body)?;

        let envelope = FoldersEnvelope::deserialize(&raw)
            .map_err(|e| AdapterError::Malformed(e.to_string()))?;
        let folder = envelope
            .data
            .folders
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Malformed(format!("folder {} not in response", folder_id)))?;

        Ok(FolderDetails {
            id: folder.id,
            name: folder.name,
            nodes: folder
                .schedule_setting
                .map(|s| s.nodes)
                .unwrap_or_default()
                .into_iter()
                .map(|n| Node {
                    id: n.id,
                    name: n.name,
                    network_type: n.network_type.name,
                })
                .collect(),
            raw_response: raw,
        })
    }

    /// Active tests directly under a folder, filtered by type.
    pub async fn tests_in_folder(
        &self,
        folder_id: &str,
        test_type: TestType,
    ) -> Result<Vec<TestDetails>, AdapterError> {
        let params: Vec<(&str, String)> = vec![
            ("parentFolderIds", folder_id.to_string()),
            ("statusId", "0".to_string()),
            ("pageNumber", "1".to_string()),
            ("pageSize", "100".to_string()),
            ("includeAdvanceSettings", "true".to_string()),
            ("includeRequest", "true".to_string()),
            ("includeInsight", "true".to_string()),
            ("includeTargeting", "true".to_string()),
            ("includeAlerts", "false".to_string()),
            ("showInheritedProperties", "true".to_string()),
        ];
        let url = format!("{}/tests/", self.endpoint);
        let response = self.get(&url, &params).await?;
        let body = ok_body(response).await?;
        let raw = parse_payload(&body)?;

        let envelope =
            TestsEnvelope::deserialize(&raw).map_err(|e| AdapterError::Malformed(e.to_string()))?;

        let tests = envelope
            .data
            .tests
            .into_iter()
            .filter(|t| test_type.matches(&t.test_type.name))
            .map(TestInfo::into_details)
            .collect::<Vec<_>>();
        debug!(folder_id, count = tests.len(), %test_type, "tests in folder");
        Ok(tests)
    }

    /// Dimension, metric, sub-source and interval enumerations by section.
    pub async fn enumerations(&self) -> Result<BTreeMap<String, serde_json::Value>, AdapterError> {
        let url = format!("{}/tests/explorer/enumeration", self.endpoint);
        let params: Vec<(&str, String)> = vec![
            ("includeDimensions", "true".to_string()),
            ("includeMetrics", "true".to_string()),
            ("includeSubSourceTypes", "true".to_string()),
            ("includeTimeIntervals", "true".to_string()),
        ];
        let response = self.get(&url, &params).await?;
        let body = ok_body(response).await?;
        let raw = parse_payload(&body)?;

        let envelope = EnumerationEnvelope::deserialize(&raw)
            .map_err(|e| AdapterError::Malformed(e.to_string()))?;
        Ok(envelope
            .data
            .sections
            .into_iter()
            .map(|s| (s.section, s.enumeration))
            .collect())
    }

    async fn resolve_selection(&self, selection: &TestSelection) -> Result<Vec<String>, AdapterError> {
        match selection {
            TestSelection::TestId(id) => {
                debug!(test_id = %id, "fetching single test id");
                Ok(vec![id.clone()])
            }
            TestSelection::TestIds(ids) => {
                if ids.is_empty() {
                    return Err(AdapterError::InvalidArgument(
                        "test_id[s] or folder_id is a required argument".to_string(),
                    ));
                }
                debug!(?ids, "fetching test ids");
                Ok(ids.clone())
            }
            TestSelection::Folder { id, test_type } => {
                debug!(folder_id = %id, "fetching test info in folder");
                let tests = self.tests_in_folder(id, *test_type).await?;
                Ok(tests.into_iter().map(|t| t.id).collect())
            }
        }
    }

    async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<Response, AdapterError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await?;
        debug!(url = %response.url(), status = response.status().as_u16(), "request");
        Ok(response)
    }

    async fn get_with_retry(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Response, AdapterError> {
        let mut attempt = 0;
        loop {
            let response = self.get(url, params).await?;
            let status = response.status();

            if status == StatusCode::OK {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.retry.max_retries {
                attempt += 1;
                log_rate_limit(&response, attempt);
                tokio::time::sleep(self.retry.backoff).await;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                error!(attempts = attempt + 1, "rate limit exceeded, giving up");
            }
            return Err(status_error(response).await);
        }
    }
}

fn log_rate_limit(response: &Response, attempt: u32) {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    debug!(
        attempt,
        limit = %header("X-Rate-Limit-Limit"),
        remaining = %header("X-Rate-Limit-Remaining"),
        reset = %header("X-Rate-Limit-Reset"),
        "rate limit exceeded, retrying"
    );
}

async fn status_error(response: Response) -> AdapterError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(text) => text,
        Err(e) => e.to_string(),
    };
    error!(status, %body, "request failed");
    AdapterError::Status { status, body }
}

async fn ok_body(response: Response) -> Result<String, AdapterError> {
    if response.status() != StatusCode::OK {
        return Err(status_error(response).await);
    }
    Ok(response.text().await?)
}

/// Decode a JSON body, retrying once with a byte-order mark and surrounding
/// whitespace removed.
pub fn parse_payload(body: &str) -> Result<serde_json::Value, AdapterError> {
    serde_json::from_str(body).or_else(|_| {
        serde_json::from_str(body.trim_start_matches('\u{feff}').trim()).map_err(|e| {
            error!(error = %e, "error decoding response");
            AdapterError::Payload(format!("ERROR: {}\n\n {}", e, body))
        })
    })
}

/// Builder for CatchpointAdapter.
#[derive(Debug, Default)]
pub struct CatchpointAdapterBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    pacing: Option<Duration>,
}

impl CatchpointAdapterBuilder {
    /// Set the API base URL (default: the public v2 API).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the bearer token.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the request timeout (default: 60 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the rate-limit retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Delay before each data request (default: 1 second).
    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Build the adapter.
    pub fn build(self) -> Result<CatchpointAdapter, AdapterError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AdapterError::InvalidArgument("API key not provided".to_string()))?;

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(60)))
            .build()?;

        Ok(CatchpointAdapter {
            client,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            retry: self.retry.unwrap_or_default(),
            pacing: self.pacing.unwrap_or(Duration::from_secs(1)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FoldersEnvelope {
    data: FoldersData,
}

#[derive(Debug, Deserialize)]
struct FoldersData {
    folders: Vec<FolderInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FolderInfo {
    id: i64,
    name: String,
    #[serde(default)]
    schedule_setting: Option<ScheduleSetting>,
}

#[derive(Debug, Deserialize)]
struct ScheduleSetting {
    #[serde(default)]
    nodes: Vec<NodeInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeInfo {
    id: i64,
    name: String,
    network_type: Named,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TestsEnvelope {
    data: TestsData,
}

#[derive(Debug, Deserialize)]
struct TestsData {
    #[serde(default)]
    tests: Vec<TestInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestInfo {
    id: serde_json::Value,
    name: String,
    test_type: Named,
    #[serde(default)]
    test_request_data: Option<RequestData>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    monitor: Option<Named>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestData {
    #[serde(default)]
    request_data: Option<String>,
}

impl TestInfo {
    fn into_details(self) -> TestDetails {
        let request_data = match self.test_type.name.as_str() {
            "Transaction" => self.test_request_data.and_then(|r| r.request_data),
            "Web" => self.url,
            _ => None,
        }
        .unwrap_or_else(|| "unknown".to_string());

        TestDetails {
            id: match self.id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            name: self.name,
            request_data,
            test_type: self.test_type.name,
            monitor: self.monitor.map(|m| m.name).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnumerationEnvelope {
    data: EnumerationData,
}

#[derive(Debug, Deserialize)]
struct EnumerationData {
    sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    section: String,
    enumeration: serde_json::Value,
}
