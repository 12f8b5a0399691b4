use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use ultron_core::{Result, UltronError};

use crate::orchestrator::TickReport;

pub const GITHUB_API: &str = "https://api.github.com";

/// Destination for per-tick reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn save(&self, report: &TickReport) -> Result<()>;
}

/// Save `report`, logging instead of failing.
pub async fn save_best_effort(sink: &dyn ReportSink, report: &TickReport) {
    if let Err(e) = sink.save(report).await {
        warn!(tick = report.tick, "❌ Report error: {}", e);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullReportSink;

#[async_trait]
impl ReportSink for NullReportSink {
    async fn save(&self, _report: &TickReport) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line
#[derive(Debug, Clone)]
pub struct JsonlReportSink {
    path: PathBuf,
}

impl JsonlReportSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReportSink for JsonlReportSink {
    async fn save(&self, report: &TickReport) -> Result<()> {
        let line = serde_json::to_string(report)
            .map_err(|e| UltronError::SerializationError(e.to_string()))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|e| UltronError::ReportError(format!("report writer task failed: {}", e)))??;

        debug!(path = %self.path.display(), tick = report.tick, "Report appended");
        Ok(())
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| UltronError::ReportError(format!("Failed to create report dir: {}", e)))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| UltronError::ReportError(format!("Failed to open report file: {}", e)))?;

    let mut writer = BufWriter::new(file);
    writeln!(writer, "{}", line)
        .and_then(|_| writer.flush())
        .map_err(|e| UltronError::ReportError(format!("Failed to write report: {}", e)))
}

/// Overwrites one JSON file in a GitHub repository through the contents API
pub struct GitHubReportSink {
    http_client: Client,
    api_base: String,
    repo: String,
    token: String,
    file_path: String,
}

impl GitHubReportSink {
    pub fn new(repo: String, token: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ultron/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UltronError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: GITHUB_API.to_string(),
            repo,
            token,
            file_path: "report.json".to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = file_path.into();
        self
    }

    fn contents_url(&self) -> String {
        format!("{}/repos/{}/contents/{}", self.api_base, self.repo, self.file_path)
    }

    /// Blob sha of the current file, `None` if it does not exist yet
    async fn current_sha(&self) -> Result<Option<String>> {
        let response = self
            .http_client
            .get(self.contents_url())
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| UltronError::ReportError(format!("GitHub lookup failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: ContentsResponse = response.json().await.map_err(|e| {
                    UltronError::ReportError(format!("Failed to parse GitHub response: {}", e))
                })?;
                Ok(Some(body.sha))
            }
            status => Err(UltronError::ReportError(format!(
                "GitHub lookup returned HTTP {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl ReportSink for GitHubReportSink {
    async fn save(&self, report: &TickReport) -> Result<()> {
        let content = serde_json::to_vec_pretty(report)
            .map_err(|e| UltronError::SerializationError(e.to_string()))?;
        let sha = self.current_sha().await?;

        let payload = UpdateContentsRequest {
            message: "Update report",
            content: BASE64.encode(content),
            sha,
        };

        let response = self
            .http_client
            .put(self.contents_url())
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github.v3+json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| UltronError::ReportError(format!("GitHub update failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(UltronError::ReportError(format!(
                "GitHub update returned HTTP {}",
                response.status()
            )));
        }

        info!("✅ Report saved to GitHub.");
        Ok(())
    }
}

#[derive(Serialize)]
struct UpdateContentsRequest {
    message: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
}
