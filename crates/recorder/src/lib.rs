use std::time::Duration;

use async_trait::async_trait;
use model::violation::ViolationReport;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer of completed sector records. Implementations are best-effort:
/// `record` never reports failure to the caller, so a sector exit can never
/// stall on persistence.
#[async_trait]
pub trait ViolationSink: Send + Sync {
    async fn record(&self, report: ViolationReport);
}

/// Pushes records to an external storage endpoint, fire-and-forget.
pub struct RemoteRecorder {
    endpoint: String,
    http: reqwest::Client,
}

impl RemoteRecorder {
    pub fn new<S: Into<String>>(endpoint: S) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(UPLOAD_TIMEOUT).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
        })
    }
}

#[async_trait]
impl ViolationSink for RemoteRecorder {
    async fn record(&self, report: ViolationReport) {
        // log and swallow every failure
        match self.http.post(&self.endpoint).json(&report).send().await {
            Ok(response) if response.status().is_success() => {
                log::debug!(
                    "recorded sector session '{}' for device '{}'",
                    report.sector_id,
                    report.device_id
                );
            }
            Ok(response) => {
                log::warn!(
                    "violation upload for sector '{}' rejected: {}",
                    report.sector_id,
                    response.status()
                );
            }
            Err(why) => {
                log::warn!(
                    "violation upload for sector '{}' failed: {}",
                    report.sector_id,
                    why
                );
            }
        }
    }
}

/// Logs records instead of sending them anywhere. Useful for demos and hosts
/// without a configured storage backend.
pub struct LogSink;

#[async_trait]
impl ViolationSink for LogSink {
    async fn record(&self, report: ViolationReport) {
        match serde_json::to_string(&report) {
            Ok(json) => log::info!("sector record: {}", json),
            Err(why) => log::warn!("could not encode sector record: {}", why),
        }
    }
}
