//! Metrics reports for CI artifacts.
//!
//! Reports are plain JSON so runs can be diffed and tracked over time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Top-level report written by headless runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Run identifier
    pub test_name: String,

    /// Timestamp when metrics were collected (ISO 8601)
    pub timestamp: String,

    /// Overall result
    pub result: TestResult,

    /// Entity sync counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncMetrics>,

    /// Execution metrics
    pub test_execution: TestExecutionMetrics,
}

/// Overall result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    /// Passed all validations
    Pass,
    /// Failed
    Fail,
}

/// Counters accumulated over a server to client session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    /// Simulation frames stepped
    pub frames: u64,

    /// Frames that produced a packet
    pub frames_written: u64,

    /// Frames with nothing to send
    pub frames_idle: u64,

    /// Frames skipped because the packet log was full
    pub frames_log_full: u64,

    /// Frames skipped for lack of packet space
    pub frames_no_room: u64,

    /// Entity frame bytes handed to the link
    pub bytes_sent: u64,

    /// Entity records written
    pub records_sent: u64,

    /// Entity records left pending for lack of space
    pub records_deferred: u64,

    /// Entity frames dropped by the link
    pub packets_dropped: u64,

    /// Acks dropped by the link
    pub acks_dropped: u64,

    /// Frames the ack reconciler found lost
    pub frames_lost: u64,

    /// Entities whose bits were re-armed after loss
    pub entities_rearmed: u64,

    /// Most unacknowledged commits seen at once
    pub max_commits_outstanding: usize,

    /// Most entities with pending bits seen at once
    pub max_pending_entities: usize,

    /// Entities still differing between server and client at the end
    pub divergent_entities: usize,
}

impl SyncMetrics {
    /// Mean packet size in bytes, 0 if nothing was written.
    pub fn avg_packet_bytes(&self) -> f64 {
        if self.frames_written == 0 {
            0.0
        } else {
            self.bytes_sent as f64 / self.frames_written as f64
        }
    }
}

/// Execution metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestExecutionMetrics {
    /// Total duration (seconds)
    pub duration_seconds: f64,

    /// Number of assertions checked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertions_checked: Option<usize>,

    /// Number of validations passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validations_passed: Option<usize>,
}

/// Builder for constructing metrics reports
pub struct MetricsReportBuilder {
    report: MetricsReport,
}

impl MetricsReportBuilder {
    /// Create a new builder with run name
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            report: MetricsReport {
                test_name: test_name.into(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                result: TestResult::Pass,
                sync: None,
                test_execution: TestExecutionMetrics {
                    duration_seconds: 0.0,
                    assertions_checked: None,
                    validations_passed: None,
                },
            },
        }
    }

    /// Set result
    pub fn result(mut self, result: TestResult) -> Self {
        self.report.result = result;
        self
    }

    /// Set sync counters
    pub fn sync(mut self, metrics: SyncMetrics) -> Self {
        self.report.sync = Some(metrics);
        self
    }

    /// Set execution metrics
    pub fn execution(mut self, metrics: TestExecutionMetrics) -> Self {
        self.report.test_execution = metrics;
        self
    }

    /// Build the metrics report
    pub fn build(self) -> MetricsReport {
        self.report
    }
}

/// Sink for writing metrics reports to JSON files
pub struct MetricsSink {
    path: PathBuf,
}

impl MetricsSink {
    /// Create a new metrics sink at the specified path
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        Ok(Self { path })
    }

    /// Write metrics report to file
    pub fn write(&self, report: &MetricsReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)?;
        let mut file = File::create(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
