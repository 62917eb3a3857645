//! Per-invocation audit report
//!
//! One `Report` is created at the start of an apply call, mutated by every
//! stage, and finalized exactly once on every exit path. Nothing is shared
//! across invocations. Persisting the artifact is best-effort: losing a
//! report must never fail the request it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Artifact naming protocol consumed by downstream report tooling.
const REPORT_FUNCTION_NAME: &str = "res_Code_Apply";
const REPORT_FILE_PREFIX: &str = "res_Code_Apply_report_";

/// A single recorded decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_name: String,
    pub success: bool,
    pub details: String,
    /// Seconds spent inside the step, when the stage measured it.
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate stage timings, in seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_operations_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_write_duration: Option<f64>,
}

/// Ordered trace of one extraction + patch invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub function_name: String,
    pub start_time: DateTime<Utc>,
    pub page_file_path: String,
    pub answer_llm_length: usize,
    pub steps: Vec<Step>,
    pub success: bool,
    pub error_details: Option<String>,
    pub performance_metrics: PerformanceMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
    /// Monotonic anchor for duration math; not part of the artifact.
    #[serde(skip, default = "Instant::now")]
    started: Instant,
    /// When false, steps are dropped and no artifact is written.
    #[serde(skip, default)]
    enabled: bool,
}

impl Report {
    /// Start recording one invocation.
    pub fn begin(target: &Path, answer_llm_length: usize, enabled: bool) -> Self {
        Self {
            function_name: REPORT_FUNCTION_NAME.to_string(),
            start_time: Utc::now(),
            page_file_path: target.display().to_string(),
            answer_llm_length,
            steps: Vec::new(),
            success: false,
            error_details: None,
            performance_metrics: PerformanceMetrics::default(),
            end_time: None,
            total_duration: None,
            started: Instant::now(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a step with no measured duration.
    pub fn add_step(&mut self, step_name: &str, success: bool, details: impl Into<String>) {
        self.add_timed_step(step_name, success, details, 0.0);
    }

    /// Append a step with a duration in seconds.
    pub fn add_timed_step(
        &mut self,
        step_name: &str,
        success: bool,
        details: impl Into<String>,
        duration: f64,
    ) {
        if !self.enabled {
            return;
        }
        self.steps.push(Step {
            step_name: step_name.to_string(),
            success,
            details: details.into(),
            duration,
            timestamp: Utc::now(),
        });
    }

    pub fn record_extraction_duration(&mut self, seconds: f64) {
        self.performance_metrics.extraction_duration = Some(seconds);
    }

    pub fn record_file_operations_duration(&mut self, seconds: f64) {
        self.performance_metrics.file_operations_duration = Some(seconds);
    }

    pub fn record_file_write_duration(&mut self, seconds: f64) {
        self.performance_metrics.file_write_duration = Some(seconds);
    }

    /// Stamp the end of the invocation. Called exactly once per invocation,
    /// on success and on every failure path.
    pub fn finalize(&mut self, success: bool, error_details: Option<String>) {
        self.success = success;
        self.error_details = error_details;
        self.end_time = Some(Utc::now());
        self.total_duration = Some(self.started.elapsed().as_secs_f64());
    }

    /// Deterministic artifact file name, derived from the completion time.
    pub fn artifact_name(&self) -> String {
        let stamp = self.end_time.unwrap_or_else(Utc::now);
        format!("{}{}.json", REPORT_FILE_PREFIX, stamp.format("%Y%m%d_%H%M%S"))
    }

    /// Write the artifact into `dir`. Returns the written path, or `None`
    /// when recording is disabled.
    pub fn persist(&self, dir: &Path) -> anyhow::Result<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }
        fs::create_dir_all(dir)?;
        let path = dir.join(self.artifact_name());
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(Some(path))
    }
}
