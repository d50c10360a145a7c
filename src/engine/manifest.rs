//! Run manifest and execution record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file_ref::FileReference;
use super::fs_atomic::atomic_write_json;
use crate::error::{Error, ErrorResponse, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One committed step in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub name: String,
    pub tool: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    pub size_bytes: u64,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub skipped: bool,
    /// Error absorbed after retries were exhausted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn from_file(file: &FileReference, duration_ms: u64) -> Self {
        Self {
            name: file.step.clone(),
            tool: file.tool.clone(),
            model: file.model.clone(),
            file_path: file.file_path.clone(),
            size_bytes: file.size_bytes,
            cached: false,
            skipped: false,
            error: None,
            duration_ms,
        }
    }
}

/// On-disk mirror of a run's progress at `<outputDir>/manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowManifest {
    pub workflow_id: String,
    pub workflow_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub query: String,
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl WorkflowManifest {
    pub fn new(workflow_id: &str, workflow_name: &str, query: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            workflow_name: workflow_name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            status: RunStatus::Running,
            query: query.to_string(),
            steps: Vec::new(),
            total_cost: 0.0,
            tokens: 0,
            error: None,
        }
    }

    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(MANIFEST_FILE)
    }

    pub fn write(&self, output_dir: &Path) -> Result<()> {
        atomic_write_json(&Self::path(output_dir), self)
    }

    pub fn load(output_dir: &Path) -> Result<Self> {
        let path = Self::path(output_dir);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Execution(format!("Cannot read manifest {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn finish(&mut self, status: RunStatus, error: Option<ErrorResponse>) {
        self.status = status;
        self.end_time = Some(Utc::now());
        self.error = error;
    }
}

/// Step name and bounded summary, in commit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub step: String,
    pub summary: String,
}

/// Result of one run as returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    #[serde(flatten)]
    pub manifest: WorkflowManifest,
    pub output_dir: PathBuf,
    pub summaries: Vec<StepSummary>,
    /// Closing artifact: the synthesis step if one ran, else the last
    /// committed step
    pub output: Option<FileReference>,
    /// Final report written for `output.saveToFile`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl ExecutionRecord {
    pub fn workflow_id(&self) -> &str {
        &self.manifest.workflow_id
    }

    pub fn status(&self) -> RunStatus {
        self.manifest.status
    }

    pub fn error(&self) -> Option<&ErrorResponse> {
        self.manifest.error.as_ref()
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.manifest.steps.iter().find(|s| s.name == name)
    }

    pub fn summary(&self, step: &str) -> Option<&str> {
        self.summaries
            .iter()
            .find(|s| s.step == step)
            .map(|s| s.summary.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = WorkflowManifest::new("20260101T000000000Z-abcd1234", "demo", "q");
        manifest.steps.push(StepRecord {
            name: "a".into(),
            tool: "llm".into(),
            model: None,
            file_path: None,
            size_bytes: 3,
            cached: true,
            skipped: false,
            error: None,
            duration_ms: 1,
        });
        manifest.write(dir.path()).unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["status"], "running");
        assert!(raw["endTime"].is_null());
        assert_eq!(raw["steps"][0]["sizeBytes"], 3);

        let back = WorkflowManifest::load(dir.path()).unwrap();
        assert_eq!(back, manifest);
    }

    #[test]
    fn test_finish_sets_end_time() {
        let mut manifest = WorkflowManifest::new("id", "demo", "");
        manifest.finish(RunStatus::Failed, Some(ErrorResponse::new("CANCELLED", "Run cancelled")));
        assert_eq!(manifest.status, RunStatus::Failed);
        assert!(manifest.end_time.is_some());
        assert!(manifest.end_time.unwrap() >= manifest.start_time);
    }
}
