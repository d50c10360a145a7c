//! Checkpoint snapshots for resume.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fs_atomic::atomic_write_json;
use super::state::Bindings;
use crate::error::{Error, Result};

pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Bindings and position of a run, enough to continue it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub workflow_id: String,
    /// Index of the next step to run
    pub step_index: usize,
    pub bindings: Bindings,
    pub tokens: u64,
    #[serde(default)]
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(CHECKPOINT_FILE)
    }

    pub fn save(&self, output_dir: &Path) -> Result<()> {
        atomic_write_json(&Self::path(output_dir), self)
    }

    /// Load the checkpoint of a run directory, `None` if there is none.
    pub fn load(output_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(output_dir);
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
                Error::Execution(format!("Corrupt checkpoint {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove(output_dir: &Path) -> Result<()> {
        match std::fs::remove_file(Self::path(output_dir)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decides when accumulated output warrants a new checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    interval: u64,
    last_tokens: u64,
}

impl CheckpointPolicy {
    pub fn new(interval: u64, current_tokens: u64) -> Self {
        Self {
            interval: interval.max(1),
            last_tokens: current_tokens,
        }
    }

    /// True (and the baseline reset) once `tokens` moved at least one
    /// interval past the last checkpoint.
    pub fn due(&mut self, tokens: u64) -> bool {
        if tokens.saturating_sub(self.last_tokens) >= self.interval {
            self.last_tokens = tokens;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FileReference;

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Checkpoint::load(dir.path()).unwrap().is_none());

        let mut bindings = Bindings::new();
        bindings.set_text("query", "q");
        bindings.set_file("a", FileReference::empty("a", "llm"));
        let checkpoint = Checkpoint {
            workflow_id: "run".into(),
            step_index: 2,
            bindings,
            tokens: 42,
            total_cost: 0.5,
            created_at: Utc::now(),
        };
        checkpoint.save(dir.path()).unwrap();
        assert_eq!(Checkpoint::load(dir.path()).unwrap(), Some(checkpoint));

        Checkpoint::remove(dir.path()).unwrap();
        Checkpoint::remove(dir.path()).unwrap();
        assert!(Checkpoint::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_checkpoint_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CHECKPOINT_FILE), "{not json").unwrap();
        assert!(Checkpoint::load(dir.path()).is_err());
    }

    #[test]
    fn test_policy_interval() {
        let mut policy = CheckpointPolicy::new(100, 0);
        assert!(!policy.due(60));
        assert!(policy.due(120));
        assert!(!policy.due(200));
        assert!(policy.due(220));
    }
}
