//! Step results as summaries plus optional on-disk artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::fs_atomic::atomic_write;
use crate::error::{Error, Result};

/// Marker appended to truncated summaries.
const TRUNCATION_MARKER: &str = "…[truncated";

/// Bounded summary of `content`: the content itself when it fits in
/// `budget` characters, else its first `budget` characters followed by a
/// truncation marker. Depends on nothing but its arguments.
pub fn summarize(content: &str, budget: usize) -> String {
    let total = content.chars().count();
    if total <= budget {
        return content.to_string();
    }
    let head: String = content.chars().take(budget).collect();
    format!("{}{} {} chars]", head, TRUNCATION_MARKER, total - budget)
}

/// Rough token count used for checkpoint and synthesis thresholds.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Handle for one step's result.
///
/// The summary is always in memory and always safe to embed in a later
/// input. `content` is resident only while the full text is held in memory:
/// for results that were not written to disk, and after an explicit load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReference {
    pub step: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileReference {
    /// Build a reference for `content`, persisting it to `save_to` if given.
    pub fn materialize(
        step: &str,
        tool: &str,
        model: Option<String>,
        content: String,
        budget: usize,
        save_to: Option<&Path>,
    ) -> Result<Self> {
        let summary = summarize(&content, budget);
        let size_bytes = content.len() as u64;

        let (file_path, content) = match save_to {
            Some(path) => {
                atomic_write(path, content.as_bytes())?;
                (Some(path.to_path_buf()), None)
            }
            None => (None, Some(content)),
        };

        Ok(Self {
            step: step.to_string(),
            summary,
            file_path,
            size_bytes,
            tool: tool.to_string(),
            model,
            content,
        })
    }

    /// Empty result bound for skipped steps and absorbed failures.
    pub fn empty(step: &str, tool: &str) -> Self {
        Self {
            step: step.to_string(),
            summary: String::new(),
            file_path: None,
            size_bytes: 0,
            tool: tool.to_string(),
            model: None,
            content: Some(String::new()),
        }
    }

    /// Rebuild a reference from a persisted artifact, with content resident.
    pub fn load(step: &str, tool: &str, path: &Path, budget: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Execution(format!(
                "Cannot load artifact of step '{}' from {}: {}",
                step,
                path.display(),
                e
            ))
        })?;
        Ok(Self {
            step: step.to_string(),
            summary: summarize(&content, budget),
            file_path: Some(path.to_path_buf()),
            size_bytes: content.len() as u64,
            tool: tool.to_string(),
            model: None,
            content: Some(content),
        })
    }

    /// Same reference with the full content resident, reading it from disk
    /// when necessary.
    pub fn loaded(&self) -> Result<Self> {
        if self.content.is_some() {
            return Ok(self.clone());
        }
        let Some(path) = &self.file_path else {
            return Err(Error::Execution(format!(
                "Step '{}' has neither resident content nor an artifact",
                self.step
            )));
        };
        let mut loaded = Self::load(&self.step, &self.tool, path, usize::MAX)?;
        loaded.summary = self.summary.clone();
        loaded.model = self.model.clone();
        Ok(loaded)
    }

    pub fn is_resident(&self) -> bool {
        self.content.is_some()
    }

    /// Text substituted for `${step}` / `${step.output}`.
    pub fn interpolation_text(&self) -> &str {
        self.content.as_deref().unwrap_or(&self.summary)
    }

    /// Copy suitable for long-lived state: content dropped when it can be
    /// read back from disk.
    pub fn evicted(&self) -> Self {
        let mut copy = self.clone();
        if copy.file_path.is_some() {
            copy.content = None;
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_within_budget_is_content() {
        assert_eq!(summarize("short", 10), "short");
        assert_eq!(summarize("", 0), "");
    }

    #[test]
    fn test_summary_truncates_on_char_boundary() {
        let s = summarize("héllo wörld", 5);
        assert_eq!(s, "héllo…[truncated 6 chars]");
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_saved_reference_summary_reproducible_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steps/big.out");
        let content = "x".repeat(1200);

        let saved = FileReference::materialize(
            "big",
            "llm",
            Some("m".into()),
            content.clone(),
            100,
            Some(&path),
        )
        .unwrap();
        assert!(!saved.is_resident());
        assert_eq!(saved.size_bytes, 1200);
        assert_eq!(saved.interpolation_text(), saved.summary);

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert_eq!(summarize(&on_disk, 100), saved.summary);

        let loaded = saved.loaded().unwrap();
        assert_eq!(loaded.interpolation_text(), content);
        assert_eq!(loaded.summary, saved.summary);
    }

    #[test]
    fn test_unsaved_reference_keeps_content() {
        let r = FileReference::materialize("s", "llm", None, "full text".into(), 4, None).unwrap();
        assert_eq!(r.summary, "full…[truncated 5 chars]");
        assert_eq!(r.interpolation_text(), "full text");
        assert!(r.loaded().unwrap().is_resident());
        assert_eq!(r.evicted(), r);
    }
}
