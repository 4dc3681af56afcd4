use super::json_file;
use super::plan::Category;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Progress marker written after every work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionCheckpoint {
    pub current_project_id: String,
    pub current_category: Category,
    pub completed_duration_count: usize,
    pub total_duration_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Where checkpoints go, if anywhere.
#[derive(Debug, Clone, Default)]
pub struct CheckpointSink {
    path: Option<PathBuf>,
}

impl CheckpointSink {
    #[must_use]
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()) }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self { path: None }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn write(&self, checkpoint: &CollectionCheckpoint) -> Result<()> {
        match &self.path {
            Some(path) => json_file::save_atomic(checkpoint, path),
            None => Ok(()),
        }
    }

    pub fn read(&self) -> Result<Option<CollectionCheckpoint>> {
        match &self.path {
            Some(path) if path.exists() => json_file::load(path, "checkpoint").map(Some),
            _ => Ok(None),
        }
    }
}
