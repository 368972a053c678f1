//! On-disk baseline snapshots for cross-run comparison
//!
//! Each snapshot is stored as `<run_id>.json` next to a `<run_id>.sha256`
//! checksum. Loading validates the checksum before the snapshot is used.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::Baseline;
use crate::error::{AnalysisError, Result};
use crate::models::Scope;

/// Baselines of every scope from one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub run_id: String,
    /// Creation time, epoch seconds
    pub created_at: i64,
    pub bucket_seconds: u64,
    pub baselines: Vec<Baseline>,
}

impl BaselineSnapshot {
    pub fn new(run_id: impl Into<String>, bucket_seconds: u64, baselines: Vec<Baseline>) -> Self {
        Self {
            run_id: run_id.into(),
            created_at: chrono::Utc::now().timestamp(),
            bucket_seconds,
            baselines,
        }
    }

    /// Stored baseline for a scope, if the run had one
    pub fn find(&self, scope: &Scope) -> Option<&Baseline> {
        self.baselines.iter().find(|b| b.matches(scope))
    }
}

/// Directory-backed store of baseline snapshots
#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    /// Open a store, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            AnalysisError::BaselineStore(format!(
                "failed to create baseline directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    /// Persist a snapshot and its checksum
    pub fn save(&self, snapshot: &BaselineSnapshot) -> Result<PathBuf> {
        validate_run_id(&snapshot.run_id)?;
        let content = serde_json::to_vec_pretty(snapshot)?;
        let checksum = compute_checksum(&content);

        let data_path = self.data_path(&snapshot.run_id);
        fs::write(&data_path, &content)?;
        fs::write(self.checksum_path(&snapshot.run_id), &checksum)?;

        info!(
            run_id = %snapshot.run_id,
            scopes = snapshot.baselines.len(),
            checksum = %checksum,
            "Baseline snapshot saved"
        );
        Ok(data_path)
    }

    /// Load a snapshot, verifying its checksum
    pub fn load(&self, run_id: &str) -> Result<BaselineSnapshot> {
        validate_run_id(run_id)?;
        let data_path = self.data_path(run_id);
        let content = fs::read(&data_path).map_err(|e| {
            AnalysisError::BaselineStore(format!(
                "baseline '{}' not found at {}: {}",
                run_id,
                data_path.display(),
                e
            ))
        })?;
        let expected = fs::read_to_string(self.checksum_path(run_id)).map_err(|e| {
            AnalysisError::BaselineStore(format!("checksum for baseline '{}' missing: {}", run_id, e))
        })?;

        let actual = compute_checksum(&content);
        if actual != expected.trim() {
            return Err(AnalysisError::ChecksumMismatch {
                run_id: run_id.to_string(),
                expected: expected.trim().to_string(),
                actual,
            });
        }

        let snapshot: BaselineSnapshot = serde_json::from_slice(&content)?;
        debug!(run_id = %run_id, scopes = snapshot.baselines.len(), "Baseline snapshot loaded");
        Ok(snapshot)
    }

    /// Run ids with a stored snapshot, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    return None;
                }
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn data_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    fn checksum_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.sha256", run_id))
    }
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn validate_run_id(run_id: &str) -> Result<()> {
    let valid = !run_id.is_empty()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !run_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(AnalysisError::BaselineStore(format!(
            "invalid run id '{}': use letters, digits, '-', '_' or '.'",
            run_id
        )))
    }
}
