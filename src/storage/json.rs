//! One JSON document per derived result.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::{ResultStore, StorageConfig, StorageError, UpsertOutcome};
use crate::models::{ContentHash, FixtureId, ManagerId, MatchBpsResult, TeamTotals};

/// Filesystem-backed [`ResultStore`].
///
/// Writes go to a temporary sibling and are renamed into place, so readers
/// only ever see a complete document.
#[derive(Debug, Clone)]
pub struct FileResultStore {
    config: StorageConfig,
}

impl FileResultStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    fn match_path(&self, fixture_id: FixtureId) -> PathBuf {
        self.config
            .fixtures_dir()
            .join(format!("{}.json", fixture_id))
    }

    fn team_path(&self, manager_id: ManagerId, gameweek: u32) -> PathBuf {
        self.config
            .teams_dir()
            .join(format!("{}_gw{}.json", manager_id, gameweek))
    }

    fn write_document<T: Serialize>(
        path: &Path,
        value: &T,
    ) -> Result<UpsertOutcome, StorageError> {
        let bytes = serde_json::to_vec_pretty(value)?;

        let outcome = match fs::read(path) {
            Ok(existing) if ContentHash::of_bytes(&existing) == ContentHash::of_bytes(&bytes) => {
                return Ok(UpsertOutcome::Unchanged);
            }
            Ok(_) => UpsertOutcome::Replaced,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => UpsertOutcome::Inserted,
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;

        debug!("Wrote {:?} ({:?})", path, outcome);
        Ok(outcome)
    }

    fn read_document<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ResultStore for FileResultStore {
    fn upsert_match(&self, result: &MatchBpsResult) -> Result<UpsertOutcome, StorageError> {
        Self::write_document(&self.match_path(result.fixture_id), result)
    }

    fn upsert_team(&self, totals: &TeamTotals) -> Result<UpsertOutcome, StorageError> {
        Self::write_document(&self.team_path(totals.manager_id, totals.gameweek), totals)
    }

    fn get_match(&self, fixture_id: FixtureId) -> Result<Option<MatchBpsResult>, StorageError> {
        Self::read_document(&self.match_path(fixture_id))
    }

    fn list_matches(&self) -> Result<Vec<MatchBpsResult>, StorageError> {
        let dir = self.config.fixtures_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_document::<MatchBpsResult>(&path) {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable result {:?}: {}", path, e),
            }
        }

        results.sort_by_key(|r| r.fixture_id);
        Ok(results)
    }

    fn get_team(
        &self,
        manager_id: ManagerId,
        gameweek: u32,
    ) -> Result<Option<TeamTotals>, StorageError> {
        Self::read_document(&self.team_path(manager_id, gameweek))
    }
}
