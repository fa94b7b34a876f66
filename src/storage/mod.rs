//! Derived-result persistence.
//!
//! Results are upserted wholesale, keyed by fixture for [`MatchBpsResult`]
//! and by (manager, gameweek) for [`TeamTotals`]. Last write wins: inputs
//! are full snapshots, never deltas.
//!
//! Layout under the data directory:
//! - `derived/fixtures/{fixture}.json`
//! - `derived/teams/{manager}_gw{gameweek}.json`
//! - `state/refresh_history.jsonl`

mod json;
mod jsonl;

pub use json::FileResultStore;
pub use jsonl::{JsonlReader, JsonlWriter};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ContentHash, FixtureId, ManagerId, MatchBpsResult, TeamTotals};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn derived_dir(&self) -> PathBuf {
        self.data_dir.join("derived")
    }

    pub fn fixtures_dir(&self) -> PathBuf {
        self.derived_dir().join("fixtures")
    }

    pub fn teams_dir(&self) -> PathBuf {
        self.derived_dir().join("teams")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir().join("refresh_history.jsonl")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// Stored content was already byte-identical.
    Unchanged,
}

impl UpsertOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Keyed store of derived results.
pub trait ResultStore: Send + Sync {
    fn upsert_match(&self, result: &MatchBpsResult) -> Result<UpsertOutcome, StorageError>;

    fn upsert_team(&self, totals: &TeamTotals) -> Result<UpsertOutcome, StorageError>;

    fn get_match(&self, fixture_id: FixtureId) -> Result<Option<MatchBpsResult>, StorageError>;

    /// All stored match results ordered by fixture id.
    fn list_matches(&self) -> Result<Vec<MatchBpsResult>, StorageError>;

    fn get_team(
        &self,
        manager_id: ManagerId,
        gameweek: u32,
    ) -> Result<Option<TeamTotals>, StorageError>;
}

fn compare<T: Serialize>(
    existing: Option<&ContentHash>,
    value: &T,
) -> Result<(ContentHash, UpsertOutcome), StorageError> {
    let hash = ContentHash::of(value)?;
    let outcome = match existing {
        None => UpsertOutcome::Inserted,
        Some(old) if *old == hash => UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Replaced,
    };
    Ok((hash, outcome))
}

/// Process-local store, used by tests and by `serve` without a data dir.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    matches: RwLock<HashMap<FixtureId, (ContentHash, MatchBpsResult)>>,
    teams: RwLock<HashMap<(ManagerId, u32), (ContentHash, TeamTotals)>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for InMemoryResultStore {
    fn upsert_match(&self, result: &MatchBpsResult) -> Result<UpsertOutcome, StorageError> {
        let mut matches = self.matches.write().unwrap_or_else(|e| e.into_inner());
        let (hash, outcome) = compare(matches.get(&result.fixture_id).map(|(h, _)| h), result)?;
        if outcome.changed() {
            matches.insert(result.fixture_id, (hash, result.clone()));
        }
        Ok(outcome)
    }

    fn upsert_team(&self, totals: &TeamTotals) -> Result<UpsertOutcome, StorageError> {
        let key = (totals.manager_id, totals.gameweek);
        let mut teams = self.teams.write().unwrap_or_else(|e| e.into_inner());
        let (hash, outcome) = compare(teams.get(&key).map(|(h, _)| h), totals)?;
        if outcome.changed() {
            teams.insert(key, (hash, totals.clone()));
        }
        Ok(outcome)
    }

    fn get_match(&self, fixture_id: FixtureId) -> Result<Option<MatchBpsResult>, StorageError> {
        let matches = self.matches.read().unwrap_or_else(|e| e.into_inner());
        Ok(matches.get(&fixture_id).map(|(_, r)| r.clone()))
    }

    fn list_matches(&self) -> Result<Vec<MatchBpsResult>, StorageError> {
        let matches = self.matches.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<MatchBpsResult> = matches.values().map(|(_, r)| r.clone()).collect();
        all.sort_by_key(|r| r.fixture_id);
        Ok(all)
    }

    fn get_team(
        &self,
        manager_id: ManagerId,
        gameweek: u32,
    ) -> Result<Option<TeamTotals>, StorageError> {
        let teams = self.teams.read().unwrap_or_else(|e| e.into_inner());
        Ok(teams.get(&(manager_id, gameweek)).map(|(_, t)| t.clone()))
    }
}
