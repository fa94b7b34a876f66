//! Live polling coordinator.
//!
//! Keeps derived results fresh while live mode is on:
//! 1. Fetch the gameweek snapshot (retrying transient failures with backoff)
//! 2. Skip the cycle unless the upstream event counter advanced or a
//!    manager's squad is still missing from the last refresh
//! 3. Rank every started fixture and aggregate every tracked manager
//! 4. Upsert each result wholesale into the result store
//!
//! Stopping bumps a generation counter. Any poll still in flight when that
//! happens is discarded before it can touch the store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::{Clock, TtlCache};
use crate::calculate::{aggregate_team, build_player_live, rank_match};
use crate::fetch::{FetchError, SnapshotProvider};
use crate::models::{GameweekSnapshot, ManagerId, ManagerSquad, MatchBpsResult, TeamTotals};
use crate::storage::{JsonlWriter, ResultStore, StorageError};

/// Errors that can occur during a poll.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Apply task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Poll cancelled")]
    Cancelled,
}

/// Retry policy for upstream fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.initial_delay_ms as f64 * factor) as u64)
    }
}

/// Configuration for live polling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between polls while live mode is on.
    pub interval: Duration,

    /// Gameweek to follow; `None` asks the provider for the current one.
    pub gameweek: Option<u32>,

    /// Managers whose totals are kept fresh.
    pub managers: Vec<ManagerId>,

    pub retry: RetryPolicy,

    /// How long a fetched squad is reused before being fetched again.
    pub squad_ttl: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            gameweek: None,
            managers: Vec::new(),
            retry: RetryPolicy::default(),
            squad_ttl: Duration::from_secs(3600),
        }
    }
}

/// Re-run the engine only when nothing was seen yet or the upstream event
/// counter has advanced.
pub fn should_refresh(last_seen: Option<u64>, current: u64) -> bool {
    match last_seen {
        None => true,
        Some(seen) => current > seen,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Observable coordinator state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveState {
    pub status: LiveStatus,
    pub gameweek: Option<u32>,
    pub last_event_count: Option<u64>,
    pub bonus_added: bool,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub refreshes: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    /// Managers whose squad could not be fetched on the last refresh. They
    /// are retried on the next poll even if the event counter has not moved.
    #[serde(default)]
    pub pending_managers: Vec<ManagerId>,
}

/// Summary of an applied refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub gameweek: u32,
    pub event_count: u64,
    pub fixtures_ranked: u32,
    pub matches_changed: u32,
    pub teams_aggregated: u32,
    pub teams_changed: u32,
    pub squads_skipped: u32,
}

/// What a poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Refreshed(RefreshSummary),
    /// Event counter had not advanced.
    Unchanged { event_count: u64 },
    /// Live mode stopped while the poll was in flight.
    Discarded,
}

/// One line of the refresh history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub at: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
    pub bonus_added: bool,
    #[serde(flatten)]
    pub summary: RefreshSummary,
}

/// Everything derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveResults {
    pub matches: Vec<MatchBpsResult>,
    pub teams: Vec<TeamTotals>,
}

/// Rank every started fixture and aggregate every squad. Pure.
pub fn derive_results(snapshot: &GameweekSnapshot, squads: &[ManagerSquad]) -> LiveResults {
    let matches: Vec<MatchBpsResult> = snapshot
        .started_fixtures()
        .map(|fixture| rank_match(fixture, &snapshot.stats_for(fixture.id), snapshot.as_of))
        .collect();

    let live = build_player_live(snapshot, &matches);
    let teams = squads.iter().map(|squad| aggregate_team(squad, &live)).collect();

    LiveResults { matches, teams }
}

/// Write results unless the poll's generation has been superseded.
///
/// Runs on the blocking pool: the file store does synchronous I/O.
fn apply_results(
    store: &dyn ResultStore,
    apply_lock: &Mutex<()>,
    current: &AtomicU64,
    generation: u64,
    results: &LiveResults,
) -> Result<Option<(u32, u32)>, StorageError> {
    let _guard = apply_lock.lock().unwrap_or_else(|e| e.into_inner());
    if current.load(Ordering::SeqCst) != generation {
        return Ok(None);
    }

    let mut matches_changed = 0;
    for result in &results.matches {
        if store.upsert_match(result)?.changed() {
            matches_changed += 1;
        }
    }

    let mut teams_changed = 0;
    for totals in &results.teams {
        if store.upsert_team(totals)?.changed() {
            teams_changed += 1;
        }
    }

    Ok(Some((matches_changed, teams_changed)))
}

async fn stopped(rx: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if *rx.borrow_and_update() != generation {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Live polling coordinator.
pub struct LiveCoordinator {
    config: PollConfig,
    provider: Arc<dyn SnapshotProvider>,
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    history: Option<JsonlWriter<RefreshRecord>>,
    squads: Mutex<TtlCache<(ManagerId, u32), ManagerSquad>>,
    state: Arc<RwLock<LiveState>>,
    running: AtomicBool,
    generation: Arc<AtomicU64>,
    generation_tx: watch::Sender<u64>,
    /// Held while checking the generation and writing results, so `stop`
    /// cannot interleave with an apply.
    apply_lock: Arc<Mutex<()>>,
}

impl LiveCoordinator {
    pub fn new(
        config: PollConfig,
        provider: Arc<dyn SnapshotProvider>,
        store: Arc<dyn ResultStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (generation_tx, _) = watch::channel(0);
        let squads = Mutex::new(TtlCache::new(config.squad_ttl));
        Self {
            config,
            provider,
            store,
            clock,
            history: None,
            squads,
            state: Arc::new(RwLock::new(LiveState::default())),
            running: AtomicBool::new(false),
            generation: Arc::new(AtomicU64::new(0)),
            generation_tx,
            apply_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Record every applied refresh to a JSONL file.
    pub fn with_history(mut self, history: JsonlWriter<RefreshRecord>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    pub async fn state(&self) -> LiveState {
        self.state.read().await.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drop a cached squad so the next refresh fetches it again.
    pub fn invalidate_squad(&self, manager_id: ManagerId, gameweek: u32) -> bool {
        self.squads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .invalidate(&(manager_id, gameweek))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Start live mode. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Live mode already running");
            return None;
        }

        let generation = {
            let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.generation_tx.send_replace(generation);

        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run(generation).await }))
    }

    /// Stop live mode. No fetch is issued afterwards and any poll still in
    /// flight is discarded.
    pub fn stop(&self) {
        let generation = {
            let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
            self.running.store(false, Ordering::SeqCst);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.generation_tx.send_replace(generation);
        info!("Live mode stop requested");
    }

    async fn run(self: Arc<Self>, generation: u64) {
        let mut stop_rx = self.generation_tx.subscribe();
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.state.write().await.status = LiveStatus::Running;
        info!("Live mode started, polling every {:?}", self.config.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stopped(&mut stop_rx, generation) => break,
            }

            if !self.is_current(generation) {
                break;
            }

            tokio::select! {
                result = self.poll_once() => match result {
                    Ok(PollOutcome::Refreshed(summary)) => info!(
                        "Live refresh applied: event {} ({} fixtures, {} teams)",
                        summary.event_count, summary.fixtures_ranked, summary.teams_aggregated
                    ),
                    Ok(PollOutcome::Unchanged { event_count }) => {
                        debug!("No new events (counter {})", event_count)
                    }
                    Ok(PollOutcome::Discarded) | Err(CoordinatorError::Cancelled) => break,
                    Err(e) => error!("Live poll failed: {}", e),
                },
                _ = stopped(&mut stop_rx, generation) => {
                    info!("Abandoned in-flight poll after stop");
                    break;
                }
            }
        }

        // A restart may already own the state.
        if !self.is_running() {
            self.state.write().await.status = LiveStatus::Stopped;
        }
        info!("Live mode stopped");
    }

    /// Retry `op` on transient errors with exponential backoff.
    async fn with_retry<T, F, Fut>(
        &self,
        what: &str,
        generation: u64,
        mut op: F,
    ) -> Result<T, CoordinatorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.retry.max_retries => {
                    attempt += 1;
                    let delay = match &e {
                        FetchError::RateLimited {
                            retry_after_secs, ..
                        } => Duration::from_secs(*retry_after_secs),
                        _ => self.config.retry.delay_for(attempt),
                    };
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        what, e, attempt, self.config.retry.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                    if !self.is_current(generation) {
                        return Err(CoordinatorError::Cancelled);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn record_failure(&self, error: &CoordinatorError) {
        let mut state = self.state.write().await;
        state.last_poll_at = Some(self.clock.now());
        state.consecutive_failures += 1;
        state.last_error = Some(error.to_string());
        warn!(
            "Poll failed {} time(s) in a row; keeping last results",
            state.consecutive_failures
        );
    }

    async fn squads_for(
        &self,
        gameweek: u32,
        generation: u64,
    ) -> (Vec<ManagerSquad>, Vec<ManagerId>) {
        let mut squads = Vec::with_capacity(self.config.managers.len());
        let mut skipped = Vec::new();

        let purged = self
            .squads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .purge_expired(self.clock.as_ref());
        if purged > 0 {
            debug!("Dropped {} expired squads", purged);
        }

        for &manager_id in &self.config.managers {
            let key = (manager_id, gameweek);
            let cached = self
                .squads
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&key, self.clock.as_ref());
            if let Some(squad) = cached {
                squads.push(squad);
                continue;
            }

            let fetched = self
                .with_retry("Squad fetch", generation, || {
                    self.provider.manager_squad(manager_id, gameweek)
                })
                .await;
            match fetched {
                Ok(squad) => {
                    self.squads
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(key, squad.clone(), self.clock.as_ref());
                    squads.push(squad);
                }
                Err(e) => {
                    warn!("Skipping manager {} this cycle: {}", manager_id, e);
                    skipped.push(manager_id);
                }
            }
        }

        (squads, skipped)
    }

    /// Run one poll cycle.
    pub async fn poll_once(&self) -> Result<PollOutcome, CoordinatorError> {
        let generation = self.generation.load(Ordering::SeqCst);
        match self.poll(generation).await {
            Err(CoordinatorError::Cancelled) => {
                info!("Poll cancelled by stop request");
                Ok(PollOutcome::Discarded)
            }
            Err(e) => {
                self.record_failure(&e).await;
                Err(e)
            }
            ok => ok,
        }
    }

    async fn poll(&self, generation: u64) -> Result<PollOutcome, CoordinatorError> {
        let gameweek = match self.config.gameweek {
            Some(gameweek) => gameweek,
            None => {
                self.with_retry("Gameweek lookup", generation, || {
                    self.provider.current_gameweek()
                })
                .await?
            }
        };

        let snapshot = self
            .with_retry("Snapshot fetch", generation, || {
                self.provider.gameweek_snapshot(gameweek)
            })
            .await?;

        if !self.is_current(generation) {
            return Err(CoordinatorError::Cancelled);
        }

        let (last_seen, pending) = {
            let state = self.state.read().await;
            if state.gameweek == Some(snapshot.gameweek) {
                (state.last_event_count, state.pending_managers.len())
            } else {
                (None, 0)
            }
        };

        let advanced = should_refresh(last_seen, snapshot.event_count);
        if !advanced && pending == 0 {
            let mut state = self.state.write().await;
            state.last_poll_at = Some(self.clock.now());
            state.consecutive_failures = 0;
            state.last_error = None;
            return Ok(PollOutcome::Unchanged {
                event_count: snapshot.event_count,
            });
        }

        if !advanced {
            info!(
                "Retrying {} pending squad(s) at event {}",
                pending, snapshot.event_count
            );
        }

        let (squads, skipped) = self.squads_for(snapshot.gameweek, generation).await;
        let results = derive_results(&snapshot, &squads);
        let fixtures_ranked = results.matches.len() as u32;
        let teams_aggregated = results.teams.len() as u32;

        let store = Arc::clone(&self.store);
        let apply_lock = Arc::clone(&self.apply_lock);
        let current = Arc::clone(&self.generation);
        let applied = tokio::task::spawn_blocking(move || {
            apply_results(store.as_ref(), &apply_lock, &current, generation, &results)
        })
        .await??;
        let Some((matches_changed, teams_changed)) = applied else {
            return Err(CoordinatorError::Cancelled);
        };

        let summary = RefreshSummary {
            gameweek: snapshot.gameweek,
            event_count: snapshot.event_count,
            fixtures_ranked,
            matches_changed,
            teams_aggregated,
            teams_changed,
            squads_skipped: skipped.len() as u32,
        };

        let now = self.clock.now();
        {
            let mut state = self.state.write().await;
            state.gameweek = Some(snapshot.gameweek);
            state.last_event_count = Some(snapshot.event_count);
            state.bonus_added = snapshot.bonus_added;
            state.last_poll_at = Some(now);
            state.last_refresh_at = Some(now);
            state.refreshes += 1;
            state.consecutive_failures = 0;
            state.last_error = None;
            state.pending_managers = skipped;
        }

        if let Some(history) = &self.history {
            let record = RefreshRecord {
                at: now,
                as_of: snapshot.as_of,
                bonus_added: snapshot.bonus_added,
                summary: summary.clone(),
            };
            if let Err(e) = history.append(&record) {
                warn!("Failed to record refresh history: {}", e);
            }
        }

        Ok(PollOutcome::Refreshed(summary))
    }

    /// Read back the stored totals for every tracked manager.
    pub fn stored_teams(&self, gameweek: u32) -> Result<HashMap<ManagerId, TeamTotals>, StorageError> {
        let mut teams = HashMap::new();
        for &manager_id in &self.config.managers {
            if let Some(totals) = self.store.get_team(manager_id, gameweek)? {
                teams.insert(manager_id, totals);
            }
        }
        Ok(teams)
    }
}
