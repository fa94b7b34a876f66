//! Snapshot providers.
//!
//! The engine never talks to the upstream data source directly. A
//! [`SnapshotProvider`] hands it complete gameweek snapshots and manager
//! squads; the HTTP and file implementations here read the same JSON
//! documents from a server or a local directory.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use url::Url;

use crate::models::{GameweekSnapshot, ManagerId, ManagerSquad, SquadPick};

/// Errors that can occur while fetching snapshots.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rate limited by {host}, retry after {retry_after_secs}s")]
    RateLimited { host: String, retry_after_secs: u64 },

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl FetchError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::RateLimited { .. } => true,
            FetchError::HttpStatus { status, .. } => *status >= 500,
            FetchError::Io(_) => true,
            FetchError::InvalidUrl(_) | FetchError::Json(_) | FetchError::NotFound(_) => false,
        }
    }
}

/// Source of live gameweek data.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// The gameweek currently in progress.
    async fn current_gameweek(&self) -> Result<u32, FetchError>;

    /// Fixtures, stats and points for a gameweek as of now.
    async fn gameweek_snapshot(&self, gameweek: u32) -> Result<GameweekSnapshot, FetchError>;

    /// A manager's fifteen picks for a gameweek.
    async fn manager_squad(
        &self,
        manager_id: ManagerId,
        gameweek: u32,
    ) -> Result<ManagerSquad, FetchError>;
}

/// Picks document as served by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicksDocument {
    #[serde(default)]
    pub active_chip: Option<String>,
    pub picks: Vec<SquadPick>,
}

impl PicksDocument {
    pub fn into_squad(self, manager_id: ManagerId, gameweek: u32) -> ManagerSquad {
        ManagerSquad {
            manager_id,
            gameweek,
            picks: self.picks,
            active_chip: self.active_chip,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CurrentGameweek {
    gameweek: u32,
}

/// Relative document paths shared by the HTTP and file providers.
fn current_path() -> String {
    "gameweeks/current".to_string()
}

fn live_path(gameweek: u32) -> String {
    format!("gameweeks/{}/live", gameweek)
}

fn picks_path(manager_id: ManagerId, gameweek: u32) -> String {
    format!("managers/{}/gameweeks/{}/picks", manager_id, gameweek)
}

/// Configuration for the HTTP provider.
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000/api/".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: format!("fpl-live/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Provider backed by a JSON HTTP API.
pub struct HttpSnapshotProvider {
    client: Client,
    base_url: Url,
}

impl HttpSnapshotProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("fpl-live")),
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        // A trailing slash keeps `join` from dropping the last path segment.
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = self.url_for(path)?;
        debug!("Fetching {}", url);

        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(FetchError::RateLimited {
                host: url.host_str().unwrap_or("unknown").to_string(),
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl SnapshotProvider for HttpSnapshotProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn current_gameweek(&self) -> Result<u32, FetchError> {
        let current: CurrentGameweek = self.get_json(&current_path()).await?;
        Ok(current.gameweek)
    }

    async fn gameweek_snapshot(&self, gameweek: u32) -> Result<GameweekSnapshot, FetchError> {
        let snapshot: GameweekSnapshot = self.get_json(&live_path(gameweek)).await?;
        info!(
            gameweek,
            event_count = snapshot.event_count,
            stats = snapshot.stats.len(),
            "Fetched gameweek snapshot"
        );
        Ok(snapshot)
    }

    async fn manager_squad(
        &self,
        manager_id: ManagerId,
        gameweek: u32,
    ) -> Result<ManagerSquad, FetchError> {
        let doc: PicksDocument = self.get_json(&picks_path(manager_id, gameweek)).await?;
        Ok(doc.into_squad(manager_id, gameweek))
    }
}

/// Provider that reads the same documents from a directory tree, e.g.
/// `gameweeks/5/live.json` and `managers/42/gameweeks/5/picks.json`.
pub struct FileSnapshotProvider {
    root: PathBuf,
}

impl FileSnapshotProvider {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, relative: &str) -> PathBuf {
        self.root.join(format!("{}.json", relative))
    }

    async fn read_json<T: DeserializeOwned>(&self, relative: &str) -> Result<T, FetchError> {
        let path = self.path_for(relative);
        if !path.exists() {
            return Err(FetchError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl SnapshotProvider for FileSnapshotProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn current_gameweek(&self) -> Result<u32, FetchError> {
        let current: CurrentGameweek = self.read_json(&current_path()).await?;
        Ok(current.gameweek)
    }

    async fn gameweek_snapshot(&self, gameweek: u32) -> Result<GameweekSnapshot, FetchError> {
        self.read_json(&live_path(gameweek)).await
    }

    async fn manager_squad(
        &self,
        manager_id: ManagerId,
        gameweek: u32,
    ) -> Result<ManagerSquad, FetchError> {
        let doc: PicksDocument = self.read_json(&picks_path(manager_id, gameweek)).await?;
        Ok(doc.into_squad(manager_id, gameweek))
    }
}

/// Scripted provider for tests.
#[cfg(test)]
pub struct MockProvider {
    script: std::sync::Mutex<std::collections::VecDeque<Result<GameweekSnapshot, u16>>>,
    last: std::sync::Mutex<Option<GameweekSnapshot>>,
    squads: std::collections::HashMap<ManagerId, ManagerSquad>,
    delay: Option<Duration>,
    squad_failures: usize,
    pub snapshot_calls: std::sync::atomic::AtomicUsize,
    pub squad_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: std::sync::Mutex::new(std::collections::VecDeque::new()),
            last: std::sync::Mutex::new(None),
            squads: std::collections::HashMap::new(),
            delay: None,
            squad_failures: 0,
            snapshot_calls: std::sync::atomic::AtomicUsize::new(0),
            squad_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Queue a successful snapshot. The last one is repeated once the script runs out.
    pub fn then_snapshot(self, snapshot: GameweekSnapshot) -> Self {
        self.script.lock().unwrap().push_back(Ok(snapshot));
        self
    }

    /// Queue a failure with the given HTTP status.
    pub fn then_fail(self, status: u16) -> Self {
        self.script.lock().unwrap().push_back(Err(status));
        self
    }

    pub fn with_squad(mut self, squad: ManagerSquad) -> Self {
        self.squads.insert(squad.manager_id, squad);
        self
    }

    /// The first `n` squad requests answer not-found.
    pub fn fail_squads(mut self, n: usize) -> Self {
        self.squad_failures = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn squad_calls(&self) -> usize {
        self.squad_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SnapshotProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn current_gameweek(&self) -> Result<u32, FetchError> {
        let last = self.last.lock().unwrap().clone();
        let next = self.script.lock().unwrap().front().cloned();
        match (next, last) {
            (Some(Ok(s)), _) | (_, Some(s)) => Ok(s.gameweek),
            _ => Err(FetchError::NotFound("no snapshot scripted".to_string())),
        }
    }

    async fn gameweek_snapshot(&self, _gameweek: u32) -> Result<GameweekSnapshot, FetchError> {
        self.snapshot_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last.lock().unwrap() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(status)) => Err(FetchError::HttpStatus {
                status,
                message: "scripted failure".to_string(),
            }),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| FetchError::NotFound("no snapshot scripted".to_string())),
        }
    }

    async fn manager_squad(
        &self,
        manager_id: ManagerId,
        _gameweek: u32,
    ) -> Result<ManagerSquad, FetchError> {
        let call = self
            .squad_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if call < self.squad_failures {
            return Err(FetchError::NotFound(format!("manager {}", manager_id)));
        }
        self.squads
            .get(&manager_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("manager {}", manager_id)))
    }
}
