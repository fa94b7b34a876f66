use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::models::{FixtureId, ManagerId, MatchBpsResult, TeamTotals};
use crate::sync::LiveState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub poll_interval_seconds: u64,
    pub managers: Vec<ManagerId>,
    #[serde(flatten)]
    pub state: LiveState,
}

async fn status_response(state: &AppState) -> StatusResponse {
    let config = state.coordinator.config();
    StatusResponse {
        running: state.coordinator.is_running(),
        poll_interval_seconds: config.interval.as_secs(),
        managers: config.managers.clone(),
        state: state.coordinator.state().await,
    }
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(status_response(&state).await)
}

#[derive(Debug, Serialize)]
pub struct FixtureListResponse {
    pub fixtures: Vec<MatchBpsResult>,
    pub count: usize,
}

pub async fn list_fixtures(
    State(state): State<AppState>,
) -> Result<Json<FixtureListResponse>, ApiError> {
    let fixtures = state
        .store
        .list_matches()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(FixtureListResponse {
        count: fixtures.len(),
        fixtures,
    }))
}

pub async fn get_fixture(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<MatchBpsResult>, ApiError> {
    state
        .store
        .get_match(FixtureId(id))
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Fixture not found: {}", id)))
}

pub async fn get_team(
    State(state): State<AppState>,
    Path((id, gameweek)): Path<(u64, u32)>,
) -> Result<Json<TeamTotals>, ApiError> {
    state
        .store
        .get_team(ManagerId(id), gameweek)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No totals for manager {} in gameweek {}",
                id, gameweek
            ))
        })
}

pub async fn start(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    if state.coordinator.start().is_none() {
        return Err(ApiError::Conflict("Live mode is already running".to_string()));
    }
    tracing::info!("Live mode started via API");
    Ok((StatusCode::ACCEPTED, Json(status_response(&state).await)))
}

pub async fn stop(State(state): State<AppState>) -> Json<StatusResponse> {
    state.coordinator.stop();
    Json(status_response(&state).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::cache::SystemClock;
    use crate::config::ServerConfig;
    use crate::fetch::MockProvider;
    use crate::storage::test_support::{match_result, team_totals};
    use crate::storage::{InMemoryResultStore, ResultStore};
    use crate::sync::{LiveCoordinator, PollConfig};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn setup_app() -> (axum::Router, Arc<LiveCoordinator>) {
        let store = Arc::new(InMemoryResultStore::new());
        store.upsert_match(&match_result(3)).unwrap();
        store.upsert_match(&match_result(1)).unwrap();
        store.upsert_team(&team_totals(42, 10, 57)).unwrap();

        let config = PollConfig {
            interval: Duration::from_secs(60),
            managers: vec![ManagerId(42)],
            ..Default::default()
        };
        let coordinator = Arc::new(LiveCoordinator::new(
            config,
            Arc::new(MockProvider::new()),
            store,
            Arc::new(SystemClock),
        ));

        let app = build_router(AppState::new(coordinator.clone()), &ServerConfig::default());
        (app, coordinator)
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    async fn post_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_status_idle() {
        let (app, _) = setup_app();
        let (status, json) = get_json(app, "/api/live/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["running"], false);
        assert_eq!(json["status"], "idle");
        assert_eq!(json["poll_interval_seconds"], 60);
        assert_eq!(json["managers"][0], 42);
    }

    #[tokio::test]
    async fn test_list_fixtures_sorted() {
        let (app, _) = setup_app();
        let (status, json) = get_json(app, "/api/live/fixtures").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 2);
        assert_eq!(json["fixtures"][0]["fixture_id"], 1);
        assert_eq!(json["fixtures"][1]["fixture_id"], 3);
    }

    #[tokio::test]
    async fn test_get_fixture() {
        let (app, _) = setup_app();
        let (status, json) = get_json(app.clone(), "/api/live/fixtures/3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["fixture_id"], 3);

        let (status, json) = get_json(app, "/api/live/fixtures/99").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_get_team() {
        let (app, _) = setup_app();
        let (status, json) = get_json(app.clone(), "/api/live/managers/42/gameweeks/10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["active_points_final"], 57);

        let (status, _) = get_json(app, "/api/live/managers/42/gameweeks/11").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (app, coordinator) = setup_app();

        let (status, json) = post_json(app.clone(), "/api/live/start").await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json["running"], true);

        let (status, json) = post_json(app.clone(), "/api/live/start").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");

        let (status, json) = post_json(app, "/api/live/stop").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["running"], false);
        assert!(!coordinator.is_running());
    }
}
