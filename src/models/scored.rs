//! Derived BPS models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FixtureId, PlayerId, Position, TeamId};

/// BPS split into its four categories. `negative` is zero or below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BpsBreakdown {
    pub attacking: i32,
    pub defending: i32,
    pub general: i32,
    pub negative: i32,
}

impl BpsBreakdown {
    pub fn total(&self) -> i32 {
        [self.attacking, self.defending, self.general, self.negative]
            .into_iter()
            .fold(0i32, i32::saturating_add)
    }
}

/// Output of the BPS calculator for a single snapshot, before ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BpsScore {
    pub total: i32,
    pub breakdown: BpsBreakdown,
}

/// A player's ranked BPS within one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredPlayer {
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub position: Position,

    /// Tie-break inputs, carried so consumers can explain the ordering.
    pub goals_scored: u32,
    pub assists: u32,
    pub minutes: u32,

    pub total_bps: i32,
    pub breakdown: BpsBreakdown,

    /// 1-based position within the fixture.
    pub live_rank: u32,

    /// Provisional bonus, 0 to 3.
    pub predicted_bonus: u8,
}

/// Ranked BPS for every player in one fixture.
///
/// Superseded wholesale on every update; never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchBpsResult {
    pub fixture_id: FixtureId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    /// Sorted by `live_rank`.
    pub players: Vec<ScoredPlayer>,
    pub updated_at: DateTime<Utc>,
}

impl MatchBpsResult {
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&ScoredPlayer> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn home(&self) -> Vec<&ScoredPlayer> {
        self.players
            .iter()
            .filter(|p| p.team_id == self.home_team_id)
            .collect()
    }

    pub fn away(&self) -> Vec<&ScoredPlayer> {
        self.players
            .iter()
            .filter(|p| p.team_id == self.away_team_id)
            .collect()
    }

    /// Players currently in line for bonus, best first.
    pub fn bonus_recipients(&self) -> Vec<&ScoredPlayer> {
        self.players
            .iter()
            .filter(|p| p.predicted_bonus > 0)
            .collect()
    }
}
