//! Raw per-player match statistics as delivered by the snapshot provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FixtureId, PlayerId, TeamId};

/// Playing position, which drives the clean-sheet weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[serde(alias = "GKP", alias = "GK")]
    Goalkeeper,
    #[serde(alias = "DEF")]
    Defender,
    #[serde(alias = "MID")]
    Midfielder,
    #[serde(alias = "FWD")]
    Forward,
}

impl Position {
    /// Map the upstream numeric element type (1 = GK ... 4 = FWD).
    pub fn from_element_type(element_type: u8) -> Option<Self> {
        match element_type {
            1 => Some(Position::Goalkeeper),
            2 => Some(Position::Defender),
            3 => Some(Position::Midfielder),
            4 => Some(Position::Forward),
            _ => None,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GKP",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// One player's cumulative statistics for one fixture at a point in time.
///
/// Snapshots are immutable values. A newer snapshot for the same
/// (player, fixture) pair replaces the older one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub player_id: PlayerId,
    pub team_id: TeamId,
    pub fixture_id: FixtureId,
    pub position: Position,

    #[serde(default)]
    pub minutes: u32,
    #[serde(default)]
    pub goals_scored: u32,
    #[serde(default)]
    pub assists: u32,
    /// Already zeroed by the provider when the clean sheet does not apply.
    #[serde(default)]
    pub clean_sheets: u32,
    #[serde(default)]
    pub saves: u32,
    #[serde(default)]
    pub penalties_saved: u32,
    #[serde(default)]
    pub penalties_missed: u32,
    #[serde(default)]
    pub yellow_cards: u32,
    #[serde(default)]
    pub red_cards: u32,
    #[serde(default)]
    pub own_goals: u32,
    #[serde(default)]
    pub big_chances_created: u32,
    #[serde(default)]
    pub big_chances_missed: u32,
    #[serde(default)]
    pub key_passes: u32,
    #[serde(default)]
    pub successful_dribbles: u32,
    #[serde(default)]
    pub recoveries: u32,
    #[serde(default)]
    pub tackles: u32,
    /// Clearances, blocks and interceptions combined.
    #[serde(default)]
    pub clearances_blocks_interceptions: u32,
    #[serde(default)]
    pub errors_leading_to_goal: u32,
    #[serde(default)]
    pub errors_leading_to_chance: u32,
    #[serde(default)]
    pub winning_goals: u32,
    #[serde(default)]
    pub attempted_passes: u32,
    #[serde(default)]
    pub completed_passes: u32,
}

impl StatSnapshot {
    /// A snapshot with every count at zero.
    pub fn new(
        player_id: PlayerId,
        team_id: TeamId,
        fixture_id: FixtureId,
        position: Position,
    ) -> Self {
        Self {
            player_id,
            team_id,
            fixture_id,
            position,
            minutes: 0,
            goals_scored: 0,
            assists: 0,
            clean_sheets: 0,
            saves: 0,
            penalties_saved: 0,
            penalties_missed: 0,
            yellow_cards: 0,
            red_cards: 0,
            own_goals: 0,
            big_chances_created: 0,
            big_chances_missed: 0,
            key_passes: 0,
            successful_dribbles: 0,
            recoveries: 0,
            tackles: 0,
            clearances_blocks_interceptions: 0,
            errors_leading_to_goal: 0,
            errors_leading_to_chance: 0,
            winning_goals: 0,
            attempted_passes: 0,
            completed_passes: 0,
        }
    }

    /// Whether the player has featured at all.
    pub fn has_played(&self) -> bool {
        self.minutes > 0
    }
}

/// A fixture in the gameweek.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    pub home_team_id: TeamId,
    pub away_team_id: TeamId,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub finished: bool,
}

/// Fantasy points the provider reports for a player across the gameweek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPoints {
    pub player_id: PlayerId,
    /// Gameweek total; includes `bonus` once the provider has added it.
    pub total_points: i32,
    /// Official bonus, zero until confirmed.
    #[serde(default)]
    pub bonus: i32,
}

/// Everything one poll of the provider returns for a gameweek.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameweekSnapshot {
    pub gameweek: u32,
    /// Upstream version counter; advances whenever new match events land.
    pub event_count: u64,
    /// Upstream has already finalized bonus for the gameweek.
    #[serde(default)]
    pub bonus_added: bool,
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
    #[serde(default)]
    pub stats: Vec<StatSnapshot>,
    #[serde(default)]
    pub points: Vec<ProviderPoints>,
}

impl GameweekSnapshot {
    /// Stats belonging to one fixture, in provider order.
    pub fn stats_for(&self, fixture_id: FixtureId) -> Vec<StatSnapshot> {
        self.stats
            .iter()
            .filter(|s| s.fixture_id == fixture_id)
            .cloned()
            .collect()
    }

    pub fn started_fixtures(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.iter().filter(|f| f.started)
    }

    pub fn all_finished(&self) -> bool {
        !self.fixtures.is_empty() && self.fixtures.iter().all(|f| f.finished)
    }
}
