//! Per-manager live totals.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use super::{ManagerId, PlayerId};

/// The counting stats that feed a squad's aggregate totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatLine {
    pub minutes: u32,
    pub goals_scored: u32,
    pub assists: u32,
    pub clean_sheets: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub saves: u32,
}

impl AddAssign for StatLine {
    fn add_assign(&mut self, rhs: Self) {
        self.minutes = self.minutes.saturating_add(rhs.minutes);
        self.goals_scored = self.goals_scored.saturating_add(rhs.goals_scored);
        self.assists = self.assists.saturating_add(rhs.assists);
        self.clean_sheets = self.clean_sheets.saturating_add(rhs.clean_sheets);
        self.yellow_cards = self.yellow_cards.saturating_add(rhs.yellow_cards);
        self.red_cards = self.red_cards.saturating_add(rhs.red_cards);
        self.saves = self.saves.saturating_add(rhs.saves);
    }
}

/// A player's live gameweek points as handed to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLive {
    /// Points including bonus, provisional or final.
    pub total_points: i32,
    /// The bonus folded into `total_points`.
    pub bonus: i32,
    /// `bonus` is a prediction rather than the official award.
    pub bonus_provisional: bool,
    pub stats: StatLine,
}

impl PlayerLive {
    pub fn points_pre_bonus(&self) -> i32 {
        self.total_points.saturating_sub(self.bonus)
    }
}

/// Captain or vice-captain breakdown: "Captain: X points (x2 = Y)".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptainSummary {
    pub player_id: PlayerId,
    /// Raw points before the multiplier.
    pub points: i32,
    pub points_pre_bonus: i32,
    /// Multiplier actually applied to the active total.
    pub multiplier: u8,
    /// `points * multiplier`.
    pub contribution: i32,
}

/// Bonus folded into the active total, split by certainty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTotals {
    pub provisional: i32,
    pub confirmed: i32,
}

impl BonusTotals {
    pub fn total(&self) -> i32 {
        self.provisional.saturating_add(self.confirmed)
    }
}

/// Everything a manager's live score view needs for one gameweek.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamTotals {
    pub manager_id: ManagerId,
    pub gameweek: u32,
    pub active_chip: Option<String>,

    /// Summed across all fifteen picks.
    pub stats: StatLine,

    pub active_points_pre_bonus: i32,
    pub active_points_final: i32,
    pub bench_points_pre_bonus: i32,
    pub bench_points_final: i32,

    pub captain: Option<CaptainSummary>,
    pub vice_captain: Option<CaptainSummary>,

    pub bonus: BonusTotals,

    /// Picks with no live entry yet.
    pub players_not_started: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_line_add_assign() {
        let mut line = StatLine {
            goals_scored: 1,
            saves: 3,
            ..Default::default()
        };
        line += StatLine {
            goals_scored: 2,
            yellow_cards: 1,
            ..Default::default()
        };
        assert_eq!(line.goals_scored, 3);
        assert_eq!(line.saves, 3);
        assert_eq!(line.yellow_cards, 1);
    }

    #[test]
    fn test_stat_line_add_assign_saturates() {
        let mut line = StatLine {
            goals_scored: u32::MAX - 1,
            minutes: 90,
            ..Default::default()
        };
        line += StatLine {
            goals_scored: 5,
            minutes: 90,
            ..Default::default()
        };
        assert_eq!(line.goals_scored, u32::MAX);
        assert_eq!(line.minutes, 180);
    }

    #[test]
    fn test_points_pre_bonus() {
        let live = PlayerLive {
            total_points: 12,
            bonus: 3,
            bonus_provisional: true,
            stats: StatLine::default(),
        };
        assert_eq!(live.points_pre_bonus(), 9);
    }

    #[test]
    fn test_bonus_totals_total() {
        let bonus = BonusTotals {
            provisional: 4,
            confirmed: 2,
        };
        assert_eq!(bonus.total(), 6);
    }
}
