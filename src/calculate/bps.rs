//! BPS calculator.
//!
//! A pure function of a single snapshot. Weights are additive per category;
//! totals are not clamped and may be negative.

use crate::models::{BpsBreakdown, BpsScore, Position, StatSnapshot};

// Attacking
pub const GOAL: i32 = 24;
pub const ASSIST: i32 = 18;
pub const BIG_CHANCE_CREATED: i32 = 3;
pub const KEY_PASS: i32 = 1;
pub const SUCCESSFUL_DRIBBLE: i32 = 1;
pub const WINNING_GOAL: i32 = 6;

// Defending
pub const SAVE: i32 = 2;
pub const PENALTY_SAVE: i32 = 15;
pub const RECOVERY: i32 = 1;
pub const TACKLE: i32 = 2;
pub const CLEARANCE_BLOCK_INTERCEPTION: i32 = 1;

// General
pub const MINUTES_THRESHOLD: u32 = 60;
pub const MINUTES_BONUS: i32 = 6;
/// Pass completion only counts above this many attempts.
pub const MIN_ATTEMPTED_PASSES: u32 = 10;

// Negative
pub const YELLOW_CARD: i32 = -3;
pub const RED_CARD: i32 = -9;
pub const OWN_GOAL: i32 = -6;
pub const PENALTY_MISS: i32 = -6;
pub const BIG_CHANCE_MISSED: i32 = -3;
pub const ERROR_LEADING_TO_GOAL: i32 = -6;
pub const ERROR_LEADING_TO_CHANCE: i32 = -3;

/// Clean-sheet weight for a position.
pub fn clean_sheet_weight(position: Position) -> i32 {
    match position {
        Position::Goalkeeper | Position::Defender => 12,
        Position::Midfielder => 6,
        Position::Forward => 0,
    }
}

/// Pass-completion tier: highest matching threshold only.
pub fn pass_completion_bonus(attempted: u32, completed: u32) -> i32 {
    if attempted <= MIN_ATTEMPTED_PASSES {
        return 0;
    }

    // Integer comparison avoids float rounding at the tier edges.
    let completed = u64::from(completed) * 100;
    let attempted = u64::from(attempted);
    if completed >= 90 * attempted {
        6
    } else if completed >= 80 * attempted {
        4
    } else if completed >= 70 * attempted {
        2
    } else {
        0
    }
}

/// `count × weight`, clamped to the `i32` range.
fn weighted(count: u32, weight: i32) -> i32 {
    i32::try_from(count)
        .unwrap_or(i32::MAX)
        .saturating_mul(weight)
}

fn sum(parts: &[i32]) -> i32 {
    parts.iter().fold(0i32, |acc, &part| acc.saturating_add(part))
}

/// Compute the BPS total and category breakdown for one snapshot.
pub fn compute_bps(stat: &StatSnapshot) -> BpsScore {
    let attacking = sum(&[
        weighted(stat.goals_scored, GOAL),
        weighted(stat.assists, ASSIST),
        weighted(stat.big_chances_created, BIG_CHANCE_CREATED),
        weighted(stat.key_passes, KEY_PASS),
        weighted(stat.successful_dribbles, SUCCESSFUL_DRIBBLE),
        weighted(stat.winning_goals, WINNING_GOAL),
    ]);

    // Clean sheets are credited from the supplied count without a minutes check.
    let defending = sum(&[
        weighted(stat.clean_sheets, clean_sheet_weight(stat.position)),
        weighted(stat.saves, SAVE),
        weighted(stat.penalties_saved, PENALTY_SAVE),
        weighted(stat.recoveries, RECOVERY),
        weighted(stat.tackles, TACKLE),
        weighted(
            stat.clearances_blocks_interceptions,
            CLEARANCE_BLOCK_INTERCEPTION,
        ),
    ]);

    let minutes = if stat.minutes >= MINUTES_THRESHOLD {
        MINUTES_BONUS
    } else {
        0
    };
    let general = minutes + pass_completion_bonus(stat.attempted_passes, stat.completed_passes);

    let negative = sum(&[
        weighted(stat.yellow_cards, YELLOW_CARD),
        weighted(stat.red_cards, RED_CARD),
        weighted(stat.own_goals, OWN_GOAL),
        weighted(stat.penalties_missed, PENALTY_MISS),
        weighted(stat.big_chances_missed, BIG_CHANCE_MISSED),
        weighted(stat.errors_leading_to_goal, ERROR_LEADING_TO_GOAL),
        weighted(stat.errors_leading_to_chance, ERROR_LEADING_TO_CHANCE),
    ]);

    let breakdown = BpsBreakdown {
        attacking,
        defending,
        general,
        negative,
    };

    BpsScore {
        total: breakdown.total(),
        breakdown,
    }
}
