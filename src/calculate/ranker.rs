//! Match ranker.
//!
//! Orders a fixture's players by BPS and predicts bonus. Bonus is awarded per
//! distinct BPS score, never per rank index: every player sharing the top
//! score gets 3, the next distinct score 2, the one after that 1.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::bps::compute_bps;
use crate::models::{Fixture, MatchBpsResult, ScoredPlayer, StatSnapshot};

/// Bonus for the first, second and third distinct score.
pub const BONUS_TIERS: [u8; 3] = [3, 2, 1];

/// Ordering used for `live_rank`: BPS, then goals, assists and minutes (all
/// descending), then player id ascending so input order never matters.
pub fn rank_order(a: &ScoredPlayer, b: &ScoredPlayer) -> Ordering {
    b.total_bps
        .cmp(&a.total_bps)
        .then_with(|| b.goals_scored.cmp(&a.goals_scored))
        .then_with(|| b.assists.cmp(&a.assists))
        .then_with(|| b.minutes.cmp(&a.minutes))
        .then_with(|| a.player_id.cmp(&b.player_id))
}

fn score(stat: &StatSnapshot) -> ScoredPlayer {
    let bps = compute_bps(stat);
    ScoredPlayer {
        player_id: stat.player_id,
        team_id: stat.team_id,
        position: stat.position,
        goals_scored: stat.goals_scored,
        assists: stat.assists,
        minutes: stat.minutes,
        total_bps: bps.total,
        breakdown: bps.breakdown,
        live_rank: 0,
        predicted_bonus: 0,
    }
}

/// Assign bonus by distinct-score group. `players` must already be sorted by
/// [`rank_order`]. Only positive totals are eligible.
pub fn assign_bonus(players: &mut [ScoredPlayer]) {
    let mut tier = 0usize;
    let mut current: Option<i32> = None;

    for player in players.iter_mut() {
        if player.total_bps <= 0 {
            player.predicted_bonus = 0;
            continue;
        }

        match current {
            Some(score) if score == player.total_bps => {}
            Some(_) => {
                tier += 1;
                current = Some(player.total_bps);
            }
            None => current = Some(player.total_bps),
        }

        player.predicted_bonus = BONUS_TIERS.get(tier).copied().unwrap_or(0);
    }
}

/// Rank every player in one fixture.
///
/// `as_of` is the snapshot time, so ranking the same snapshot twice yields an
/// identical result. An empty `stats` slice gives an empty result.
pub fn rank_match(
    fixture: &Fixture,
    stats: &[StatSnapshot],
    as_of: DateTime<Utc>,
) -> MatchBpsResult {
    let mut players: Vec<ScoredPlayer> = stats.iter().map(score).collect();
    players.sort_by(rank_order);

    for (index, player) in players.iter_mut().enumerate() {
        player.live_rank = index as u32 + 1;
    }
    assign_bonus(&mut players);

    MatchBpsResult {
        fixture_id: fixture.id,
        home_team_id: fixture.home_team_id,
        away_team_id: fixture.away_team_id,
        players,
        updated_at: as_of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FixtureId, PlayerId, Position, TeamId};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixture() -> Fixture {
        Fixture {
            id: FixtureId(7),
            home_team_id: TeamId(1),
            away_team_id: TeamId(2),
            started: true,
            finished: false,
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 13, 15, 45, 0).unwrap()
    }

    /// A snapshot whose BPS is exactly `recoveries` (one point per recovery).
    fn stat_with_bps(player: u32, bps: u32) -> StatSnapshot {
        let mut s = StatSnapshot::new(PlayerId(player), TeamId(1), FixtureId(7), Position::Midfielder);
        s.recoveries = bps;
        s
    }

    fn bonus_of(result: &MatchBpsResult, player: u32) -> u8 {
        result.player(PlayerId(player)).unwrap().predicted_bonus
    }

    fn rank_of(result: &MatchBpsResult, player: u32) -> u32 {
        result.player(PlayerId(player)).unwrap().live_rank
    }

    #[test]
    fn test_empty_stats_gives_empty_result() {
        let result = rank_match(&fixture(), &[], as_of());
        assert!(result.is_empty());
        assert_eq!(result.fixture_id, FixtureId(7));
    }

    #[test]
    fn test_distinct_scores_get_three_two_one() {
        let stats = vec![
            stat_with_bps(1, 20),
            stat_with_bps(2, 40),
            stat_with_bps(3, 30),
            stat_with_bps(4, 10),
        ];
        let result = rank_match(&fixture(), &stats, as_of());

        assert_eq!(bonus_of(&result, 2), 3);
        assert_eq!(bonus_of(&result, 3), 2);
        assert_eq!(bonus_of(&result, 1), 1);
        assert_eq!(bonus_of(&result, 4), 0);
        assert_eq!(rank_of(&result, 2), 1);
        assert_eq!(rank_of(&result, 4), 4);
    }

    #[test]
    fn test_shared_top_score_pushes_next_to_two() {
        let stats = vec![
            stat_with_bps(1, 50),
            stat_with_bps(2, 50),
            stat_with_bps(3, 30),
        ];
        let result = rank_match(&fixture(), &stats, as_of());

        assert_eq!(bonus_of(&result, 1), 3);
        assert_eq!(bonus_of(&result, 2), 3);
        assert_eq!(bonus_of(&result, 3), 2);
        assert!(result.players.iter().all(|p| p.predicted_bonus != 1));
    }

    #[test]
    fn test_three_way_tie_for_second() {
        let stats = vec![
            stat_with_bps(1, 60),
            stat_with_bps(2, 45),
            stat_with_bps(3, 45),
            stat_with_bps(4, 45),
            stat_with_bps(5, 20),
            stat_with_bps(6, 10),
        ];
        let result = rank_match(&fixture(), &stats, as_of());

        let bonuses: Vec<u8> = result.players.iter().map(|p| p.predicted_bonus).collect();
        assert_eq!(bonuses, vec![3, 2, 2, 2, 1, 0]);
    }

    #[test]
    fn test_non_positive_scores_are_not_eligible() {
        let mut negative = StatSnapshot::new(PlayerId(3), TeamId(2), FixtureId(7), Position::Defender);
        negative.yellow_cards = 1;
        let stats = vec![stat_with_bps(1, 12), stat_with_bps(2, 0), negative];
        let result = rank_match(&fixture(), &stats, as_of());

        assert_eq!(bonus_of(&result, 1), 3);
        assert_eq!(bonus_of(&result, 2), 0);
        assert_eq!(bonus_of(&result, 3), 0);
        assert_eq!(rank_of(&result, 3), 3);
        assert_eq!(result.player(PlayerId(3)).unwrap().total_bps, -3);
    }

    #[test]
    fn test_tie_break_chain_orders_but_does_not_split_bonus() {
        // Same BPS: the scorer ranks above the assister, who ranks above the
        // player with more minutes only.
        let mut scorer = StatSnapshot::new(PlayerId(30), TeamId(1), FixtureId(7), Position::Forward);
        scorer.goals_scored = 1; // 24
        scorer.minutes = 45;

        let mut assister = StatSnapshot::new(PlayerId(20), TeamId(1), FixtureId(7), Position::Forward);
        assister.assists = 1; // 18
        assister.big_chances_created = 2; // 6
        assister.minutes = 45;

        let mut grafter = StatSnapshot::new(PlayerId(10), TeamId(2), FixtureId(7), Position::Midfielder);
        grafter.recoveries = 18; // 18
        grafter.minutes = 90; // 6

        let result = rank_match(&fixture(), &[grafter, assister, scorer], as_of());

        let order: Vec<u32> = result.players.iter().map(|p| p.player_id.get()).collect();
        assert_eq!(order, vec![30, 20, 10]);
        assert!(result.players.iter().all(|p| p.total_bps == 24));
        assert!(result.players.iter().all(|p| p.predicted_bonus == 3));
    }

    #[test]
    fn test_minutes_then_player_id_break_remaining_ties() {
        let mut early = stat_with_bps(9, 10);
        early.minutes = 30;
        let mut late = stat_with_bps(4, 10);
        late.minutes = 20;
        let same_a = stat_with_bps(8, 10);
        let same_b = stat_with_bps(3, 10);

        let result = rank_match(&fixture(), &[same_a, late, early, same_b], as_of());
        let order: Vec<u32> = result.players.iter().map(|p| p.player_id.get()).collect();
        assert_eq!(order, vec![9, 4, 3, 8]);
    }

    #[test]
    fn test_ranking_is_idempotent_and_order_independent() {
        let stats = vec![
            stat_with_bps(1, 50),
            stat_with_bps(2, 50),
            stat_with_bps(3, 30),
            stat_with_bps(4, 30),
            stat_with_bps(5, 7),
        ];
        let mut reversed = stats.clone();
        reversed.reverse();

        let first = rank_match(&fixture(), &stats, as_of());
        let second = rank_match(&fixture(), &stats, as_of());
        let shuffled = rank_match(&fixture(), &reversed, as_of());

        assert_eq!(first, second);
        assert_eq!(first, shuffled);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&shuffled).unwrap()
        );
    }

    #[test]
    fn test_extra_goal_never_lowers_rank() {
        let mut base: Vec<StatSnapshot> = (1..=6).map(|id| stat_with_bps(id, id * 7)).collect();
        for target in 1..=6u32 {
            let before = rank_match(&fixture(), &base, as_of());
            let idx = (target - 1) as usize;
            base[idx].goals_scored += 1;
            let after = rank_match(&fixture(), &base, as_of());

            let p_before = before.player(PlayerId(target)).unwrap();
            let p_after = after.player(PlayerId(target)).unwrap();
            assert!(p_after.total_bps >= p_before.total_bps);
            assert!(p_after.live_rank <= p_before.live_rank);
            base[idx].goals_scored -= 1;
        }
    }

    #[test]
    fn test_ranks_are_contiguous() {
        let stats: Vec<StatSnapshot> = (1..=22).map(|id| stat_with_bps(id, id % 5)).collect();
        let result = rank_match(&fixture(), &stats, as_of());
        let ranks: Vec<u32> = result.players.iter().map(|p| p.live_rank).collect();
        assert_eq!(ranks, (1..=22).collect::<Vec<u32>>());
    }

    #[test]
    fn test_updated_at_is_snapshot_time() {
        let result = rank_match(&fixture(), &[stat_with_bps(1, 3)], as_of());
        assert_eq!(result.updated_at, as_of());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use proptest::sample::Index;

        fn position_strategy() -> impl Strategy<Value = Position> {
            prop_oneof![
                Just(Position::Goalkeeper),
                Just(Position::Defender),
                Just(Position::Midfielder),
                Just(Position::Forward),
            ]
        }

        // Small ranges so ties on BPS and on the tie-break fields are common.
        fn stat_strategy() -> impl Strategy<Value = StatSnapshot> {
            (
                (position_strategy(), 0u32..=90, 0u32..3, 0u32..3, 0u32..=1, 0u32..6),
                (0u32..=1, 0u32..=1, 0u32..=1, 0u32..12, 0u32..6, 0u32..10),
                (0u32..4, 0u32..4, 0u32..3, 0u32..80, 0u32..=100),
            )
                .prop_map(
                    |(
                        (position, minutes, goals, assists, clean_sheets, saves),
                        (yellow, red, own_goals, recoveries, tackles, cbi),
                        (key_passes, dribbles, big_chances, attempted, completion),
                    )| {
                        let mut s =
                            StatSnapshot::new(PlayerId(0), TeamId(1), FixtureId(7), position);
                        s.minutes = minutes;
                        s.goals_scored = goals;
                        s.assists = assists;
                        s.clean_sheets = clean_sheets;
                        s.saves = saves;
                        s.yellow_cards = yellow;
                        s.red_cards = red;
                        s.own_goals = own_goals;
                        s.recoveries = recoveries;
                        s.tackles = tackles;
                        s.clearances_blocks_interceptions = cbi;
                        s.key_passes = key_passes;
                        s.successful_dribbles = dribbles;
                        s.big_chances_created = big_chances;
                        s.attempted_passes = attempted;
                        s.completed_passes = attempted * completion / 100;
                        s
                    },
                )
        }

        /// One fixture's worth of snapshots with distinct player ids.
        fn fixture_stats() -> impl Strategy<Value = Vec<StatSnapshot>> {
            prop::collection::vec(stat_strategy(), 1..=22).prop_map(|mut stats| {
                for (index, s) in stats.iter_mut().enumerate() {
                    s.player_id = PlayerId(index as u32 + 1);
                }
                stats
            })
        }

        fn shuffled_pair() -> impl Strategy<Value = (Vec<StatSnapshot>, Vec<StatSnapshot>)> {
            fixture_stats().prop_flat_map(|stats| (Just(stats.clone()), Just(stats).prop_shuffle()))
        }

        proptest! {
            #[test]
            fn prop_input_order_does_not_matter((stats, shuffled) in shuffled_pair()) {
                let a = rank_match(&fixture(), &stats, as_of());
                let b = rank_match(&fixture(), &shuffled, as_of());
                prop_assert_eq!(a, b);
            }

            #[test]
            fn prop_bonus_follows_bps(stats in fixture_stats()) {
                let result = rank_match(&fixture(), &stats, as_of());

                for pair in result.players.windows(2) {
                    prop_assert!(pair[0].total_bps >= pair[1].total_bps);
                    prop_assert!(pair[0].predicted_bonus >= pair[1].predicted_bonus);
                    if pair[0].total_bps == pair[1].total_bps {
                        prop_assert_eq!(pair[0].predicted_bonus, pair[1].predicted_bonus);
                    }
                }
                for player in &result.players {
                    if player.total_bps <= 0 {
                        prop_assert_eq!(player.predicted_bonus, 0);
                    }
                }
            }

            #[test]
            fn prop_extra_goal_never_hurts(stats in fixture_stats(), pick in any::<Index>()) {
                let index = pick.index(stats.len());
                let player = stats[index].player_id.0;
                let before = rank_match(&fixture(), &stats, as_of());

                let mut boosted = stats.clone();
                boosted[index].goals_scored += 1;
                let after = rank_match(&fixture(), &boosted, as_of());

                let p_before = before.player(PlayerId(player)).unwrap();
                let p_after = after.player(PlayerId(player)).unwrap();
                prop_assert!(p_after.total_bps > p_before.total_bps);
                prop_assert!(p_after.live_rank <= p_before.live_rank);
                prop_assert!(p_after.predicted_bonus >= p_before.predicted_bonus);
            }
        }
    }
}
