//! Live aggregator.
//!
//! Folds a manager's fifteen picks and the current per-player live points into
//! [`TeamTotals`]. Totals are always rebuilt from scratch.

use std::collections::HashMap;

use tracing::debug;

use crate::models::{
    BonusTotals, CaptainSummary, GameweekSnapshot, ManagerSquad, MatchBpsResult, PlayerId,
    PlayerLive, SquadPick, StatLine, StatSnapshot, TeamTotals,
};

fn captain_summary(pick: &SquadPick, live: Option<&PlayerLive>) -> CaptainSummary {
    let points = live.map(|l| l.total_points).unwrap_or(0);
    let points_pre_bonus = live.map(|l| l.points_pre_bonus()).unwrap_or(0);
    // Bench picks never carry a captaincy multiplier into the active total.
    let multiplier = if pick.is_active() { pick.multiplier } else { 0 };

    CaptainSummary {
        player_id: pick.player_id,
        points,
        points_pre_bonus,
        multiplier,
        contribution: points.saturating_mul(i32::from(multiplier)),
    }
}

/// Aggregate one manager's squad against the live points map.
///
/// Players missing from `live` contribute nothing and are counted in
/// `players_not_started`.
pub fn aggregate_team(
    squad: &ManagerSquad,
    live: &HashMap<PlayerId, PlayerLive>,
) -> TeamTotals {
    let mut totals = TeamTotals {
        manager_id: squad.manager_id,
        gameweek: squad.gameweek,
        active_chip: squad.active_chip.clone(),
        stats: StatLine::default(),
        active_points_pre_bonus: 0,
        active_points_final: 0,
        bench_points_pre_bonus: 0,
        bench_points_final: 0,
        captain: None,
        vice_captain: None,
        bonus: BonusTotals::default(),
        players_not_started: 0,
    };

    for pick in &squad.picks {
        let player = live.get(&pick.player_id);

        if pick.is_captain {
            totals.captain = Some(captain_summary(pick, player));
        }
        if pick.is_vice_captain {
            totals.vice_captain = Some(captain_summary(pick, player));
        }

        let Some(player) = player else {
            totals.players_not_started += 1;
            continue;
        };

        totals.stats += player.stats;

        if pick.is_active() {
            let multiplier = i32::from(pick.multiplier);
            let bonus = player.bonus.saturating_mul(multiplier);
            totals.active_points_final = totals
                .active_points_final
                .saturating_add(player.total_points.saturating_mul(multiplier));
            totals.active_points_pre_bonus = totals
                .active_points_pre_bonus
                .saturating_add(player.points_pre_bonus().saturating_mul(multiplier));
            let bucket = if player.bonus_provisional {
                &mut totals.bonus.provisional
            } else {
                &mut totals.bonus.confirmed
            };
            *bucket = bucket.saturating_add(bonus);
        } else {
            totals.bench_points_final = totals.bench_points_final.saturating_add(player.total_points);
            totals.bench_points_pre_bonus = totals
                .bench_points_pre_bonus
                .saturating_add(player.points_pre_bonus());
        }
    }

    debug!(
        manager = %squad.manager_id,
        gameweek = squad.gameweek,
        active = totals.active_points_final,
        bench = totals.bench_points_final,
        not_started = totals.players_not_started,
        "Aggregated team totals"
    );

    totals
}

fn stat_line(stat: &StatSnapshot) -> StatLine {
    StatLine {
        minutes: stat.minutes,
        goals_scored: stat.goals_scored,
        assists: stat.assists,
        clean_sheets: stat.clean_sheets,
        yellow_cards: stat.yellow_cards,
        red_cards: stat.red_cards,
        saves: stat.saves,
    }
}

/// Build the per-player live map the aggregator consumes.
///
/// With `bonus_added` the provider's points are final and its official bonus
/// is the confirmed component; predictions are ignored. Otherwise the
/// player's predicted bonus, summed over all their fixtures, is added on top
/// as a provisional component.
pub fn build_player_live(
    snapshot: &GameweekSnapshot,
    matches: &[MatchBpsResult],
) -> HashMap<PlayerId, PlayerLive> {
    let mut live: HashMap<PlayerId, PlayerLive> = HashMap::new();

    for points in &snapshot.points {
        let entry = live.entry(points.player_id).or_insert(PlayerLive {
            total_points: 0,
            bonus: 0,
            bonus_provisional: !snapshot.bonus_added,
            stats: StatLine::default(),
        });
        entry.total_points = entry.total_points.saturating_add(points.total_points);
        if snapshot.bonus_added {
            entry.bonus = entry.bonus.saturating_add(points.bonus);
        }
    }

    for stat in &snapshot.stats {
        let entry = live.entry(stat.player_id).or_insert(PlayerLive {
            total_points: 0,
            bonus: 0,
            bonus_provisional: !snapshot.bonus_added,
            stats: StatLine::default(),
        });
        entry.stats += stat_line(stat);
    }

    if !snapshot.bonus_added {
        for result in matches {
            for scored in result.bonus_recipients() {
                if let Some(entry) = live.get_mut(&scored.player_id) {
                    let bonus = i32::from(scored.predicted_bonus);
                    entry.bonus = entry.bonus.saturating_add(bonus);
                    entry.total_points = entry.total_points.saturating_add(bonus);
                }
            }
        }
    }

    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculate::rank_match;
    use crate::models::{
        Fixture, FixtureId, ManagerId, Position, ProviderPoints, TeamId,
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn pick(slot: u8, player: u32) -> SquadPick {
        SquadPick {
            player_id: PlayerId(player),
            position: slot,
            multiplier: if slot <= 11 { 1 } else { 0 },
            is_captain: false,
            is_vice_captain: false,
        }
    }

    /// Players 1..=15 in slots 1..=15, captain in slot 1, vice in slot 2.
    fn squad() -> ManagerSquad {
        let mut picks: Vec<SquadPick> = (1..=15u8).map(|slot| pick(slot, slot as u32)).collect();
        picks[0].is_captain = true;
        picks[0].multiplier = 2;
        picks[1].is_vice_captain = true;
        ManagerSquad {
            manager_id: ManagerId(99),
            gameweek: 4,
            picks,
            active_chip: None,
        }
    }

    fn live(points: i32, bonus: i32) -> PlayerLive {
        PlayerLive {
            total_points: points,
            bonus,
            bonus_provisional: true,
            stats: StatLine::default(),
        }
    }

    #[test]
    fn test_captain_points_and_contribution() {
        let mut map = HashMap::new();
        map.insert(PlayerId(1), live(10, 0));

        let totals = aggregate_team(&squad(), &map);
        let captain = totals.captain.unwrap();

        assert_eq!(captain.points, 10);
        assert_eq!(captain.multiplier, 2);
        assert_eq!(captain.contribution, 20);
        assert_eq!(totals.active_points_final, 20);
    }

    #[test]
    fn test_bench_player_counts_only_to_bench() {
        let mut map = HashMap::new();
        map.insert(PlayerId(13), live(15, 0));

        let totals = aggregate_team(&squad(), &map);

        assert_eq!(totals.bench_points_final, 15);
        assert_eq!(totals.active_points_final, 0);
    }

    #[test]
    fn test_bench_captain_flag_is_not_multiplied() {
        let mut s = squad();
        s.picks[0].is_captain = false;
        s.picks[0].multiplier = 1;
        s.picks[13].is_captain = true;
        s.picks[13].multiplier = 2;

        let mut map = HashMap::new();
        map.insert(PlayerId(14), live(6, 0));

        let totals = aggregate_team(&s, &map);
        assert_eq!(totals.bench_points_final, 6);
        assert_eq!(totals.active_points_final, 0);
        assert_eq!(totals.captain.unwrap().contribution, 0);
    }

    #[test]
    fn test_full_squad_scenario() {
        let mut map = HashMap::new();
        for player in 1..=11 {
            map.insert(PlayerId(player), live(4, 0));
        }
        for (player, points) in [(12, 1), (13, 2), (14, 6), (15, 0)] {
            map.insert(PlayerId(player), live(points, 0));
        }

        let totals = aggregate_team(&squad(), &map);

        assert_eq!(totals.active_points_final, 10 * 4 + 8);
        assert_eq!(totals.bench_points_final, 1 + 2 + 6);
        assert_eq!(totals.players_not_started, 0);
    }

    #[test]
    fn test_pre_bonus_variants() {
        let mut map = HashMap::new();
        map.insert(PlayerId(1), live(12, 3)); // captain x2
        map.insert(PlayerId(5), live(7, 1));
        map.insert(PlayerId(12), live(5, 2));

        let totals = aggregate_team(&squad(), &map);

        assert_eq!(totals.active_points_final, 24 + 7);
        assert_eq!(totals.active_points_pre_bonus, 18 + 6);
        assert_eq!(totals.bench_points_final, 5);
        assert_eq!(totals.bench_points_pre_bonus, 3);
        assert_eq!(totals.bonus.provisional, 6 + 1);
        assert_eq!(totals.bonus.confirmed, 0);
        assert_eq!(
            totals.active_points_final - totals.active_points_pre_bonus,
            totals.bonus.total()
        );

        let captain = totals.captain.unwrap();
        assert_eq!(captain.points_pre_bonus, 9);
    }

    #[test]
    fn test_confirmed_bonus_split() {
        let mut map = HashMap::new();
        let mut confirmed = live(9, 2);
        confirmed.bonus_provisional = false;
        map.insert(PlayerId(3), confirmed);

        let totals = aggregate_team(&squad(), &map);
        assert_eq!(totals.bonus.confirmed, 2);
        assert_eq!(totals.bonus.provisional, 0);
    }

    #[test]
    fn test_missing_players_are_counted_not_scored() {
        let mut map = HashMap::new();
        map.insert(PlayerId(2), live(3, 0));

        let totals = aggregate_team(&squad(), &map);
        assert_eq!(totals.players_not_started, 14);
        assert_eq!(totals.active_points_final, 3);

        let captain = totals.captain.unwrap();
        assert_eq!(captain.points, 0);
        assert_eq!(captain.contribution, 0);
        assert_eq!(totals.vice_captain.unwrap().points, 3);
    }

    #[test]
    fn test_stat_totals_ignore_multiplier_and_bench() {
        let mut map = HashMap::new();
        let mut captain = live(8, 0);
        captain.stats.goals_scored = 1;
        captain.stats.yellow_cards = 1;
        map.insert(PlayerId(1), captain);

        let mut keeper = live(2, 0);
        keeper.stats.saves = 4;
        keeper.stats.clean_sheets = 1;
        map.insert(PlayerId(12), keeper);

        let totals = aggregate_team(&squad(), &map);
        assert_eq!(totals.stats.goals_scored, 1);
        assert_eq!(totals.stats.yellow_cards, 1);
        assert_eq!(totals.stats.saves, 4);
        assert_eq!(totals.stats.clean_sheets, 1);
    }

    #[test]
    fn test_triple_captain_and_chip_passthrough() {
        let mut s = squad();
        s.picks[0].multiplier = 3;
        s.active_chip = Some("3xc".to_string());

        let mut map = HashMap::new();
        map.insert(PlayerId(1), live(5, 0));

        let totals = aggregate_team(&s, &map);
        assert_eq!(totals.active_points_final, 15);
        assert_eq!(totals.active_chip.as_deref(), Some("3xc"));
    }

    #[test]
    fn test_aggregation_is_pure() {
        let mut map = HashMap::new();
        for player in 1..=15 {
            map.insert(PlayerId(player), live(player as i32, 1));
        }
        assert_eq!(aggregate_team(&squad(), &map), aggregate_team(&squad(), &map));
    }

    fn snapshot(bonus_added: bool) -> GameweekSnapshot {
        let mut star = StatSnapshot::new(PlayerId(1), TeamId(1), FixtureId(10), Position::Forward);
        star.goals_scored = 2;
        star.minutes = 90;
        let mut keeper = StatSnapshot::new(PlayerId(2), TeamId(2), FixtureId(10), Position::Goalkeeper);
        keeper.saves = 3;
        keeper.minutes = 90;
        let mut sub = StatSnapshot::new(PlayerId(3), TeamId(1), FixtureId(10), Position::Midfielder);
        sub.minutes = 10;

        GameweekSnapshot {
            gameweek: 4,
            event_count: 12,
            bonus_added,
            as_of: Utc::now(),
            fixtures: vec![Fixture {
                id: FixtureId(10),
                home_team_id: TeamId(1),
                away_team_id: TeamId(2),
                started: true,
                finished: bonus_added,
            }],
            stats: vec![star, keeper, sub],
            points: vec![
                ProviderPoints {
                    player_id: PlayerId(1),
                    total_points: if bonus_added { 13 } else { 10 },
                    bonus: if bonus_added { 3 } else { 0 },
                },
                ProviderPoints {
                    player_id: PlayerId(2),
                    total_points: 3,
                    bonus: 0,
                },
                ProviderPoints {
                    player_id: PlayerId(3),
                    total_points: 1,
                    bonus: 0,
                },
            ],
        }
    }

    #[test]
    fn test_build_player_live_adds_provisional_bonus() {
        let snap = snapshot(false);
        let result = rank_match(&snap.fixtures[0], &snap.stats_for(FixtureId(10)), snap.as_of);
        let live = build_player_live(&snap, &[result]);

        // star 54 BPS, keeper 12, sub 0.
        let star = live[&PlayerId(1)];
        assert_eq!(star.total_points, 13);
        assert_eq!(star.bonus, 3);
        assert!(star.bonus_provisional);
        assert_eq!(star.stats.goals_scored, 2);

        assert_eq!(live[&PlayerId(2)].total_points, 5);
        assert_eq!(live[&PlayerId(3)].total_points, 1);
        assert_eq!(live[&PlayerId(3)].bonus, 0);
    }

    #[test]
    fn test_build_player_live_uses_official_bonus_once_added() {
        let snap = snapshot(true);
        let result = rank_match(&snap.fixtures[0], &snap.stats_for(FixtureId(10)), snap.as_of);
        let live = build_player_live(&snap, &[result]);

        let star = live[&PlayerId(1)];
        assert_eq!(star.total_points, 13);
        assert_eq!(star.bonus, 3);
        assert!(!star.bonus_provisional);
        assert_eq!(live[&PlayerId(2)].total_points, 3);
    }

    #[test]
    fn test_build_player_live_sums_double_gameweek() {
        let mut snap = snapshot(false);
        let mut second = StatSnapshot::new(PlayerId(1), TeamId(1), FixtureId(11), Position::Forward);
        second.goals_scored = 1;
        snap.stats.push(second);
        snap.points.push(ProviderPoints {
            player_id: PlayerId(1),
            total_points: 4,
            bonus: 0,
        });

        let live = build_player_live(&snap, &[]);
        assert_eq!(live[&PlayerId(1)].stats.goals_scored, 3);
        assert_eq!(live[&PlayerId(1)].total_points, 14);
    }
}
