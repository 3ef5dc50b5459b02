use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use strum::{Display, EnumString};

use crate::database::models::{Match, Player};

/// Number of rows shown on a leaderboard.
pub const LEADERBOARD_SIZE: usize = 10;

/// A player's aggregated results.
///
/// Set columns count set-equivalent points: the winner of a match is credited `sets_needed`
/// points and the loser one point for each set they took, which in a best of three means 2 for
/// winning and 1 for losing the deciding game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Record {
    pub match_wins: i64,
    pub match_losses: i64,
    pub set_wins: i64,
    pub set_losses: i64,
    /// Raw sets played, used as the winrate denominator.
    pub sets_played: i64,
}

impl Record {
    pub fn set_difference(&self) -> i64 {
        self.set_wins - self.set_losses
    }

    pub fn matches_played(&self) -> i64 {
        self.match_wins + self.match_losses
    }
}

/// Points credited to the winner and loser of a completed match.
///
/// Returns `None` for matches without a result and for byes.
pub fn set_points(game: &Match) -> Option<(i64, i64)> {
    game.winner.as_ref()?;
    game.player_2.as_ref()?;

    let loser_points = (game.sets - game.sets_needed).clamp(0, (game.sets_needed - 1).max(0));
    Some((game.sets_needed, loser_points))
}

/// Aggregates per-player records over a set of matches.
///
/// Every player appearing in a match gets a record, even if none of their matches are complete.
/// The result does not depend on the order of `matches`.
pub fn gather_scores<'a>(matches: impl IntoIterator<Item = &'a Match>) -> BTreeMap<String, Record> {
    let mut records: BTreeMap<String, Record> = BTreeMap::new();

    for game in matches {
        records.entry(game.player_1.clone()).or_default();
        if let Some(player_2) = &game.player_2 {
            records.entry(player_2.clone()).or_default();
        }

        let (Some(winner), Some(loser), Some((winner_points, loser_points))) =
            (game.winner.as_deref(), game.loser(), set_points(game))
        else {
            continue;
        };

        if let Some(record) = records.get_mut(winner) {
            record.match_wins += 1;
            record.set_wins += winner_points;
            record.set_losses += loser_points;
            record.sets_played += game.sets;
        }
        if let Some(record) = records.get_mut(loser) {
            record.match_losses += 1;
            record.set_wins += loser_points;
            record.set_losses += winner_points;
            record.sets_played += game.sets;
        }
    }

    records
}

/// A player's row in their group's standings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub user_id: String,
    pub name: String,
    pub order_idx: i64,
    pub record: Record,
}

/// Standings of one group for one season.
///
/// Ranked by match wins, then set-point difference, then seed and name.
/// Returns `None` if the group has no matches in `matches`.
pub fn group_standings(
    matches: &[Match],
    players: &[Player],
    grouping: &str,
) -> Option<Vec<Standing>> {
    let group_matches: Vec<&Match> = matches
        .iter()
        .filter(|game| game.grouping.eq_ignore_ascii_case(grouping))
        .collect();
    if group_matches.is_empty() {
        return None;
    }

    let players: HashMap<&str, &Player> = players
        .iter()
        .map(|player| (player.user_id.as_str(), player))
        .collect();

    let mut standings: Vec<Standing> = gather_scores(group_matches)
        .into_iter()
        .map(|(user_id, record)| {
            let player = players.get(user_id.as_str());
            Standing {
                name: player
                    .map(|player| player.name.clone())
                    .unwrap_or_else(|| user_id.clone()),
                order_idx: player.map(|player| player.order_idx).unwrap_or(i64::MAX),
                user_id,
                record,
            }
        })
        .collect();

    standings.sort_by(|a, b| {
        b.record
            .match_wins
            .cmp(&a.record.match_wins)
            .then_with(|| b.record.set_difference().cmp(&a.record.set_difference()))
            .then_with(|| a.order_idx.cmp(&b.order_idx))
            .then_with(|| a.name.cmp(&b.name))
    });

    Some(standings)
}

/// How a leaderboard is ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LeaderboardSort {
    Matches,
    Sets,
    #[default]
    Winrate,
}

/// A player's row on the leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub record: Record,
    pub winrate: f64,
}

impl LeaderboardEntry {
    pub fn games_won(&self) -> i64 {
        self.record.set_wins
    }

    pub fn games_lost(&self) -> i64 {
        self.record.sets_played - self.record.set_wins
    }
}

/// `games_won / games_total` as a percentage rounded to two decimals.
///
/// Returns `None` when no games were played.
pub fn winrate(games_won: i64, games_total: i64) -> Option<f64> {
    if games_total <= 0 {
        return None;
    }
    let rate = games_won as f64 / games_total as f64 * 100.0;
    Some((rate * 100.0).round() / 100.0)
}

/// Builds the leaderboard over every match given, across seasons.
///
/// Players without a completed match have no winrate and are left off the board.
/// `ascending` turns the board into a loserboard.
pub fn leaderboard(
    matches: &[Match],
    players: &[Player],
    sort: LeaderboardSort,
    ascending: bool,
) -> Vec<LeaderboardEntry> {
    let records = gather_scores(matches);

    let mut entries: Vec<LeaderboardEntry> = players
        .iter()
        .filter_map(|player| {
            let record = *records.get(&player.user_id)?;
            Some(LeaderboardEntry {
                user_id: player.user_id.clone(),
                name: player.name.clone(),
                winrate: winrate(record.set_wins, record.sets_played)?,
                record,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        let primary = match sort {
            LeaderboardSort::Matches => a.record.match_wins.cmp(&b.record.match_wins),
            LeaderboardSort::Sets => a.record.set_wins.cmp(&b.record.set_wins),
            LeaderboardSort::Winrate => Ordering::Equal,
        };
        let ordered = primary
            .then_with(|| a.winrate.total_cmp(&b.winrate))
            .then_with(|| a.record.set_wins.cmp(&b.record.set_wins));
        let ordered = if ascending { ordered } else { ordered.reverse() };
        ordered.then_with(|| a.name.cmp(&b.name))
    });

    entries.truncate(LEADERBOARD_SIZE);
    entries
}

/// A single player's record over every match given.
pub fn player_record(matches: &[Match], user_id: &str) -> Record {
    gather_scores(matches.iter().filter(|game| game.involves(user_id)))
        .remove(user_id)
        .unwrap_or_default()
}
