use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::{
    database::{models::Match, MatchDatabase, PlayerDatabase},
    utils::error::StoreError,
};

/// Text rendering of standings and leaderboards.
pub mod render;
/// Standings and leaderboard aggregation over matches.
pub mod standings;

/// The result of trying to commit a reported score.
///
/// Everything except `Recorded` is a validation failure and leaves the store untouched.
#[derive(Debug, Clone, PartialEq, Eq, strum::EnumIs)]
pub enum CommitOutcome {
    Recorded(Match),
    UnknownPlayer(String),
    /// The pair has no match this season, or it already has a winner.
    NoOpenMatch,
    SetsOutOfRange { sets: i64, min: i64, max: i64 },
    /// The reported games are not a finished result for the match's length.
    IllegalScore {
        winner_games: i64,
        loser_games: i64,
        sets_needed: i64,
    },
}

/// A result as it was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedScore {
    /// The total number of sets played, as the commissioner enters it.
    Sets(i64),
    /// The games each side took, as players report it in chat.
    Games { winner: i64, loser: i64 },
}

/// The legal number of sets played for a match won with `sets_needed` sets.
pub fn sets_range(sets_needed: i64) -> (i64, i64) {
    (sets_needed, sets_needed * 2 - 1)
}

pub fn sets_in_range(sets: i64, sets_needed: i64) -> bool {
    let (min, max) = sets_range(sets_needed);
    (min..=max).contains(&sets)
}

/// Commits a score reported with Discord ids.
#[instrument(skip(database))]
pub async fn commit_score<DB>(
    database: &DB,
    league: &str,
    winner_id: &str,
    loser_id: &str,
    score: ReportedScore,
    date_played: NaiveDate,
) -> Result<CommitOutcome, StoreError>
where
    DB: PlayerDatabase + MatchDatabase,
{
    let Some(winner) = database.get_player_by_id(league, winner_id).await? else {
        return Ok(CommitOutcome::UnknownPlayer(winner_id.to_string()));
    };
    let Some(loser) = database.get_player_by_id(league, loser_id).await? else {
        return Ok(CommitOutcome::UnknownPlayer(loser_id.to_string()));
    };

    commit_resolved(database, league, &winner.user_id, &loser.user_id, score, date_played).await
}

/// Commits a score reported with player names, as the commissioner tooling does.
#[instrument(skip(database))]
pub async fn commit_score_by_names<DB>(
    database: &DB,
    league: &str,
    winner_name: &str,
    loser_name: &str,
    score: ReportedScore,
    date_played: NaiveDate,
) -> Result<CommitOutcome, StoreError>
where
    DB: PlayerDatabase + MatchDatabase,
{
    let Some(winner) = database.get_player_by_name(league, winner_name).await? else {
        return Ok(CommitOutcome::UnknownPlayer(winner_name.to_string()));
    };
    let Some(loser) = database.get_player_by_name(league, loser_name).await? else {
        return Ok(CommitOutcome::UnknownPlayer(loser_name.to_string()));
    };

    commit_resolved(database, league, &winner.user_id, &loser.user_id, score, date_played).await
}

async fn commit_resolved<DB>(
    database: &DB,
    league: &str,
    winner_id: &str,
    loser_id: &str,
    score: ReportedScore,
    date_played: NaiveDate,
) -> Result<CommitOutcome, StoreError>
where
    DB: PlayerDatabase + MatchDatabase,
{
    let open_match = database
        .get_match_by_players(league, winner_id, loser_id)
        .await?
        .filter(|game| !game.is_complete());
    let Some(open_match) = open_match else {
        info!("No open match between {} and {}", winner_id, loser_id);
        return Ok(CommitOutcome::NoOpenMatch);
    };

    let sets_needed = open_match.sets_needed;
    let sets = match score {
        ReportedScore::Sets(sets) => sets,
        ReportedScore::Games { winner, loser } => {
            if winner != sets_needed || !(0..sets_needed).contains(&loser) {
                info!("{}-{} does not finish a match won with {} sets", winner, loser, sets_needed);
                return Ok(CommitOutcome::IllegalScore {
                    winner_games: winner,
                    loser_games: loser,
                    sets_needed,
                });
            }
            winner + loser
        }
    };

    if !sets_in_range(sets, sets_needed) {
        let (min, max) = sets_range(sets_needed);
        info!("Sets out of range, was {}, but must be between {} and {}", sets, min, max);
        return Ok(CommitOutcome::SetsOutOfRange { sets, min, max });
    }

    if !database
        .record_result(league, open_match.id, winner_id, sets, date_played)
        .await?
    {
        return Ok(CommitOutcome::NoOpenMatch);
    }

    match database.get_match_by_id(league, open_match.id).await? {
        Some(recorded) => Ok(CommitOutcome::Recorded(recorded)),
        None => Ok(CommitOutcome::NoOpenMatch),
    }
}
