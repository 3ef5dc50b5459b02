use std::{collections::HashSet, str::FromStr};

use chrono::{Local, NaiveDate};
use poise::{serenity_prelude as serenity, CreateReply};
use prettytable::{format, row, Table};
use strum::IntoEnumIterator;
use tracing::{info, instrument, warn};

use crate::{
    bot::transport::{ChatTransport, DiscordTransport},
    commands::{checks::is_commissioner, parser::mentions},
    config::{parse_sets_needed, sets_needed_is_valid, ConfigKey, DEFAULT_SETS_NEEDED},
    database::{
        models::{Match, NewMatch, Player},
        ConfigDatabase, MatchDatabase, PlayerDatabase,
    },
    league::{
        commit_score, commit_score_by_names, render::code_block, sets_in_range, CommitOutcome,
        ReportedScore,
    },
    utils::error::{CommonError, StoreError},
    BotContext, BotData, BotError,
};

use super::CommandsContainer;

/// How many journal entries `/journal` shows.
const JOURNAL_PAGE: usize = 20;

/// CommandsContainer for the commissioner commands.
pub struct CommissionerCommands;

impl CommandsContainer for CommissionerCommands {
    type Data = BotData;
    type Error = BotError;

    fn get_all() -> Vec<poise::Command<Self::Data, Self::Error>> {
        vec![
            register(),
            set_group(),
            seed_group(),
            set_order(),
            set_active(),
            schedule(),
            correct_match(),
            record_score(),
            record_score_by_name(),
            clear_season(),
            seasons(),
            week(),
            notify_week(),
            set_config(),
            journal(),
        ]
    }
}

async fn reply(ctx: BotContext<'_>, content: impl Into<String>) -> Result<(), BotError> {
    ctx.send(CreateReply::default().content(content).ephemeral(true))
        .await?;
    Ok(())
}

fn display_name(user: &serenity::User) -> String {
    user.global_name.clone().unwrap_or_else(|| user.name.clone())
}

/// Parses a `YYYY-MM-DD` date.
fn parse_date(date: &str) -> Result<NaiveDate, BotError> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("{} is not a YYYY-MM-DD date: {}", date, e))
}

fn player_name<'a>(players: &'a [Player], user_id: &'a str) -> &'a str {
    players
        .iter()
        .find(|player| player.user_id == user_id)
        .map(|player| player.name.as_str())
        .unwrap_or(user_id)
}

fn describe_outcome(outcome: &CommitOutcome) -> String {
    match outcome {
        CommitOutcome::Recorded(game) => format!(
            "Recorded match {}: <@{}> won in {} sets.",
            game.id,
            game.winner.as_deref().unwrap_or_default(),
            game.sets
        ),
        CommitOutcome::UnknownPlayer(player) => format!("{} is not registered.", player),
        CommitOutcome::NoOpenMatch => {
            "There is no open match between these players this season.".to_string()
        }
        CommitOutcome::SetsOutOfRange { sets, min, max } => format!(
            "{} sets is not possible, it must be between {} and {}.",
            sets, min, max
        ),
        CommitOutcome::IllegalScore {
            winner_games,
            loser_games,
            sets_needed,
        } => format!(
            "{}-{} does not finish a first to {} match.",
            winner_games, loser_games, sets_needed
        ),
    }
}

/// Applies a commissioner's correction to a match.
///
/// Clearing the winner reopens the match, which resets its sets and play date.
fn corrected(
    mut game: Match,
    winner: Option<String>,
    sets: Option<i64>,
    date_played: Option<NaiveDate>,
) -> Result<Match, String> {
    match winner {
        Some(winner) => {
            if !game.involves(&winner) || game.is_bye() {
                return Err(format!("<@{}> is not playing in match {}.", winner, game.id));
            }
            let sets = sets.unwrap_or(game.sets);
            if !sets_in_range(sets, game.sets_needed) {
                return Err(format!(
                    "{} sets is not possible, it must be between {} and {}.",
                    sets,
                    game.sets_needed,
                    game.max_sets()
                ));
            }
            game.date_played = date_played
                .or(game.date_played)
                .or_else(|| Some(Local::now().date_naive()));
            game.winner = Some(winner);
            game.sets = sets;
        }
        None => {
            game.winner = None;
            game.sets = 0;
            game.date_played = None;
        }
    }
    Ok(game)
}

fn week_table(matches: &[Match], players: &[Player]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.set_titles(row!["Id", "Group", "Player 1", "Player 2", "Result"]);

    for game in matches {
        let player_2 = game
            .player_2
            .as_deref()
            .map(|id| player_name(players, id))
            .unwrap_or("(bye)");
        let result = match game.winner.as_deref() {
            Some(winner) => format!("{} in {}", player_name(players, winner), game.sets),
            None => "-".to_string(),
        };
        table.add_row(row![
            game.id,
            game.grouping.to_uppercase(),
            player_name(players, &game.player_1),
            player_2,
            result
        ]);
    }
    table
}

fn match_notice(game: &Match, opponent: &str) -> String {
    format!(
        "Your group {} match for the week of {} is against <@{}>. First to {} sets wins, good luck!",
        game.grouping.to_uppercase(),
        game.week.format("%Y-%m-%d"),
        opponent,
        game.sets_needed
    )
}

/// Register a player in the league.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn register(
    ctx: BotContext<'_>,
    #[description = "The player to register"] user: serenity::User,
    #[description = "The player's group"] grouping: String,
    #[description = "Name shown in standings. Default: their Discord name"] name: Option<String>,
) -> Result<(), BotError> {
    let data = ctx.data();
    let name = name.unwrap_or_else(|| display_name(&user));

    match data
        .database
        .add_player(&data.league, &user.id.to_string(), &name, &grouping)
        .await
    {
        Ok(player) => {
            info!("Registered {} in group {}", player.name, player.grouping);
            reply(
                ctx,
                format!(
                    "Registered {} in group {}.",
                    player.name,
                    player.grouping.to_uppercase()
                ),
            )
            .await
        }
        Err(StoreError::DuplicatePlayer(_)) => {
            reply(ctx, format!("{} is already registered.", name)).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Move a player to another group.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn set_group(
    ctx: BotContext<'_>,
    #[description = "The player to move"] user: serenity::User,
    #[description = "The new group"] grouping: String,
) -> Result<(), BotError> {
    let data = ctx.data();
    if !data
        .database
        .update_grouping(&data.league, &user.id.to_string(), &grouping)
        .await?
    {
        return Err(CommonError::UserNotExists(user.id.to_string()).into());
    }
    reply(
        ctx,
        format!("Moved <@{}> to group {}.", user.id, grouping.to_uppercase()),
    )
    .await
}

/// Fill a group with players, seeded in the order they are mentioned.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn seed_group(
    ctx: BotContext<'_>,
    #[description = "The group to fill"] grouping: String,
    #[description = "Players in seed order, e.g. @first @second @third"] players: String,
) -> Result<(), BotError> {
    let data = ctx.data();
    let user_ids = mentions(&players);
    if user_ids.is_empty() {
        return reply(ctx, "Mention the players to seed, in order.").await;
    }

    for user_id in &user_ids {
        if data
            .database
            .get_player_by_id(&data.league, user_id)
            .await?
            .is_none()
        {
            return Err(CommonError::UserNotExists(user_id.clone()).into());
        }
    }

    data.database
        .update_grouping_and_orders(&data.league, &user_ids, &grouping)
        .await?;
    reply(
        ctx,
        format!(
            "Seeded {} players into group {}.",
            user_ids.len(),
            grouping.to_uppercase()
        ),
    )
    .await
}

/// Change a player's seed within their group.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn set_order(
    ctx: BotContext<'_>,
    #[description = "The player to reseed"] user: serenity::User,
    #[description = "Seed position, lower is better"] order_idx: i64,
) -> Result<(), BotError> {
    let data = ctx.data();
    if !data
        .database
        .update_player_order_idx(&data.league, &user.id.to_string(), order_idx)
        .await?
    {
        return Err(CommonError::UserNotExists(user.id.to_string()).into());
    }
    reply(ctx, format!("<@{}> is now seeded {}.", user.id, order_idx)).await
}

/// Activate or deactivate a player.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn set_active(
    ctx: BotContext<'_>,
    #[description = "The player"] user: serenity::User,
    #[description = "Whether the player takes part in new seasons"] active: bool,
) -> Result<(), BotError> {
    let data = ctx.data();
    if !data
        .database
        .set_active(&data.league, &user.id.to_string(), active)
        .await?
    {
        return Err(CommonError::UserNotExists(user.id.to_string()).into());
    }
    let state = if active { "active" } else { "inactive" };
    reply(ctx, format!("<@{}> is now {}.", user.id, state)).await
}

/// Schedule a match. Leave out the second player to schedule a bye.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn schedule(
    ctx: BotContext<'_>,
    #[description = "First player"] player_1: serenity::User,
    #[description = "Week of the match, as YYYY-MM-DD"] week: String,
    #[description = "Group the match counts towards"] grouping: String,
    #[description = "Second player. Leave empty for a bye"] player_2: Option<serenity::User>,
    #[description = "Season. Default: the current season"] season: Option<i64>,
    #[description = "Sets needed to win. Default: the league's SETS_NEEDED"] sets_needed: Option<
        i64,
    >,
) -> Result<(), BotError> {
    let data = ctx.data();
    let week = parse_date(&week)?;
    let season = match season {
        Some(season) => season,
        None => data.database.get_current_season(&data.league).await?.max(1),
    };
    let sets_needed = match sets_needed {
        Some(sets_needed) if sets_needed_is_valid(sets_needed) => sets_needed,
        Some(sets_needed) => {
            return reply(ctx, format!("{} is not a valid number of sets.", sets_needed)).await
        }
        None => match data
            .database
            .get_config(&data.league, ConfigKey::SetsNeeded)
            .await?
        {
            Some(value) => parse_sets_needed(&value)?,
            None => DEFAULT_SETS_NEEDED,
        },
    };

    let new_match = NewMatch {
        player_1: player_1.id.to_string(),
        player_2: player_2.as_ref().map(|user| user.id.to_string()),
        week,
        grouping,
        season,
        sets_needed,
    };
    let match_id = data.database.add_match(&data.league, &new_match).await?;

    let opponent = player_2
        .map(|user| format!("<@{}>", user.id))
        .unwrap_or_else(|| "a bye".to_string());
    reply(
        ctx,
        format!(
            "Scheduled match {}: <@{}> vs {} in group {}, week of {}, season {}.",
            match_id,
            player_1.id,
            opponent,
            new_match.grouping.to_uppercase(),
            week,
            season
        ),
    )
    .await
}

/// Fix the result of a match. Leave out the winner to reopen it.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn correct_match(
    ctx: BotContext<'_>,
    #[description = "Id of the match"] match_id: i64,
    #[description = "The winner. Leave empty to reopen the match"] winner: Option<serenity::User>,
    #[description = "Sets played"] sets: Option<i64>,
    #[description = "Date played, as YYYY-MM-DD"] date_played: Option<String>,
) -> Result<(), BotError> {
    let data = ctx.data();
    let game = data
        .database
        .get_match_by_id(&data.league, match_id)
        .await?
        .ok_or(CommonError::MatchNotExists(match_id))?;
    let date_played = date_played.as_deref().map(parse_date).transpose()?;

    let updated = match corrected(
        game,
        winner.map(|user| user.id.to_string()),
        sets,
        date_played,
    ) {
        Ok(updated) => updated,
        Err(reason) => return reply(ctx, reason).await,
    };

    data.database
        .admin_update_match(&data.league, &updated)
        .await?;
    info!("Corrected match {}: {:?}", match_id, updated);
    reply(ctx, format!("Updated match {}.", match_id)).await
}

/// Enter a score on behalf of two players.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn record_score(
    ctx: BotContext<'_>,
    #[description = "The winner"] winner: serenity::User,
    #[description = "The loser"] loser: serenity::User,
    #[description = "Sets played"] sets: i64,
    #[description = "Date played, as YYYY-MM-DD. Default: today"] date_played: Option<String>,
) -> Result<(), BotError> {
    let data = ctx.data();
    let date_played = match date_played {
        Some(date) => parse_date(&date)?,
        None => Local::now().date_naive(),
    };

    let outcome = commit_score(
        &*data.database,
        &data.league,
        &winner.id.to_string(),
        &loser.id.to_string(),
        ReportedScore::Sets(sets),
        date_played,
    )
    .await?;
    reply(ctx, describe_outcome(&outcome)).await
}

/// Enter a score using the players' registered names.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn record_score_by_name(
    ctx: BotContext<'_>,
    #[description = "The winner's name"] winner: String,
    #[description = "The loser's name"] loser: String,
    #[description = "Sets played"] sets: i64,
    #[description = "Date played, as YYYY-MM-DD. Default: today"] date_played: Option<String>,
) -> Result<(), BotError> {
    let data = ctx.data();
    let date_played = match date_played {
        Some(date) => parse_date(&date)?,
        None => Local::now().date_naive(),
    };

    let outcome = commit_score_by_names(
        &*data.database,
        &data.league,
        &winner,
        &loser,
        ReportedScore::Sets(sets),
        date_played,
    )
    .await?;
    reply(ctx, describe_outcome(&outcome)).await
}

/// Delete every match of a season.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn clear_season(
    ctx: BotContext<'_>,
    #[description = "The season to clear"] season: i64,
    #[description = "Set to true to really delete the matches"] confirm: bool,
) -> Result<(), BotError> {
    if !confirm {
        return reply(
            ctx,
            format!("Nothing was deleted. Run again with confirm set to clear season {}.", season),
        )
        .await;
    }

    let data = ctx.data();
    let removed = data
        .database
        .clear_matches_for_season(&data.league, season)
        .await?;
    warn!("Cleared {} matches from season {}", removed, season);
    reply(ctx, format!("Removed {} matches from season {}.", removed, season)).await
}

/// List the seasons that have matches.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn seasons(ctx: BotContext<'_>) -> Result<(), BotError> {
    let data = ctx.data();
    let seasons = data.database.get_all_seasons(&data.league).await?;
    if seasons.is_empty() {
        return reply(ctx, "No matches have been scheduled yet.").await;
    }

    let current = data.database.get_current_season(&data.league).await?;
    let listed = seasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    reply(
        ctx,
        format!("Seasons: {}. The current season is {}.", listed, current),
    )
    .await
}

/// Show the matches scheduled for a week.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn week(
    ctx: BotContext<'_>,
    #[description = "Week of the matches, as YYYY-MM-DD"] week: String,
) -> Result<(), BotError> {
    let data = ctx.data();
    let week = parse_date(&week)?;
    let matches = data
        .database
        .get_matches_for_week(&data.league, week)
        .await?;
    if matches.is_empty() {
        return reply(ctx, format!("No matches are scheduled for the week of {}.", week)).await;
    }

    let players = data.database.get_players(&data.league).await?;
    reply(
        ctx,
        format!(
            "Week of {}:\n{}",
            week,
            code_block(&week_table(&matches, &players))
        ),
    )
    .await
}

/// Message every player their opponent for a week.
///
/// Matches that were already announced or involve an inactive player are skipped.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn notify_week(
    ctx: BotContext<'_>,
    #[description = "Week of the matches, as YYYY-MM-DD"] week: String,
) -> Result<(), BotError> {
    ctx.defer_ephemeral().await?;
    let data = ctx.data();
    let week = parse_date(&week)?;
    let transport = DiscordTransport::from_http(ctx.serenity_context().http.clone());
    let active: HashSet<String> = data
        .database
        .get_active_players(&data.league)
        .await?
        .into_iter()
        .map(|player| player.user_id)
        .collect();

    let mut notified = 0;
    for game in data
        .database
        .get_matches_for_week(&data.league, week)
        .await?
    {
        let Some(player_2) = game.player_2.as_deref() else {
            continue;
        };
        if game.message_sent || game.is_complete() {
            continue;
        }
        if !active.contains(&game.player_1) || !active.contains(player_2) {
            info!("Not announcing match {} with an inactive player", game.id);
            continue;
        }

        transport
            .send_direct_message(&game.player_1, &match_notice(&game, player_2))
            .await?;
        transport
            .send_direct_message(player_2, &match_notice(&game, &game.player_1))
            .await?;
        data.database
            .set_message_sent(&data.league, game.id, true)
            .await?;
        notified += 1;
    }

    reply(
        ctx,
        format!("Sent notices for {} matches in the week of {}.", notified, week),
    )
    .await
}

/// Change a league setting.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn set_config(
    ctx: BotContext<'_>,
    #[description = "Setting name, e.g. COMPETITION_CHANNEL_ID"] key: String,
    #[description = "New value"] value: String,
) -> Result<(), BotError> {
    let Ok(key) = ConfigKey::from_str(key.trim()) else {
        let settable = ConfigKey::iter()
            .filter(ConfigKey::is_settable)
            .map(|key| key.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return reply(ctx, format!("{} is not a setting. Try one of {}.", key, settable)).await;
    };
    if !key.is_settable() {
        return reply(ctx, format!("{} cannot be changed.", key)).await;
    }

    let value = key.validate(&value)?;
    let data = ctx.data();
    data.database
        .set_config(&data.league, key, &value)
        .await?;
    info!("Set {} to {}", key, value);
    reply(ctx, format!("{} is now `{}`.", key, value)).await
}

/// Show the statements recently executed against the league.
#[poise::command(slash_command, guild_only, check = "is_commissioner")]
#[instrument]
async fn journal(
    ctx: BotContext<'_>,
    #[description = "Clear the journal after showing it"] clear: Option<bool>,
) -> Result<(), BotError> {
    let data = ctx.data();
    let entries = data.database.journal(&data.league);
    if entries.is_empty() {
        return reply(ctx, "The journal is empty.").await;
    }

    let shown = entries[entries.len().saturating_sub(JOURNAL_PAGE)..]
        .iter()
        .map(|entry| {
            format!(
                "{} {}",
                entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                entry.statement
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    if clear.unwrap_or(false) {
        data.database.clear_journal(&data.league);
    }
    reply(
        ctx,
        format!(
            "Last {} of {} statements:\n```\n{}\n```",
            entries.len().min(JOURNAL_PAGE),
            entries.len(),
            shown
        ),
    )
    .await
}
