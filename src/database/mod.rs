use std::{collections::HashMap, path::PathBuf, str::FromStr};

use chrono::NaiveDate;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{config::ConfigKey, utils::error::StoreError};

use self::{
    journal::Journal,
    models::{JournalEntry, Match, NewMatch, Player},
};

/// Append-only log of executed statements.
pub mod journal;
/// Rows of the league store: players, matches and journal entries.
pub mod models;

/// Schema version written to a league's config table when its store is created.
pub const LATEST_VERSION: i64 = 1;

const MATCH_COLUMNS: &str = "rowid AS id, player_1, player_2, winner, week, grouping, season, \
     sets, sets_needed, date_played, message_sent";

const PLAYER_COLUMNS: &str = "user_id, name, grouping, active, order_idx";

/// Per-league key/value settings.
#[allow(async_fn_in_trait)]
pub trait ConfigDatabase {
    /// Sets a config value, replacing any previous value.
    async fn set_config(&self, league: &str, key: ConfigKey, value: &str)
        -> Result<(), StoreError>;

    /// Retrieves a single config value.
    async fn get_config(&self, league: &str, key: ConfigKey) -> Result<Option<String>, StoreError>;

    /// Retrieves every config value of a league, keyed by name.
    async fn get_all_config(&self, league: &str) -> Result<HashMap<String, String>, StoreError>;
}

/// Registered players of a league.
#[allow(async_fn_in_trait)]
pub trait PlayerDatabase {
    /// Registers an active player. Player ids are unique within a league.
    async fn add_player(
        &self,
        league: &str,
        user_id: &str,
        name: &str,
        grouping: &str,
    ) -> Result<Player, StoreError>;

    /// Retrieves all players, ordered by group and seed.
    async fn get_players(&self, league: &str) -> Result<Vec<Player>, StoreError>;

    async fn get_active_players(&self, league: &str) -> Result<Vec<Player>, StoreError>;

    async fn get_player_by_name(&self, league: &str, name: &str)
        -> Result<Option<Player>, StoreError>;

    async fn get_player_by_id(&self, league: &str, user_id: &str)
        -> Result<Option<Player>, StoreError>;

    /// Moves a player to another group. Returns false if the player does not exist.
    async fn update_grouping(
        &self,
        league: &str,
        user_id: &str,
        grouping: &str,
    ) -> Result<bool, StoreError>;

    /// Puts the given players into a group, seeded in the given order, and marks them active.
    async fn update_grouping_and_orders(
        &self,
        league: &str,
        user_ids: &[String],
        grouping: &str,
    ) -> Result<(), StoreError>;

    async fn update_player_order_idx(
        &self,
        league: &str,
        user_id: &str,
        order_idx: i64,
    ) -> Result<bool, StoreError>;

    async fn set_active(&self, league: &str, user_id: &str, active: bool)
        -> Result<bool, StoreError>;
}

/// Scheduled and completed matches of a league.
#[allow(async_fn_in_trait)]
pub trait MatchDatabase {
    /// Schedules a match and returns its id.
    ///
    /// Fails if the players are the same, either player is unknown, or the pair already has a
    /// match in the same season.
    async fn add_match(&self, league: &str, new_match: &NewMatch) -> Result<i64, StoreError>;

    async fn get_matches(&self, league: &str) -> Result<Vec<Match>, StoreError>;

    async fn get_matches_for_season(&self, league: &str, season: i64)
        -> Result<Vec<Match>, StoreError>;

    async fn get_matches_for_week(&self, league: &str, week: NaiveDate)
        -> Result<Vec<Match>, StoreError>;

    async fn get_match_by_id(&self, league: &str, match_id: i64)
        -> Result<Option<Match>, StoreError>;

    /// Retrieves the current season's match between two players, in either order.
    async fn get_match_by_players(
        &self,
        league: &str,
        player_a: &str,
        player_b: &str,
    ) -> Result<Option<Match>, StoreError>;

    /// Stores the result of a match that has no winner yet.
    ///
    /// Returns false if the match does not exist or already has a winner.
    async fn record_result(
        &self,
        league: &str,
        match_id: i64,
        winner: &str,
        sets: i64,
        date_played: NaiveDate,
    ) -> Result<bool, StoreError>;

    /// Overwrites every editable field of a match.
    async fn admin_update_match(&self, league: &str, updated: &Match) -> Result<bool, StoreError>;

    async fn set_message_sent(
        &self,
        league: &str,
        match_id: i64,
        message_sent: bool,
    ) -> Result<bool, StoreError>;

    /// Deletes every match of a season and returns how many were removed.
    async fn clear_matches_for_season(&self, league: &str, season: i64) -> Result<u64, StoreError>;

    /// The highest season that has matches, or 0 if there are none.
    async fn get_current_season(&self, league: &str) -> Result<i64, StoreError>;

    async fn get_all_seasons(&self, league: &str) -> Result<Vec<i64>, StoreError>;
}

#[derive(Debug)]
enum Location {
    Directory(PathBuf),
    Memory,
}

/// The SQLite store used by the ladder bot.
///
/// Each league lives in its own `<league>_league.sqlite` file, which is created along with its
/// schema the first time the league is accessed. The store assumes a single writing process.
#[derive(Debug)]
pub struct SqliteDatabase {
    location: Location,
    pools: Mutex<HashMap<String, SqlitePool>>,
    journal: Journal,
}

impl SqliteDatabase {
    /// A store that keeps its league files in `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_location(Location::Directory(directory.into()))
    }

    /// A store whose leagues only live as long as the store does.
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            pools: Mutex::new(HashMap::new()),
            journal: Journal::default(),
        }
    }

    /// The path of a league's database file, if the store is file backed.
    pub fn path(&self, league: &str) -> Option<PathBuf> {
        match &self.location {
            Location::Directory(directory) => {
                Some(directory.join(format!("{}_league.sqlite", league)))
            }
            Location::Memory => None,
        }
    }

    /// Statements executed against a league since the store was opened or the journal cleared.
    pub fn journal(&self, league: &str) -> Vec<JournalEntry> {
        self.journal.entries(league)
    }

    pub fn clear_journal(&self, league: &str) {
        self.journal.clear(league);
    }

    /// Runs a statement outside the store's own queries, for breaking a league on purpose.
    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, league: &str, sql: &str) -> Result<(), StoreError> {
        sqlx::query(sql).execute(&self.pool(league).await?).await?;
        Ok(())
    }

    async fn pool(&self, league: &str) -> Result<SqlitePool, StoreError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(league) {
            return Ok(pool.clone());
        }

        let options = match self.path(league) {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
            None => SqliteConnectOptions::from_str("sqlite::memory:")?,
        };

        // An in-memory database disappears with its connection, so the pool keeps exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options.foreign_keys(true))
            .await?;

        self.initialize(league, &pool).await?;
        info!("Opened the store for league {}", league);

        pools.insert(league.to_string(), pool.clone());
        Ok(pool)
    }

    async fn initialize(&self, league: &str, pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player (
                user_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                grouping TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                order_idx INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS "match" (
                player_1 TEXT NOT NULL REFERENCES player (user_id),
                player_2 TEXT REFERENCES player (user_id),
                winner TEXT REFERENCES player (user_id),
                week DATE NOT NULL,
                grouping TEXT NOT NULL,
                season INTEGER NOT NULL,
                sets INTEGER NOT NULL DEFAULT 0,
                sets_needed INTEGER NOT NULL,
                date_played DATE,
                message_sent INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS config (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        let stamped = sqlx::query(
            r#"
            INSERT INTO config (name, value)
            VALUES ($1, $2)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(ConfigKey::LeagueVersion.as_ref())
        .bind(LATEST_VERSION.to_string())
        .execute(pool)
        .await?;

        if stamped.rows_affected() > 0 {
            info!("Created the store for league {} at version {}", league, LATEST_VERSION);
            self.journal.record(
                league,
                format!("INSERT config {} = {}", ConfigKey::LeagueVersion, LATEST_VERSION),
            );
        }

        Ok(())
    }
}

impl ConfigDatabase for SqliteDatabase {
    async fn set_config(
        &self,
        league: &str,
        key: ConfigKey,
        value: &str,
    ) -> Result<(), StoreError> {
        let pool = self.pool(league).await?;
        sqlx::query(
            r#"
            INSERT INTO config (name, value)
            VALUES ($1, $2)
            ON CONFLICT (name)
            DO UPDATE SET
                value = $2
            "#,
        )
        .bind(key.as_ref())
        .bind(value)
        .execute(&pool)
        .await?;

        self.journal
            .record(league, format!("UPSERT config {} = {:?}", key, value));
        Ok(())
    }

    async fn get_config(&self, league: &str, key: ConfigKey) -> Result<Option<String>, StoreError> {
        let pool = self.pool(league).await?;
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM config WHERE name = $1")
            .bind(key.as_ref())
            .fetch_optional(&pool)
            .await?;

        Ok(value)
    }

    async fn get_all_config(&self, league: &str) -> Result<HashMap<String, String>, StoreError> {
        let pool = self.pool(league).await?;
        let rows = sqlx::query_as::<_, (String, String)>("SELECT name, value FROM config")
            .fetch_all(&pool)
            .await?;

        Ok(rows.into_iter().collect())
    }
}

impl PlayerDatabase for SqliteDatabase {
    async fn add_player(
        &self,
        league: &str,
        user_id: &str,
        name: &str,
        grouping: &str,
    ) -> Result<Player, StoreError> {
        if self.get_player_by_id(league, user_id).await?.is_some() {
            return Err(StoreError::DuplicatePlayer(user_id.to_string()));
        }

        let pool = self.pool(league).await?;
        sqlx::query(
            r#"
            INSERT INTO player (user_id, name, grouping, active)
            VALUES ($1, $2, $3, 1)
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(grouping)
        .execute(&pool)
        .await?;

        self.journal.record(
            league,
            format!(
                "INSERT player {} name={:?} grouping={:?}",
                user_id, name, grouping
            ),
        );

        Ok(Player {
            user_id: user_id.to_string(),
            name: name.to_string(),
            grouping: grouping.to_string(),
            active: true,
            order_idx: 0,
        })
    }

    async fn get_players(&self, league: &str) -> Result<Vec<Player>, StoreError> {
        let pool = self.pool(league).await?;
        let players = sqlx::query_as::<_, Player>(&format!(
            "SELECT {} FROM player ORDER BY grouping, order_idx, name",
            PLAYER_COLUMNS
        ))
        .fetch_all(&pool)
        .await?;

        Ok(players)
    }

    async fn get_active_players(&self, league: &str) -> Result<Vec<Player>, StoreError> {
        Ok(self
            .get_players(league)
            .await?
            .into_iter()
            .filter(|player| player.active)
            .collect())
    }

    async fn get_player_by_name(
        &self,
        league: &str,
        name: &str,
    ) -> Result<Option<Player>, StoreError> {
        let pool = self.pool(league).await?;
        let player = sqlx::query_as::<_, Player>(&format!(
            "SELECT {} FROM player WHERE name = $1",
            PLAYER_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&pool)
        .await?;

        if player.is_none() {
            warn!("Could not find player with name {} in league {}", name, league);
        }
        Ok(player)
    }

    async fn get_player_by_id(
        &self,
        league: &str,
        user_id: &str,
    ) -> Result<Option<Player>, StoreError> {
        let pool = self.pool(league).await?;
        let player = sqlx::query_as::<_, Player>(&format!(
            "SELECT {} FROM player WHERE user_id = $1",
            PLAYER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&pool)
        .await?;

        Ok(player)
    }

    async fn update_grouping(
        &self,
        league: &str,
        user_id: &str,
        grouping: &str,
    ) -> Result<bool, StoreError> {
        let pool = self.pool(league).await?;
        let result = sqlx::query("UPDATE player SET grouping = $1 WHERE user_id = $2")
            .bind(grouping)
            .bind(user_id)
            .execute(&pool)
            .await?;

        self.journal.record(
            league,
            format!("UPDATE player {} grouping={:?}", user_id, grouping),
        );
        Ok(result.rows_affected() > 0)
    }

    async fn update_grouping_and_orders(
        &self,
        league: &str,
        user_ids: &[String],
        grouping: &str,
    ) -> Result<(), StoreError> {
        let pool = self.pool(league).await?;
        let mut transaction = pool.begin().await?;

        for (order_idx, user_id) in user_ids.iter().enumerate() {
            sqlx::query(
                r#"
                UPDATE player
                SET grouping = $1, order_idx = $2, active = 1
                WHERE user_id = $3
                "#,
            )
            .bind(grouping)
            .bind(order_idx as i64)
            .bind(user_id)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;

        for (order_idx, user_id) in user_ids.iter().enumerate() {
            self.journal.record(
                league,
                format!(
                    "UPDATE player {} grouping={:?} order_idx={} active=1",
                    user_id, grouping, order_idx
                ),
            );
        }
        Ok(())
    }

    async fn update_player_order_idx(
        &self,
        league: &str,
        user_id: &str,
        order_idx: i64,
    ) -> Result<bool, StoreError> {
        let pool = self.pool(league).await?;
        let result = sqlx::query("UPDATE player SET order_idx = $1 WHERE user_id = $2")
            .bind(order_idx)
            .bind(user_id)
            .execute(&pool)
            .await?;

        self.journal.record(
            league,
            format!("UPDATE player {} order_idx={}", user_id, order_idx),
        );
        Ok(result.rows_affected() > 0)
    }

    async fn set_active(
        &self,
        league: &str,
        user_id: &str,
        active: bool,
    ) -> Result<bool, StoreError> {
        let pool = self.pool(league).await?;
        let result = sqlx::query("UPDATE player SET active = $1 WHERE user_id = $2")
            .bind(active)
            .bind(user_id)
            .execute(&pool)
            .await?;

        self.journal
            .record(league, format!("UPDATE player {} active={}", user_id, active));
        Ok(result.rows_affected() > 0)
    }
}

impl MatchDatabase for SqliteDatabase {
    async fn add_match(&self, league: &str, new_match: &NewMatch) -> Result<i64, StoreError> {
        let mut players = vec![new_match.player_1.as_str()];
        if let Some(player_2) = new_match.player_2.as_deref() {
            if player_2 == new_match.player_1 {
                return Err(StoreError::SelfPairing(player_2.to_string()));
            }
            players.push(player_2);
        }

        for user_id in &players {
            if self.get_player_by_id(league, user_id).await?.is_none() {
                return Err(StoreError::UnknownPlayer(user_id.to_string()));
            }
        }

        if let Some(player_2) = new_match.player_2.as_deref() {
            let existing = self
                .get_matches_for_season(league, new_match.season)
                .await?
                .into_iter()
                .any(|game| game.is_between(&new_match.player_1, player_2));
            if existing {
                return Err(StoreError::DuplicatePairing {
                    player_1: new_match.player_1.clone(),
                    player_2: player_2.to_string(),
                    season: new_match.season,
                });
            }
        }

        let pool = self.pool(league).await?;
        let result = sqlx::query(
            r#"
            INSERT INTO "match" (player_1, player_2, week, grouping, season, sets, sets_needed)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            "#,
        )
        .bind(&new_match.player_1)
        .bind(&new_match.player_2)
        .bind(new_match.week)
        .bind(&new_match.grouping)
        .bind(new_match.season)
        .bind(new_match.sets_needed)
        .execute(&pool)
        .await?;

        let match_id = result.last_insert_rowid();
        self.journal.record(
            league,
            format!(
                "INSERT match {} {} vs {} week={} grouping={:?} season={} sets_needed={}",
                match_id,
                new_match.player_1,
                new_match.player_2.as_deref().unwrap_or("bye"),
                new_match.week,
                new_match.grouping,
                new_match.season,
                new_match.sets_needed
            ),
        );
        Ok(match_id)
    }

    async fn get_matches(&self, league: &str) -> Result<Vec<Match>, StoreError> {
        let pool = self.pool(league).await?;
        let matches = sqlx::query_as::<_, Match>(&format!(
            r#"SELECT {} FROM "match" ORDER BY rowid"#,
            MATCH_COLUMNS
        ))
        .fetch_all(&pool)
        .await?;

        Ok(matches)
    }

    async fn get_matches_for_season(
        &self,
        league: &str,
        season: i64,
    ) -> Result<Vec<Match>, StoreError> {
        let pool = self.pool(league).await?;
        let matches = sqlx::query_as::<_, Match>(&format!(
            r#"SELECT {} FROM "match" WHERE season = $1 ORDER BY rowid"#,
            MATCH_COLUMNS
        ))
        .bind(season)
        .fetch_all(&pool)
        .await?;

        Ok(matches)
    }

    async fn get_matches_for_week(
        &self,
        league: &str,
        week: NaiveDate,
    ) -> Result<Vec<Match>, StoreError> {
        let pool = self.pool(league).await?;
        let matches = sqlx::query_as::<_, Match>(&format!(
            r#"SELECT {} FROM "match" WHERE week = $1 ORDER BY grouping, rowid"#,
            MATCH_COLUMNS
        ))
        .bind(week)
        .fetch_all(&pool)
        .await?;

        Ok(matches)
    }

    async fn get_match_by_id(
        &self,
        league: &str,
        match_id: i64,
    ) -> Result<Option<Match>, StoreError> {
        let pool = self.pool(league).await?;
        let found = sqlx::query_as::<_, Match>(&format!(
            r#"SELECT {} FROM "match" WHERE rowid = $1"#,
            MATCH_COLUMNS
        ))
        .bind(match_id)
        .fetch_optional(&pool)
        .await?;

        Ok(found)
    }

    async fn get_match_by_players(
        &self,
        league: &str,
        player_a: &str,
        player_b: &str,
    ) -> Result<Option<Match>, StoreError> {
        if player_a == player_b {
            return Ok(None);
        }

        let season = self.get_current_season(league).await?;
        let pool = self.pool(league).await?;
        let found = sqlx::query_as::<_, Match>(&format!(
            r#"
            SELECT {} FROM "match"
            WHERE season = $1
                AND ((player_1 = $2 AND player_2 = $3) OR (player_1 = $3 AND player_2 = $2))
            ORDER BY rowid
            LIMIT 1
            "#,
            MATCH_COLUMNS
        ))
        .bind(season)
        .bind(player_a)
        .bind(player_b)
        .fetch_optional(&pool)
        .await?;

        if found.is_none() {
            info!(
                "No season {} match between {} and {} in league {}",
                season, player_a, player_b, league
            );
        }
        Ok(found)
    }

    async fn record_result(
        &self,
        league: &str,
        match_id: i64,
        winner: &str,
        sets: i64,
        date_played: NaiveDate,
    ) -> Result<bool, StoreError> {
        let pool = self.pool(league).await?;
        let result = sqlx::query(
            r#"
            UPDATE "match"
            SET winner = $1, sets = $2, date_played = $3
            WHERE rowid = $4 AND winner IS NULL
            "#,
        )
        .bind(winner)
        .bind(sets)
        .bind(date_played)
        .bind(match_id)
        .execute(&pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        self.journal.record(
            league,
            format!(
                "UPDATE match {} winner={} sets={} date_played={}",
                match_id, winner, sets, date_played
            ),
        );
        Ok(true)
    }

    async fn admin_update_match(&self, league: &str, updated: &Match) -> Result<bool, StoreError> {
        let pool = self.pool(league).await?;
        let result = sqlx::query(
            r#"
            UPDATE "match"
            SET player_1 = $1,
                player_2 = $2,
                winner = $3,
                week = $4,
                grouping = $5,
                sets = $6,
                sets_needed = $7,
                date_played = $8
            WHERE rowid = $9
            "#,
        )
        .bind(&updated.player_1)
        .bind(&updated.player_2)
        .bind(&updated.winner)
        .bind(updated.week)
        .bind(&updated.grouping)
        .bind(updated.sets)
        .bind(updated.sets_needed)
        .bind(updated.date_played)
        .bind(updated.id)
        .execute(&pool)
        .await?;

        self.journal.record(
            league,
            format!(
                "UPDATE match {} player_1={} player_2={} winner={} week={} grouping={:?} sets={} sets_needed={}",
                updated.id,
                updated.player_1,
                updated.player_2.as_deref().unwrap_or("bye"),
                updated.winner.as_deref().unwrap_or("none"),
                updated.week,
                updated.grouping,
                updated.sets,
                updated.sets_needed
            ),
        );
        Ok(result.rows_affected() > 0)
    }

    async fn set_message_sent(
        &self,
        league: &str,
        match_id: i64,
        message_sent: bool,
    ) -> Result<bool, StoreError> {
        let pool = self.pool(league).await?;
        let result = sqlx::query(r#"UPDATE "match" SET message_sent = $1 WHERE rowid = $2"#)
            .bind(message_sent)
            .bind(match_id)
            .execute(&pool)
            .await?;

        self.journal.record(
            league,
            format!("UPDATE match {} message_sent={}", match_id, message_sent),
        );
        Ok(result.rows_affected() > 0)
    }

    async fn clear_matches_for_season(&self, league: &str, season: i64) -> Result<u64, StoreError> {
        let pool = self.pool(league).await?;
        let result = sqlx::query(r#"DELETE FROM "match" WHERE season = $1"#)
            .bind(season)
            .execute(&pool)
            .await?;

        self.journal
            .record(league, format!("DELETE match season={}", season));
        Ok(result.rows_affected())
    }

    async fn get_current_season(&self, league: &str) -> Result<i64, StoreError> {
        let pool = self.pool(league).await?;
        let season = sqlx::query_scalar::<_, Option<i64>>(r#"SELECT MAX(season) FROM "match""#)
            .fetch_one(&pool)
            .await?;

        Ok(season.unwrap_or(0))
    }

    async fn get_all_seasons(&self, league: &str) -> Result<Vec<i64>, StoreError> {
        let pool = self.pool(league).await?;
        let seasons =
            sqlx::query_scalar::<_, i64>(r#"SELECT DISTINCT season FROM "match" ORDER BY season"#)
                .fetch_all(&pool)
                .await?;

        Ok(seasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAGUE: &str = "test";

    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn scheduled(player_1: &str, player_2: &str, season: i64) -> NewMatch {
        NewMatch {
            player_1: player_1.to_string(),
            player_2: Some(player_2.to_string()),
            week: week(),
            grouping: "a".to_string(),
            season,
            sets_needed: 2,
        }
    }

    async fn league_with_players(ids: &[&str]) -> SqliteDatabase {
        let db = SqliteDatabase::in_memory();
        for id in ids {
            db.add_player(LEAGUE, id, &format!("Player {}", id), "a")
                .await
                .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn store_is_created_with_a_version_stamp() {
        let db = SqliteDatabase::in_memory();
        let version = db.get_config(LEAGUE, ConfigKey::LeagueVersion).await.unwrap();
        assert_eq!(version, Some(LATEST_VERSION.to_string()));
        assert_eq!(db.get_current_season(LEAGUE).await.unwrap(), 0);
        assert!(db.get_all_seasons(LEAGUE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn config_values_are_replaced() {
        let db = SqliteDatabase::in_memory();
        db.set_config(LEAGUE, ConfigKey::BotName, "@sul").await.unwrap();
        db.set_config(LEAGUE, ConfigKey::BotName, "@it's").await.unwrap();

        let value = db.get_config(LEAGUE, ConfigKey::BotName).await.unwrap();
        assert_eq!(value.as_deref(), Some("@it's"));
        let all = db.get_all_config(LEAGUE).await.unwrap();
        assert_eq!(all.get("BOT_NAME").map(String::as_str), Some("@it's"));
        assert!(all.contains_key("LEAGUE_VERSION"));
    }

    #[tokio::test]
    async fn leagues_are_independent() {
        let db = SqliteDatabase::in_memory();
        db.add_player("smash", "U1", "Alice", "a").await.unwrap();
        assert_eq!(db.get_players("smash").await.unwrap().len(), 1);
        assert!(db.get_players("pong").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn player_ids_are_unique() {
        let db = league_with_players(&["U1"]).await;
        let error = db.add_player(LEAGUE, "U1", "Again", "b").await.unwrap_err();
        assert!(matches!(error, StoreError::DuplicatePlayer(id) if id == "U1"));
    }

    #[tokio::test]
    async fn player_updates_are_applied() {
        let db = league_with_players(&["U1", "U2", "U3"]).await;

        assert!(db.update_grouping(LEAGUE, "U1", "b").await.unwrap());
        assert!(!db.update_grouping(LEAGUE, "missing", "b").await.unwrap());
        assert!(db.set_active(LEAGUE, "U2", false).await.unwrap());
        assert!(db.update_player_order_idx(LEAGUE, "U3", 7).await.unwrap());

        let alice = db.get_player_by_id(LEAGUE, "U1").await.unwrap().unwrap();
        assert_eq!(alice.grouping, "b");
        let active: Vec<_> = db
            .get_active_players(LEAGUE)
            .await
            .unwrap()
            .into_iter()
            .map(|player| player.user_id)
            .collect();
        assert_eq!(active, vec!["U3".to_string(), "U1".to_string()]);
        let by_name = db.get_player_by_name(LEAGUE, "Player U3").await.unwrap().unwrap();
        assert_eq!(by_name.order_idx, 7);
        assert!(db.get_player_by_name(LEAGUE, "Nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seeding_a_group_sets_order_and_reactivates() {
        let db = league_with_players(&["U1", "U2", "U3"]).await;
        db.set_active(LEAGUE, "U3", false).await.unwrap();

        let seeds = vec!["U3".to_string(), "U1".to_string()];
        db.update_grouping_and_orders(LEAGUE, &seeds, "c").await.unwrap();

        let u3 = db.get_player_by_id(LEAGUE, "U3").await.unwrap().unwrap();
        assert_eq!((u3.grouping.as_str(), u3.order_idx, u3.active), ("c", 0, true));
        let u1 = db.get_player_by_id(LEAGUE, "U1").await.unwrap().unwrap();
        assert_eq!((u1.grouping.as_str(), u1.order_idx), ("c", 1));
        let u2 = db.get_player_by_id(LEAGUE, "U2").await.unwrap().unwrap();
        assert_eq!(u2.grouping, "a");
    }

    #[tokio::test]
    async fn added_match_is_found_by_either_player_order() {
        let db = league_with_players(&["U1", "U2"]).await;
        let match_id = db.add_match(LEAGUE, &scheduled("U1", "U2", 1)).await.unwrap();

        let found = db.get_match_by_players(LEAGUE, "U2", "U1").await.unwrap().unwrap();
        assert_eq!(found.id, match_id);
        assert_eq!(found.sets, 0);
        assert_eq!(found.week, week());
        assert!(!found.is_complete());
        assert!(db.get_match_by_players(LEAGUE, "U1", "U1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pairing_is_unique_per_season() {
        let db = league_with_players(&["U1", "U2"]).await;
        db.add_match(LEAGUE, &scheduled("U1", "U2", 1)).await.unwrap();

        let error = db
            .add_match(LEAGUE, &scheduled("U2", "U1", 1))
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::DuplicatePairing { season: 1, .. }));

        db.add_match(LEAGUE, &scheduled("U2", "U1", 2)).await.unwrap();
        assert_eq!(db.get_all_seasons(LEAGUE).await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn matches_need_two_distinct_known_players() {
        let db = league_with_players(&["U1"]).await;
        let error = db
            .add_match(LEAGUE, &scheduled("U1", "U1", 1))
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::SelfPairing(_)));

        let error = db
            .add_match(LEAGUE, &scheduled("U1", "U9", 1))
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::UnknownPlayer(id) if id == "U9"));
    }

    #[tokio::test]
    async fn byes_can_be_scheduled() {
        let db = league_with_players(&["U1"]).await;
        let bye = NewMatch {
            player_2: None,
            ..scheduled("U1", "U1", 1)
        };
        let match_id = db.add_match(LEAGUE, &bye).await.unwrap();
        let stored = db.get_match_by_id(LEAGUE, match_id).await.unwrap().unwrap();
        assert!(stored.is_bye());
    }

    #[tokio::test]
    async fn result_is_recorded_once() {
        let db = league_with_players(&["U1", "U2"]).await;
        let match_id = db.add_match(LEAGUE, &scheduled("U1", "U2", 1)).await.unwrap();

        assert!(db.record_result(LEAGUE, match_id, "U2", 3, week()).await.unwrap());
        assert!(!db.record_result(LEAGUE, match_id, "U1", 2, week()).await.unwrap());

        let stored = db.get_match_by_players(LEAGUE, "U1", "U2").await.unwrap().unwrap();
        assert_eq!(stored.winner.as_deref(), Some("U2"));
        assert_eq!(stored.sets, 3);
        assert_eq!(stored.date_played, Some(week()));
    }

    #[tokio::test]
    async fn admin_update_overwrites_the_row() {
        let db = league_with_players(&["U1", "U2"]).await;
        let match_id = db.add_match(LEAGUE, &scheduled("U1", "U2", 1)).await.unwrap();
        db.record_result(LEAGUE, match_id, "U2", 3, week()).await.unwrap();

        let mut corrected = db.get_match_by_id(LEAGUE, match_id).await.unwrap().unwrap();
        corrected.winner = None;
        corrected.sets = 0;
        corrected.date_played = None;
        corrected.grouping = "b".to_string();
        assert!(db.admin_update_match(LEAGUE, &corrected).await.unwrap());

        let stored = db.get_match_by_id(LEAGUE, match_id).await.unwrap().unwrap();
        assert_eq!(stored, corrected);
        assert!(db.set_message_sent(LEAGUE, match_id, true).await.unwrap());
        let stored = db.get_match_by_id(LEAGUE, match_id).await.unwrap().unwrap();
        assert!(stored.message_sent);
    }

    #[tokio::test]
    async fn current_season_follows_the_latest_matches() {
        let db = league_with_players(&["U1", "U2", "U3"]).await;
        db.add_match(LEAGUE, &scheduled("U1", "U2", 1)).await.unwrap();
        db.add_match(LEAGUE, &scheduled("U1", "U3", 2)).await.unwrap();
        assert_eq!(db.get_current_season(LEAGUE).await.unwrap(), 2);

        // Lookups only consider the current season.
        assert!(db.get_match_by_players(LEAGUE, "U1", "U2").await.unwrap().is_none());

        assert_eq!(db.clear_matches_for_season(LEAGUE, 2).await.unwrap(), 1);
        assert_eq!(db.get_current_season(LEAGUE).await.unwrap(), 1);
        assert!(db.get_match_by_players(LEAGUE, "U1", "U2").await.unwrap().is_some());
        assert_eq!(db.get_matches(LEAGUE).await.unwrap().len(), 1);
        assert_eq!(db.get_matches_for_week(LEAGUE, week()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mutations_are_journaled() {
        let db = league_with_players(&["U1", "U2"]).await;
        db.add_match(LEAGUE, &scheduled("U1", "U2", 1)).await.unwrap();

        let statements: Vec<_> = db
            .journal(LEAGUE)
            .into_iter()
            .map(|entry| entry.statement)
            .collect();
        assert_eq!(statements.len(), 4);
        assert!(statements[0].starts_with("INSERT config LEAGUE_VERSION"));
        assert!(statements[3].starts_with("INSERT match"));

        db.clear_journal(LEAGUE);
        assert!(db.journal(LEAGUE).is_empty());
    }

    #[tokio::test]
    async fn file_backed_store_is_created_lazily() {
        let directory = std::env::temp_dir().join(format!(
            "ladder-bot-test-{}-{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&directory).unwrap();
        let db = SqliteDatabase::new(&directory);
        let path = db.path("smash").unwrap();
        assert!(!path.exists());

        db.add_player("smash", "U1", "Alice", "a").await.unwrap();
        assert!(path.exists());
        assert_eq!(db.get_players("smash").await.unwrap().len(), 1);

        drop(db);
        std::fs::remove_dir_all(&directory).ok();
    }
}
