use std::{collections::HashMap, path::PathBuf};

use anyhow::anyhow;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
    database::{ConfigDatabase, SqliteDatabase},
    utils::error::CommonError,
    BotError,
};

const DEFAULT_LEAGUE_NAME: &str = "ladder";
const DEFAULT_BOT_NAME: &str = "@ladder";
const DEFAULT_SCORE_EXAMPLE: &str = "2-1";
pub const DEFAULT_SETS_NEEDED: i64 = 2;
/// Scores are reported as single digits, so no match can need more sets than this.
pub const MAX_SETS_NEEDED: i64 = 9;

/// Settings read from the environment when the bot starts.
#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    pub league_name: String,
    pub data_dir: PathBuf,
}

impl Settings {
    /// Reads the settings from the environment.
    ///
    /// - `DISCORD_TOKEN` (required)
    /// - `LEAGUE_NAME` (default `ladder`)
    /// - `LEAGUE_DATA_DIR` directory holding the league databases (default `.`)
    pub fn from_env() -> Result<Self, BotError> {
        let discord_token = std::env::var("DISCORD_TOKEN")
            .map_err(|_| anyhow!("Expected DISCORD_TOKEN as an environment variable"))?;

        Ok(Self {
            discord_token,
            league_name: std::env::var("LEAGUE_NAME")
                .unwrap_or_else(|_| DEFAULT_LEAGUE_NAME.to_string()),
            data_dir: std::env::var("LEAGUE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
        })
    }
}

/// The log file used by release builds.
pub fn log_path() -> PathBuf {
    std::env::var("LADDER_LOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("ladder-bot.log"))
}

/// Names of the per-league settings stored in the `config` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ConfigKey {
    /// Schema version stamp, written once when the store is created.
    LeagueVersion,
    /// How the bot is addressed in help text, e.g. `@ladder`.
    BotName,
    BotUserId,
    CommissionerId,
    CompetitionChannelId,
    /// Example score shown in help text.
    ScoreExample,
    /// Sets needed to win a match. 2 means best of three.
    SetsNeeded,
}

impl ConfigKey {
    /// Whether the key can be changed after the store is created.
    pub fn is_settable(&self) -> bool {
        !matches!(self, ConfigKey::LeagueVersion)
    }

    /// Checks a value before it is stored under this key and returns it trimmed.
    pub fn validate(&self, value: &str) -> Result<String, CommonError> {
        let trimmed = value.trim();
        let invalid = || CommonError::InvalidConfig {
            key: *self,
            value: value.to_string(),
        };

        match self {
            ConfigKey::LeagueVersion => Err(invalid()),
            ConfigKey::SetsNeeded => parse_sets_needed(trimmed).map(|sets| sets.to_string()),
            ConfigKey::BotUserId | ConfigKey::CommissionerId | ConfigKey::CompetitionChannelId => {
                if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                    Ok(trimmed.to_string())
                } else {
                    Err(invalid())
                }
            }
            ConfigKey::BotName | ConfigKey::ScoreExample if trimmed.is_empty() => Err(invalid()),
            ConfigKey::BotName | ConfigKey::ScoreExample => Ok(trimmed.to_string()),
        }
    }
}

/// Parses a `SETS_NEEDED` value, a whole number from 1 to `MAX_SETS_NEEDED`.
pub fn parse_sets_needed(value: &str) -> Result<i64, CommonError> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|sets| sets_needed_is_valid(*sets))
        .ok_or_else(|| CommonError::InvalidConfig {
            key: ConfigKey::SetsNeeded,
            value: value.to_string(),
        })
}

pub fn sets_needed_is_valid(sets_needed: i64) -> bool {
    (1..=MAX_SETS_NEEDED).contains(&sets_needed)
}

/// A typed view over a league's config table.
///
/// Loaded fresh for every batch of messages so config changes apply without a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueContext {
    pub league: String,
    pub bot_name: String,
    pub bot_user_id: String,
    pub commissioner_id: String,
    pub competition_channel_id: String,
    pub score_example: String,
}

impl LeagueContext {
    pub async fn load(database: &SqliteDatabase, league: &str) -> Result<Self, BotError> {
        let configs = database.get_all_config(league).await?;
        Self::from_configs(league, &configs)
    }

    pub fn from_configs(league: &str, configs: &HashMap<String, String>) -> Result<Self, BotError> {
        let required = |key: ConfigKey| -> Result<String, BotError> {
            configs
                .get(key.as_ref())
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .ok_or_else(|| CommonError::MissingConfig(key).into())
        };
        let optional = |key: ConfigKey, default: &str| -> String {
            configs
                .get(key.as_ref())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            league: league.to_string(),
            bot_name: optional(ConfigKey::BotName, DEFAULT_BOT_NAME),
            bot_user_id: required(ConfigKey::BotUserId)?,
            commissioner_id: required(ConfigKey::CommissionerId)?,
            competition_channel_id: required(ConfigKey::CompetitionChannelId)?,
            score_example: optional(ConfigKey::ScoreExample, DEFAULT_SCORE_EXAMPLE),
        })
    }
}
