use thiserror::Error;

use crate::config::ConfigKey;

/// Errors shared by the bot loop and the commissioner commands.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("Config value {0} is not set for this league.")]
    MissingConfig(ConfigKey),
    #[error("Config value {key} has an invalid value: {value}")]
    InvalidConfig { key: ConfigKey, value: String },
    #[error("{0} is not a valid Discord id.")]
    InvalidId(String),
    #[error("User {0} does not exist.")]
    UserNotExists(String),
    #[error("Match {0} does not exist.")]
    MatchNotExists(i64),
}

/// Errors raised by the league store.
///
/// The store enforces identity and pairing uniqueness only. Score rules live in the league engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Player {0} is already registered.")]
    DuplicatePlayer(String),
    #[error("Player {0} is not registered.")]
    UnknownPlayer(String),
    #[error("A player cannot be scheduled against themselves ({0}).")]
    SelfPairing(String),
    #[error("{player_1} and {player_2} already have a match in season {season}.")]
    DuplicatePairing {
        player_1: String,
        player_2: String,
        season: i64,
    },
}
