/// Error types used across the bot.
pub mod error;
