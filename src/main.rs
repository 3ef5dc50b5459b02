use std::{
    fs::File,
    sync::{Arc, Mutex},
};

use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{info, info_span, level_filters::LevelFilter};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use bot::{gateway::run_gateway, router::InboundMessage, transport::DiscordTransport, Bot};
use config::Settings;
use database::SqliteDatabase;

/// Message handling: the gateway, the message router and the bot loop.
mod bot;
/// All the commands that the bot understands.
///
/// Contains the chat message parser, the commissioner slash commands, and the checks they use.
mod commands;
/// Settings from the environment and per-league config keys.
mod config;
/// Traits and types used for interacting with the league store.
mod database;
/// Score validation, standings and leaderboards.
mod league;
/// Contains functions for notifying the commissioner.
mod log;

mod utils;

/// Stores data used by the bot.
///
/// Accessible by all bot commands through Context.
#[derive(Debug, Clone)]
pub struct Data {
    database: Arc<SqliteDatabase>,
    league: String,
    /// Messages seen by the gateway, waiting for the bot loop.
    inbox: UnboundedSender<InboundMessage>,
}

/// Convenience type for the bot's data.
pub type BotData = Data;

/// A thread-safe Error type used by the bot.
pub type BotError = anyhow::Error;

/// A context that gives the bot information about the action that invoked it.
///
/// It also includes other useful data that the bot uses such as the database.
/// You can access the data in commands by using ``ctx.data()``.
pub type BotContext<'a> = poise::Context<'a, BotData, BotError>;

#[tokio::main]
async fn main() {
    // Load the .env file only in the development environment (bypassed with the --release flag)
    #[cfg(debug_assertions)]
    dotenv::dotenv().ok();

    if let Err(e) = setup_tracing() {
        panic!("Error trying to setup tracing: {}", e);
    }

    if let Err(e) = run().await {
        panic!("Error trying to run the bot: {}", e);
    }
}

/// The main function that runs the bot.
async fn run() -> Result<(), BotError> {
    let settings = {
        let setup_span = info_span!("bot_setup");
        let _guard = setup_span.enter();

        let settings = Settings::from_env()?;
        info!("Successfully loaded settings for league {}", settings.league_name);
        settings
    };

    let database = Arc::new(SqliteDatabase::new(settings.data_dir.clone()));
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

    let data = Data {
        database: database.clone(),
        league: settings.league_name.clone(),
        inbox: inbox_tx,
    };
    let gateway = tokio::spawn(run_gateway(settings.discord_token.clone(), data));

    let bot = Bot::new(
        database,
        DiscordTransport::new(&settings.discord_token),
        settings.league_name,
    );
    let result = bot.run(inbox_rx).await;
    gateway.abort();

    result
}

/// Sets up the tracing subscriber for the bot.
fn setup_tracing() -> Result<(), BotError> {
    if cfg!(debug_assertions) {
        let filter = EnvFilter::from_default_env()
            .add_directive("none".parse()?)
            .add_directive("ladder_bot=debug".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::NONE)
            .pretty()
            .init();

        return Ok(());
    }

    let log_file = File::create(config::log_path())?;

    // Only errors are logged in production
    tracing_subscriber::fmt::fmt()
        .with_span_events(FmtSpan::NONE)
        .with_max_level(LevelFilter::ERROR)
        .with_writer(Mutex::new(log_file))
        .pretty()
        .init();

    Ok(())
}
