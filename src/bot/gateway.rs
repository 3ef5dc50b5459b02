use std::{sync::Arc, time::Duration};

use poise::{serenity_prelude as serenity, CreateReply};
use tracing::{debug, error, info, warn};

use crate::{
    commands::{commissioner_commands::CommissionerCommands, CommandsContainer},
    config::LeagueContext,
    log::commissioner_log_error,
    BotData, BotError,
};

use super::{router::InboundMessage, transport::DiscordTransport};

/// How often the keepalive task checks the shard connections.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);
/// How long to wait before rebuilding a client that stopped.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

impl From<&serenity::Message> for InboundMessage {
    fn from(message: &serenity::Message) -> Self {
        Self {
            user: Some(message.author.id.to_string()),
            channel: Some(message.channel_id.to_string()),
            text: Some(message.content.clone()).filter(|content| !content.is_empty()),
            timestamp: Some(message.id.to_string()),
            bot_id: message.author.bot.then(|| message.author.id.to_string()),
            is_direct: message.guild_id.is_none(),
        }
    }
}

/// Forwards every message the bot can see to the bot loop.
pub async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, BotError>,
    data: &BotData,
) -> Result<(), BotError> {
    if let serenity::FullEvent::Message { new_message } = event {
        data.inbox.send(InboundMessage::from(new_message))?;
    }
    Ok(())
}

async fn on_error(error: poise::FrameworkError<'_, BotData, BotError>) {
    let error_msg = match error {
        poise::FrameworkError::NotAnOwner { .. }
        | poise::FrameworkError::GuildOnly { .. }
        | poise::FrameworkError::DmOnly { .. }
        | poise::FrameworkError::UnknownCommand { .. } => return,
        poise::FrameworkError::CommandCheckFailed { ref error, .. } => match error {
            Some(error) => error.to_string(),
            None => return,
        },
        poise::FrameworkError::Setup { ref error, .. } => error.to_string(),
        poise::FrameworkError::EventHandler { ref error, .. } => error.to_string(),
        poise::FrameworkError::Command { ref error, .. } => error.to_string(),
        poise::FrameworkError::ArgumentParse { ref error, .. } => error.to_string(),
        _ => "No cause available for this error type.".to_string(),
    };
    error!("Error in command: {}", error_msg);

    let Some(ctx) = error.ctx() else {
        error!("No context in this error");
        return;
    };

    if let Err(e) = ctx
        .send(
            CreateReply::default()
                .content("Something went wrong. Please let the commissioner know if the issue persists.")
                .ephemeral(true),
        )
        .await
    {
        error!("Error sending generic error message to user: {}", e);
    }

    let data = ctx.data();
    let context = match LeagueContext::load(&data.database, &data.league).await {
        Ok(context) => context,
        Err(e) => {
            warn!("Cannot notify the commissioner without a league config: {}", e);
            return;
        }
    };

    let transport = DiscordTransport::from_http(ctx.serenity_context().http.clone());
    let fields = vec![
        ("Command", ctx.command().qualified_name.clone()),
        ("Cause", error_msg),
        ("User", format!("<@{}>", ctx.author().id)),
    ];
    commissioner_log_error(&transport, &context, "Command failed", fields)
        .await
        .unwrap_or_else(|e| error!("Error sending error message to the commissioner: {:?}", e));
}

/// Restarts shards that lost their connection.
async fn keepalive(shard_manager: Arc<serenity::ShardManager>) {
    let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
    loop {
        interval.tick().await;

        let disconnected: Vec<serenity::ShardId> = shard_manager
            .runners
            .lock()
            .await
            .iter()
            .filter(|(_, runner)| runner.stage == serenity::ConnectionStage::Disconnected)
            .map(|(id, _)| *id)
            .collect();

        for shard_id in disconnected {
            debug!("Keepalive restarting shard {}", shard_id);
            shard_manager.restart(shard_id).await;
        }
    }
}

async fn start_client(token: &str, data: BotData) -> Result<(), BotError> {
    let commands = CommissionerCommands::get_all();
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!("Ready as {}", ready.user.name);
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    let heartbeat = tokio::spawn(keepalive(client.shard_manager.clone()));
    let result = client.start().await;
    heartbeat.abort();

    Ok(result?)
}

/// Keeps a gateway connection up for as long as the process runs.
///
/// A client that stops is rebuilt after a short delay.
pub async fn run_gateway(token: String, data: BotData) {
    loop {
        match start_client(&token, data.clone()).await {
            Ok(()) => warn!("Discord client stopped, reconnecting"),
            Err(e) => error!("Discord client failed, reconnecting: {:?}", e),
        }
        if data.inbox.is_closed() {
            info!("The bot loop is gone, stopping the gateway");
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
