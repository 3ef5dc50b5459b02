use std::sync::Arc;

use anyhow::anyhow;
use poise::serenity_prelude::{ChannelId, Http, MessageId, ReactionType, UserId};

use crate::{utils::error::CommonError, BotError};

/// Reactions the bot leaves on messages it handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Success,
    Failure,
}

impl Reaction {
    pub fn emoji(&self) -> &'static str {
        match self {
            Reaction::Success => "✅",
            Reaction::Failure => "❌",
        }
    }
}

/// The narrow slice of the chat platform the bot needs to answer messages.
#[allow(async_fn_in_trait)]
pub trait ChatTransport {
    /// Posts a message to a channel.
    async fn send_message(&self, channel: &str, text: &str) -> Result<(), BotError>;

    /// Sends a direct message to a user.
    async fn send_direct_message(&self, user: &str, text: &str) -> Result<(), BotError>;

    /// Reacts to the message identified by `timestamp` in `channel`.
    async fn add_reaction(
        &self,
        channel: &str,
        timestamp: &str,
        reaction: Reaction,
    ) -> Result<(), BotError>;
}

fn parse_id(id: &str) -> Result<u64, BotError> {
    id.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or_else(|| CommonError::InvalidId(id.to_string()).into())
}

/// Sends messages through Discord's HTTP API.
#[derive(Debug, Clone)]
pub struct DiscordTransport {
    http: Arc<Http>,
}

impl DiscordTransport {
    pub fn new(token: &str) -> Self {
        Self::from_http(Arc::new(Http::new(token)))
    }

    pub fn from_http(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl ChatTransport for DiscordTransport {
    async fn send_message(&self, channel: &str, text: &str) -> Result<(), BotError> {
        ChannelId::new(parse_id(channel)?)
            .say(&*self.http, text)
            .await?;
        Ok(())
    }

    async fn send_direct_message(&self, user: &str, text: &str) -> Result<(), BotError> {
        let channel = UserId::new(parse_id(user)?)
            .create_dm_channel(&*self.http)
            .await
            .map_err(|e| anyhow!("Unable to open a direct message with {}: {}", user, e))?;
        channel.say(&*self.http, text).await?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: &str,
        timestamp: &str,
        reaction: Reaction,
    ) -> Result<(), BotError> {
        ChannelId::new(parse_id(channel)?)
            .create_reaction(
                &*self.http,
                MessageId::new(parse_id(timestamp)?),
                ReactionType::Unicode(reaction.emoji().to_string()),
            )
            .await?;
        Ok(())
    }
}
