/// Slash commands for running the league.
pub mod commissioner_commands;
/// Turns chat messages addressed to the bot into commands.
pub mod parser;

/// A way to group commands together.
///
/// Implementors of this trait return the list of their commands from within their own module, so
/// only the implementor needs to be `pub` and not the commands themselves.
///
/// For example, you can define a type to group the commissioner commands together.
/// ```ignore
/// pub struct CommissionerCommands;
///
/// impl CommandsContainer for CommissionerCommands {
///     type Data = BotData;
///     type Error = BotError;
///
///     fn get_all() -> Vec<poise::Command<Self::Data, Self::Error>> {
///         vec![seasons()]
///     }
/// }
/// ```
pub trait CommandsContainer {
    type Data;
    type Error;

    fn get_all() -> Vec<poise::Command<Self::Data, Self::Error>>;
}

/// Checks used by commands through `#[poise::command(check = "...")]`.
pub mod checks {
    use poise::CreateReply;
    use tracing::info;

    use crate::{config::ConfigKey, database::ConfigDatabase, BotContext, BotError};

    /// Passes for the league commissioner and for the bot's owners.
    ///
    /// Owners are let through so a fresh league can be configured before `COMMISSIONER_ID` is set.
    pub async fn is_commissioner(ctx: BotContext<'_>) -> Result<bool, BotError> {
        let data = ctx.data();
        let author = ctx.author().id;

        let commissioner = data
            .database
            .get_config(&data.league, ConfigKey::CommissionerId)
            .await?;
        if commissioner.as_deref() == Some(author.to_string().as_str())
            || ctx.framework().options().owners.contains(&author)
        {
            return Ok(true);
        }

        info!("{} tried to use a commissioner command", ctx.author().name);
        ctx.send(
            CreateReply::default()
                .content("Only the league commissioner can use this command.")
                .ephemeral(true),
        )
        .await?;
        Ok(false)
    }
}
