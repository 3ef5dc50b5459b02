use crate::config::LeagueContext;

/// A raw message record as delivered by the chat transport.
///
/// Every field is optional on the wire; messages missing any of them are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub user: Option<String>,
    pub channel: Option<String>,
    pub text: Option<String>,
    /// Identifies the message within its channel, used to react to it.
    pub timestamp: Option<String>,
    /// Set when the message was posted by a bot.
    pub bot_id: Option<String>,
    pub is_direct: bool,
}

/// Where a message was posted, relative to the league.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    DirectMessage,
    CompetitionChannel,
    Other,
}

/// A message the bot should act on, with the leading bot mention removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleMessage {
    pub user: String,
    pub channel: String,
    pub text: String,
    pub timestamp: String,
    pub kind: ChannelKind,
}

pub fn classify(message: &InboundMessage, context: &LeagueContext) -> ChannelKind {
    if message.is_direct {
        ChannelKind::DirectMessage
    } else if message.channel.as_deref() == Some(context.competition_channel_id.as_str()) {
        ChannelKind::CompetitionChannel
    } else {
        ChannelKind::Other
    }
}

/// Returns the text after a leading `<@bot>` or `<@!bot>` mention, if there is one.
pub fn strip_bot_mention<'a>(text: &'a str, bot_user_id: &str) -> Option<&'a str> {
    let rest = text.trim_start().strip_prefix("<@")?;
    let rest = rest.strip_prefix('!').unwrap_or(rest);
    let rest = rest.strip_prefix(bot_user_id)?.strip_prefix('>')?;
    Some(rest.trim())
}

/// Decides whether the bot should handle a message.
///
/// Direct messages are always handled, with or without a mention. Messages in the competition
/// channel must start with a mention of the bot. Everything else, including anything posted by a
/// bot, is dropped.
pub fn filter_message(message: InboundMessage, context: &LeagueContext) -> Option<EligibleMessage> {
    let kind = classify(&message, context);
    let InboundMessage {
        user: Some(user),
        channel: Some(channel),
        text: Some(text),
        timestamp: Some(timestamp),
        bot_id: None,
        ..
    } = message
    else {
        return None;
    };

    if user == context.bot_user_id {
        return None;
    }

    let text = match kind {
        ChannelKind::DirectMessage => strip_bot_mention(&text, &context.bot_user_id)
            .unwrap_or(text.trim())
            .to_string(),
        ChannelKind::CompetitionChannel => {
            strip_bot_mention(&text, &context.bot_user_id)?.to_string()
        }
        ChannelKind::Other => return None,
    };

    Some(EligibleMessage {
        user,
        channel,
        text,
        timestamp,
        kind,
    })
}

/// Filters a batch of messages, keeping their order.
pub fn filter_messages(
    messages: impl IntoIterator<Item = InboundMessage>,
    context: &LeagueContext,
) -> Vec<EligibleMessage> {
    messages
        .into_iter()
        .filter_map(|message| filter_message(message, context))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_context() -> LeagueContext {
        LeagueContext {
            league: "test".to_string(),
            bot_name: "@ladder".to_string(),
            bot_user_id: "BOT".to_string(),
            commissioner_id: "C0".to_string(),
            competition_channel_id: "COMP".to_string(),
            score_example: "2-1".to_string(),
        }
    }

    pub(crate) fn message(channel: &str, user: &str, text: &str) -> InboundMessage {
        InboundMessage {
            user: Some(user.to_string()),
            channel: Some(channel.to_string()),
            text: Some(text.to_string()),
            timestamp: Some("TS".to_string()),
            bot_id: None,
            is_direct: false,
        }
    }

    pub(crate) fn direct(user: &str, text: &str) -> InboundMessage {
        InboundMessage {
            is_direct: true,
            ..message(&format!("D{}", user), user, text)
        }
    }

    fn texts(messages: Vec<InboundMessage>) -> Vec<String> {
        filter_messages(messages, &test_context())
            .into_iter()
            .map(|message| message.text)
            .collect()
    }

    #[test]
    fn incomplete_or_foreign_messages_are_dropped() {
        let complete = message("COMP", "U1", "<@BOT> message text");
        let messages = vec![
            InboundMessage {
                timestamp: None,
                ..complete.clone()
            },
            InboundMessage {
                user: None,
                ..complete.clone()
            },
            InboundMessage {
                channel: None,
                ..complete.clone()
            },
            InboundMessage {
                text: None,
                ..complete.clone()
            },
            InboundMessage {
                bot_id: Some("B123".to_string()),
                ..complete.clone()
            },
            message("COMP", "BOT", "<@BOT> talking to myself"),
            message("COMP", "U1", "message text"),
            message("elsewhere", "U1", "<@BOT> message"),
        ];
        assert!(texts(messages).is_empty());
    }

    #[test]
    fn direct_messages_need_no_mention() {
        let messages = vec![
            direct("U1", "message text"),
            direct("U1", "<@BOT> message text"),
            direct("U1", "<@!BOT>   message text"),
        ];
        assert_eq!(
            texts(messages),
            vec!["message text", "message text", "message text"]
        );
    }

    #[test]
    fn channel_messages_must_start_with_the_mention() {
        let messages = vec![
            message("COMP", "U1", "message <@BOT> text middle"),
            message("COMP", "U1", "message text <@BOT> last"),
            message("COMP", "U1", "<@BOT> message text first"),
            message("COMP", "U1", "<@BOTTOM> not for us"),
        ];
        assert_eq!(texts(messages), vec!["message text first"]);
    }

    #[test]
    fn classification() {
        let context = test_context();
        assert_eq!(
            classify(&direct("U1", "hi"), &context),
            ChannelKind::DirectMessage
        );
        assert_eq!(
            classify(&message("COMP", "U1", "hi"), &context),
            ChannelKind::CompetitionChannel
        );
        assert_eq!(
            classify(&message("random", "U1", "hi"), &context),
            ChannelKind::Other
        );
    }
}
