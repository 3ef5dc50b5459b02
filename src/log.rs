use std::time::SystemTime;

use tracing::{error, info};

use crate::{bot::transport::ChatTransport, config::LeagueContext, BotError};

fn render(title: &str, fields: &[(&str, String)], seen_label: &str) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut message = title.to_string();
    for (name, value) in fields {
        message.push_str(&format!("\n**{}**: {}", name, value));
    }
    message.push_str(&format!("\n**{}**: <t:{}:F>", seen_label, now));
    message
}

/// Sends an info note to the league commissioner's direct messages.
pub async fn commissioner_log_info<T: ChatTransport>(
    transport: &T,
    context: &LeagueContext,
    title: &str,
    fields: Vec<(&str, String)>,
) -> Result<(), BotError> {
    info!("ℹ️ {}\n\n{:#?}", title, fields);

    transport
        .send_direct_message(
            &context.commissioner_id,
            &render(title, &fields, "Happened at"),
        )
        .await
}

/// Sends an error note to the league commissioner's direct messages.
pub async fn commissioner_log_error<T: ChatTransport>(
    transport: &T,
    context: &LeagueContext,
    title: &str,
    fields: Vec<(&str, String)>,
) -> Result<(), BotError> {
    error!("⚠️ {}\n\n{:#?}", title, fields);

    transport
        .send_direct_message(
            &context.commissioner_id,
            &format!("⚠️ {}", render(title, &fields, "Seen at")),
        )
        .await
}
