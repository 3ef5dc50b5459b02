use prettytable::{format, row, Table};

use super::standings::{LeaderboardEntry, Record, Standing};

/// Wraps a table in a Discord code block so its columns line up.
pub(crate) fn code_block(table: &Table) -> String {
    format!("```\n{}```", table)
}

fn compact_table() -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table
}

/// Renders a group's standings as `name  W-L  (set W-L)` rows.
pub fn render_group(grouping: &str, standings: &[Standing]) -> String {
    let mut table = compact_table();
    table.set_titles(row!["#", "Player", "Matches", "Sets"]);

    for (i, standing) in standings.iter().enumerate() {
        // User-facing positions start at 1.
        table.add_row(row![
            i + 1,
            &standing.name,
            format!("{}-{}", standing.record.match_wins, standing.record.match_losses),
            format!("({}-{})", standing.record.set_wins, standing.record.set_losses)
        ]);
    }

    format!("Group {}:\n{}", grouping.to_uppercase(), code_block(&table))
}

/// Renders leaderboard rows as `name: winrate% (won-lost)`.
pub fn render_leaderboard(title: &str, entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return format!("{}:\nNobody has played a match yet.", title);
    }

    let mut table = compact_table();
    table.set_titles(row!["#", "Player", "Winrate", "Matches", "Games"]);

    for (i, entry) in entries.iter().enumerate() {
        table.add_row(row![
            i + 1,
            &entry.name,
            format!("{:.2}%", entry.winrate),
            format!("{}-{}", entry.record.match_wins, entry.record.match_losses),
            format!("({}-{})", entry.games_won(), entry.games_lost())
        ]);
    }

    format!("{}:\n{}", title, code_block(&table))
}

/// Renders one player's record across every season.
pub fn render_record(name: &str, record: &Record) -> String {
    if record.matches_played() == 0 {
        return format!("{} has no completed matches yet.", name);
    }

    format!(
        "{}: {}-{} in matches ({}-{} in sets)",
        name, record.match_wins, record.match_losses, record.set_wins, record.set_losses
    )
}
