use thiserror::Error;

use crate::league::{standings::LeaderboardSort, ReportedScore};

/// Who is asking.
///
/// The commissioner's id is an input because the `@them over @them` shorthand is only available to
/// the commissioner.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub poster: &'a str,
    pub commissioner: &'a str,
}

/// A score report pulled out of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReport {
    pub winner_id: String,
    pub loser_id: String,
    pub winner_games: i64,
    pub loser_games: i64,
}

impl ScoreReport {
    /// The reported games, checked against the match's length when committed.
    pub fn score(&self) -> ReportedScore {
        ReportedScore::Games {
            winner: self.winner_games,
            loser: self.loser_games,
        }
    }
}

/// Everything the bot understands in a message addressed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Leaderboard(LeaderboardSort),
    Loserboard,
    Group(String),
    MyStats,
    ReportScore(ScoreReport),
}

/// Why a message could not be turned into a command.
///
/// These are answered with a usage hint, never treated as faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("the message does not match any known command")]
    UnrecognizedFormat,
    #[error("only the commissioner can report a score between two other players")]
    CommissionerOnly,
    #[error("a player cannot report a match against themselves")]
    SelfReport,
    #[error("the score is missing or the winner did not take more games")]
    MalformedScore,
    #[error("no group was given")]
    MissingGroup,
}

#[derive(Debug, PartialEq, Eq)]
enum Side {
    Me,
    Mention(String),
}

impl Side {
    fn parse(token: &str) -> Option<Side> {
        if trim_punctuation(token).eq_ignore_ascii_case("me") {
            return Some(Side::Me);
        }
        parse_mention(token).map(Side::Mention)
    }
}

/// Parses a message, with any bot mention already stripped, into a command.
pub fn parse_command(text: &str, context: &ParseContext<'_>) -> Result<Command, ParseFailure> {
    let text = text.trim();
    let lowered = text.to_lowercase();
    let mut words = lowered.split_whitespace();

    match words.next() {
        Some(word) if word.starts_with("help") => Ok(Command::Help),
        Some("leaderboard") => match words.next() {
            None => Ok(Command::Leaderboard(LeaderboardSort::default())),
            Some(mode) => mode
                .parse()
                .map(Command::Leaderboard)
                .map_err(|_| ParseFailure::UnrecognizedFormat),
        },
        Some("loserboard") => Ok(Command::Loserboard),
        Some("group") => words
            .next()
            .map(|grouping| Command::Group(grouping.to_string()))
            .ok_or(ParseFailure::MissingGroup),
        Some("stats") => Ok(Command::MyStats),
        Some("my") if matches!(lowered.as_str(), "my stats" | "my total stats") => {
            Ok(Command::MyStats)
        }
        _ => parse_score_report(text, context).map(Command::ReportScore),
    }
}

/// Parses `me over @them N-M`, `@them over me N-M`, or the commissioner's `@a over @b N-M`.
pub fn parse_score_report(
    text: &str,
    context: &ParseContext<'_>,
) -> Result<ScoreReport, ParseFailure> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let &[left, over, right, ..] = tokens.as_slice() else {
        return Err(ParseFailure::UnrecognizedFormat);
    };
    if !over.eq_ignore_ascii_case("over") {
        return Err(ParseFailure::UnrecognizedFormat);
    }

    let (Some(left), Some(right)) = (Side::parse(left), Side::parse(right)) else {
        return Err(ParseFailure::UnrecognizedFormat);
    };

    let (winner_id, loser_id) = match (left, right) {
        (Side::Mention(winner), Side::Mention(loser)) => {
            if context.poster != context.commissioner {
                return Err(ParseFailure::CommissionerOnly);
            }
            (winner, loser)
        }
        (Side::Me, Side::Mention(loser)) => (context.poster.to_uppercase(), loser),
        (Side::Mention(winner), Side::Me) => (winner, context.poster.to_uppercase()),
        (Side::Me, Side::Me) => return Err(ParseFailure::SelfReport),
    };

    if winner_id == loser_id {
        return Err(ParseFailure::SelfReport);
    }

    let (winner_games, loser_games) = parse_score(text)?;

    Ok(ScoreReport {
        winner_id,
        loser_id,
        winner_games,
        loser_games,
    })
}

/// Finds the first `N-M` score in the text.
///
/// Only the shape is checked here. Whether the winner took the right number of games depends on
/// the match being reported, so that is checked when the score is committed.
pub fn parse_score(text: &str) -> Result<(i64, i64), ParseFailure> {
    let bytes = text.as_bytes();
    let is_digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);

    let dash = (1..bytes.len().saturating_sub(1)).find(|&i| {
        bytes[i] == b'-'
            && is_digit_at(i - 1)
            && is_digit_at(i + 1)
            && (i < 2 || !is_digit_at(i - 2))
            && !is_digit_at(i + 2)
    });
    let Some(dash) = dash else {
        return Err(ParseFailure::MalformedScore);
    };

    let winner_games = i64::from(bytes[dash - 1] - b'0');
    let loser_games = i64::from(bytes[dash + 1] - b'0');

    if winner_games <= loser_games {
        return Err(ParseFailure::MalformedScore);
    }

    Ok((winner_games, loser_games))
}

/// Extracts the user id from a `<@id>` or `<@!id>` mention. Trailing punctuation is ignored.
pub fn parse_mention(token: &str) -> Option<String> {
    let inner = trim_punctuation(token)
        .strip_prefix("<@")?
        .strip_suffix('>')?;
    let id = inner.strip_prefix('!').unwrap_or(inner);

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(id.to_uppercase())
}

fn trim_punctuation(token: &str) -> &str {
    token.trim_end_matches(|c: char| matches!(c, ',' | '.' | ';' | ':' | '!' | '?'))
}

/// Every mentioned user id in a piece of text, in order.
pub fn mentions(text: &str) -> Vec<String> {
    text.split_whitespace().filter_map(parse_mention).collect()
}
