use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::Local;
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver};
use tracing::{debug, error, info, instrument};

use crate::{
    commands::parser::{parse_command, Command, ParseContext, ScoreReport},
    config::LeagueContext,
    database::{MatchDatabase, PlayerDatabase, SqliteDatabase},
    league::{
        commit_score,
        render::{render_group, render_leaderboard, render_record},
        standings::{group_standings, leaderboard, player_record, LeaderboardSort},
        CommitOutcome,
    },
    log::{commissioner_log_error, commissioner_log_info},
    BotError,
};

use self::{
    router::{filter_messages, ChannelKind, EligibleMessage, InboundMessage},
    transport::{ChatTransport, Reaction},
};

/// Forwards Discord gateway events into the bot's inbox.
pub mod gateway;
/// Decides which inbound messages the bot answers.
pub mod router;
/// Outbound side of the chat platform.
pub mod transport;

/// How long the bot sleeps between inbox polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const NOT_A_MATCH: &str = "Not a match I have (or I messed up).";
const NOT_A_GROUP: &str = "Not a group (or I messed up).";
const DM_REPORT: &str = "Nice try, you have to put this in the main channel";

/// Answers league messages for a single league.
pub struct Bot<T: ChatTransport> {
    database: Arc<SqliteDatabase>,
    transport: T,
    league: String,
}

impl<T: ChatTransport> Bot<T> {
    pub fn new(database: Arc<SqliteDatabase>, transport: T, league: impl Into<String>) -> Self {
        Self {
            database,
            transport,
            league: league.into(),
        }
    }

    /// Polls the inbox until every sender is gone.
    ///
    /// Messages are handled one batch at a time, in the order they arrived.
    pub async fn run(&self, mut inbox: UnboundedReceiver<InboundMessage>) -> Result<(), BotError> {
        info!("Ladder bot is running for league {}", self.league);

        loop {
            let mut batch = Vec::new();
            let closed = loop {
                match inbox.try_recv() {
                    Ok(message) => batch.push(message),
                    Err(TryRecvError::Empty) => break false,
                    Err(TryRecvError::Disconnected) => break true,
                }
            };

            if !batch.is_empty() {
                if let Err(e) = self.process_batch(batch).await {
                    error!("Unable to process messages for {}: {:?}", self.league, e);
                }
            }

            if closed {
                return Err(anyhow!("The message inbox for {} was closed", self.league));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Filters a batch and handles each eligible message.
    ///
    /// A message that fails is reacted to with a failure mark and the rest of the batch carries on.
    pub async fn process_batch(&self, messages: Vec<InboundMessage>) -> Result<(), BotError> {
        let context = LeagueContext::load(&self.database, &self.league).await?;

        for message in filter_messages(messages, &context) {
            if let Err(e) = self.handle_message(&context, &message).await {
                error!("Error handling {:?}: {:?}", message.text, e);
                if let Err(e) = self
                    .transport
                    .add_reaction(&message.channel, &message.timestamp, Reaction::Failure)
                    .await
                {
                    error!("Unable to react to {}: {:?}", message.timestamp, e);
                }
            }
        }

        Ok(())
    }

    #[instrument(skip(self, context), fields(league = %context.league))]
    pub async fn handle_message(
        &self,
        context: &LeagueContext,
        message: &EligibleMessage,
    ) -> Result<(), BotError> {
        let parse_context = ParseContext {
            poster: &message.user,
            commissioner: &context.commissioner_id,
        };

        let command = match parse_command(&message.text, &parse_context) {
            Ok(command) => command,
            Err(failure) => {
                debug!("Unable to parse {:?}: {}", message.text, failure);
                return self
                    .reply(message, &format_hint(context))
                    .await;
            }
        };

        match command {
            Command::Help => {
                let help = match message.kind {
                    ChannelKind::DirectMessage => dm_help(context),
                    _ => channel_help(context),
                };
                self.reply(message, &help).await
            }
            Command::Leaderboard(sort) => self.post_leaderboard(message, sort, false).await,
            Command::Loserboard => {
                self.post_leaderboard(message, LeaderboardSort::Winrate, true)
                    .await
            }
            Command::Group(grouping) => self.post_group(message, &grouping).await,
            Command::MyStats => self.post_stats(message).await,
            Command::ReportScore(_) if message.kind == ChannelKind::DirectMessage => {
                self.reply(message, DM_REPORT).await
            }
            Command::ReportScore(report) => self.enter_score(context, message, &report).await,
        }
    }

    async fn reply(&self, message: &EligibleMessage, text: &str) -> Result<(), BotError> {
        self.transport.send_message(&message.channel, text).await
    }

    async fn react(&self, message: &EligibleMessage, reaction: Reaction) -> Result<(), BotError> {
        self.transport
            .add_reaction(&message.channel, &message.timestamp, reaction)
            .await
    }

    async fn post_leaderboard(
        &self,
        message: &EligibleMessage,
        sort: LeaderboardSort,
        ascending: bool,
    ) -> Result<(), BotError> {
        let matches = self.database.get_matches(&self.league).await?;
        let players = self.database.get_players(&self.league).await?;
        let entries = leaderboard(&matches, &players, sort, ascending);

        let title = if ascending {
            "Loserboard".to_string()
        } else {
            format!("Leaderboard (by {})", sort)
        };
        self.reply(message, &render_leaderboard(&title, &entries))
            .await
    }

    async fn post_group(&self, message: &EligibleMessage, grouping: &str) -> Result<(), BotError> {
        let season = self.database.get_current_season(&self.league).await?;
        let matches = self
            .database
            .get_matches_for_season(&self.league, season)
            .await?;
        let players = self.database.get_players(&self.league).await?;

        match group_standings(&matches, &players, grouping) {
            Some(standings) => {
                self.reply(message, &render_group(grouping, &standings))
                    .await
            }
            None => {
                debug!("No matches for group {} in season {}", grouping, season);
                self.reply(message, NOT_A_GROUP).await
            }
        }
    }

    async fn post_stats(&self, message: &EligibleMessage) -> Result<(), BotError> {
        let Some(player) = self
            .database
            .get_player_by_id(&self.league, &message.user)
            .await?
        else {
            return self
                .reply(message, "You are not registered in this league.")
                .await;
        };

        let matches = self.database.get_matches(&self.league).await?;
        let record = player_record(&matches, &player.user_id);
        self.reply(message, &render_record(&player.name, &record))
            .await
    }

    async fn enter_score(
        &self,
        context: &LeagueContext,
        message: &EligibleMessage,
        report: &ScoreReport,
    ) -> Result<(), BotError> {
        let outcome = commit_score(
            &*self.database,
            &self.league,
            &report.winner_id,
            &report.loser_id,
            report.score(),
            Local::now().date_naive(),
        )
        .await;

        match outcome {
            Ok(CommitOutcome::Recorded(recorded)) => {
                // The score is already stored, so a closed commissioner inbox must not undo the reply.
                if let Err(e) = commissioner_log_info(
                    &self.transport,
                    context,
                    "Entered into db",
                    vec![
                        ("Winner", format!("<@{}>", report.winner_id)),
                        ("Loser", format!("<@{}>", report.loser_id)),
                        ("Sets", recorded.sets.to_string()),
                    ],
                )
                .await
                {
                    error!("Unable to tell the commissioner about match {}: {:?}", recorded.id, e);
                }
                self.react(message, Reaction::Success).await?;
                self.post_group(message, &recorded.grouping).await
            }
            Ok(CommitOutcome::IllegalScore { .. }) => {
                debug!("{:?} does not finish the scheduled match", report);
                self.reply(message, &format_hint(context)).await
            }
            Ok(outcome) => {
                info!("Rejected score report {:?}: {:?}", report, outcome);
                self.reply(message, NOT_A_MATCH).await?;
                self.react(message, Reaction::Failure).await
            }
            Err(e) => {
                if let Err(dm_error) = commissioner_log_error(
                    &self.transport,
                    context,
                    "Failed to enter into db",
                    vec![
                        ("Report", message.text.clone()),
                        ("Error", e.to_string()),
                    ],
                )
                .await
                {
                    error!("Unable to tell the commissioner about {:?}: {:?}", e, dm_error);
                }
                self.react(message, Reaction::Failure).await
            }
        }
    }
}

fn format_hint(context: &LeagueContext) -> String {
    format!(
        "Didn't catch that. The format is `{bot} me over @them {ex}` or `{bot} @them over me {ex}`.",
        bot = context.bot_name,
        ex = context.score_example
    )
}

fn channel_help(context: &LeagueContext) -> String {
    let bot = &context.bot_name;
    let ex = &context.score_example;
    [
        "In the channel, I support the following:".to_string(),
        format!("`{bot} me over @them {ex}` or `{bot} @them over me {ex}` - report a score"),
        format!("`{bot} group [a, b, c, etc]` - see the current rankings of a group"),
        format!("`{bot} leaderboard [matches, sets, winrate]` - see the leaderboard, sorted by matches, sets, or winrate"),
        format!("`{bot} loserboard` - see the loserboard, sorted by winrate"),
        format!("`{bot} my total stats` - see your total win/loss record for the league"),
    ]
    .join("\n")
}

fn dm_help(_context: &LeagueContext) -> String {
    [
        "In DMs, I support the following:",
        "`group [a, b, c, etc]` - see the current rankings of a group",
        "`leaderboard [matches, sets, winrate]` - see the leaderboard, sorted by matches, sets, or winrate",
        "`my total stats` - see your total win/loss record for the league",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tokio::sync::mpsc;

    use super::{
        router::tests::{direct, message},
        transport::tests::RecordingTransport,
        *,
    };
    use crate::{
        config::ConfigKey,
        database::{models::NewMatch, ConfigDatabase},
    };

    const LEAGUE: &str = "test";

    async fn league() -> Arc<SqliteDatabase> {
        let db = SqliteDatabase::in_memory();
        db.set_config(LEAGUE, ConfigKey::BotUserId, "BOT").await.unwrap();
        db.set_config(LEAGUE, ConfigKey::CommissionerId, "C0").await.unwrap();
        db.set_config(LEAGUE, ConfigKey::CompetitionChannelId, "COMP")
            .await
            .unwrap();
        db.add_player(LEAGUE, "A", "Alice", "a").await.unwrap();
        db.add_player(LEAGUE, "B", "Bob", "a").await.unwrap();
        db.add_match(
            LEAGUE,
            &NewMatch {
                player_1: "A".to_string(),
                player_2: Some("B".to_string()),
                week: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                grouping: "a".to_string(),
                season: 1,
                sets_needed: 2,
            },
        )
        .await
        .unwrap();
        Arc::new(db)
    }

    fn bot(db: Arc<SqliteDatabase>, transport: RecordingTransport) -> Bot<RecordingTransport> {
        Bot::new(db, transport, LEAGUE)
    }

    #[tokio::test]
    async fn reported_score_is_recorded_and_standings_posted() {
        let db = league().await;
        let bot = bot(db.clone(), RecordingTransport::default());

        bot.process_batch(vec![message("COMP", "B", "<@BOT> me over <@A> 2-1")])
            .await
            .unwrap();

        let recorded = db.get_match_by_players(LEAGUE, "A", "B").await.unwrap().unwrap();
        assert_eq!(recorded.winner.as_deref(), Some("B"));
        assert_eq!(recorded.sets, 3);
        assert!(recorded.date_played.is_some());

        assert_eq!(bot.transport.reactions(), vec![Reaction::Success]);
        let directs = bot.transport.directs();
        assert_eq!(directs.len(), 1);
        assert_eq!(directs[0].0, "C0");
        assert!(directs[0].1.starts_with("Entered into db"));

        let messages = bot.transport.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Group A:"));

        let matches = db.get_matches_for_season(LEAGUE, 1).await.unwrap();
        let players = db.get_players(LEAGUE).await.unwrap();
        let standings = group_standings(&matches, &players, "a").unwrap();
        assert_eq!(standings[0].user_id, "B");
        assert_eq!(standings[0].record.match_wins, 1);
        assert_eq!(standings[0].record.set_wins, 2);
        assert_eq!(standings[1].user_id, "A");
        assert_eq!(standings[1].record.set_wins, 1);
    }

    #[tokio::test]
    async fn shorthand_from_a_player_gets_the_format_hint() {
        let db = league().await;
        let bot = bot(db.clone(), RecordingTransport::default());

        bot.process_batch(vec![message("COMP", "B", "<@BOT> <@B> over <@A> 2-0")])
            .await
            .unwrap();

        assert_eq!(
            bot.transport.messages(),
            vec!["Didn't catch that. The format is `@ladder me over @them 2-1` or `@ladder @them over me 2-1`."]
        );
        let open = db.get_match_by_players(LEAGUE, "A", "B").await.unwrap().unwrap();
        assert!(!open.is_complete());
    }

    #[tokio::test]
    async fn commissioner_can_report_for_others() {
        let db = league().await;
        let bot = bot(db.clone(), RecordingTransport::default());

        bot.process_batch(vec![message("COMP", "C0", "<@BOT> <@A> over <@B> 2-0")])
            .await
            .unwrap();

        let recorded = db.get_match_by_players(LEAGUE, "A", "B").await.unwrap().unwrap();
        assert_eq!(recorded.winner.as_deref(), Some("A"));
        assert_eq!(recorded.sets, 2);
    }

    #[tokio::test]
    async fn direct_messages_are_answered_without_a_mention() {
        let db = league().await;
        let bot = bot(db, RecordingTransport::default());

        bot.process_batch(vec![
            direct("A", "help"),
            message("COMP", "A", "help"),
        ])
        .await
        .unwrap();

        let messages = bot.transport.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("In DMs, I support the following:"));
    }

    #[tokio::test]
    async fn channel_help_uses_the_configured_bot_name() {
        let db = league().await;
        db.set_config(LEAGUE, ConfigKey::BotName, "@smash").await.unwrap();
        let bot = bot(db, RecordingTransport::default());

        bot.process_batch(vec![message("COMP", "A", "<@BOT> help")])
            .await
            .unwrap();

        let messages = bot.transport.messages();
        assert!(messages[0].starts_with("In the channel, I support the following:"));
        assert!(messages[0].contains("`@smash me over @them 2-1`"));
    }

    #[tokio::test]
    async fn scores_sent_by_direct_message_are_refused() {
        let db = league().await;
        let bot = bot(db.clone(), RecordingTransport::default());

        bot.process_batch(vec![direct("B", "me over <@A> 2-1")])
            .await
            .unwrap();

        assert_eq!(bot.transport.messages(), vec![DM_REPORT]);
        let open = db.get_match_by_players(LEAGUE, "A", "B").await.unwrap().unwrap();
        assert!(!open.is_complete());
    }

    #[tokio::test]
    async fn unscheduled_pairs_are_rejected() {
        let db = league().await;
        db.add_player(LEAGUE, "C", "Carol", "b").await.unwrap();
        let bot = bot(db, RecordingTransport::default());

        bot.process_batch(vec![message("COMP", "C", "<@BOT> me over <@A> 2-0")])
            .await
            .unwrap();

        assert_eq!(bot.transport.messages(), vec![NOT_A_MATCH]);
        assert_eq!(bot.transport.reactions(), vec![Reaction::Failure]);
        assert!(bot.transport.directs().is_empty());
    }

    #[tokio::test]
    async fn group_queries() {
        let db = league().await;
        let bot = bot(db, RecordingTransport::default());

        bot.process_batch(vec![
            message("COMP", "A", "<@BOT> group A"),
            message("COMP", "A", "<@BOT> group z"),
        ])
        .await
        .unwrap();

        let messages = bot.transport.messages();
        assert!(messages[0].starts_with("Group A:"));
        assert!(messages[0].contains("Alice"));
        assert_eq!(messages[1], NOT_A_GROUP);
    }

    #[tokio::test]
    async fn stats_need_a_registered_player() {
        let db = league().await;
        let bot = bot(db, RecordingTransport::default());

        bot.process_batch(vec![direct("A", "my total stats"), direct("Z", "my total stats")])
            .await
            .unwrap();

        let messages = bot.transport.messages();
        assert_eq!(messages[0], "Alice has no completed matches yet.");
        assert_eq!(messages[1], "You are not registered in this league.");
    }

    #[tokio::test]
    async fn leaderboards_follow_recorded_scores() {
        let db = league().await;
        let bot = bot(db, RecordingTransport::default());

        bot.process_batch(vec![
            message("COMP", "A", "<@BOT> me over <@B> 2-0"),
            direct("A", "leaderboard"),
            direct("A", "loserboard"),
        ])
        .await
        .unwrap();

        let messages = bot.transport.messages();
        let board = &messages[1];
        assert!(board.starts_with("Leaderboard (by winrate):"));
        assert!(board.find("Alice").unwrap() < board.find("Bob").unwrap());
        let loserboard = &messages[2];
        assert!(loserboard.starts_with("Loserboard:"));
        assert!(loserboard.find("Bob").unwrap() < loserboard.find("Alice").unwrap());
    }

    #[tokio::test]
    async fn failed_sends_are_marked_and_the_batch_continues() {
        let db = league().await;
        let transport = RecordingTransport {
            fail_sends: true,
            ..RecordingTransport::default()
        };
        let bot = bot(db, transport);

        bot.process_batch(vec![direct("A", "help"), direct("B", "leaderboard")])
            .await
            .unwrap();

        assert_eq!(
            bot.transport.reactions(),
            vec![Reaction::Failure, Reaction::Failure]
        );
    }

    #[tokio::test]
    async fn missing_config_fails_the_batch() {
        let bot = bot(Arc::new(SqliteDatabase::in_memory()), RecordingTransport::default());
        assert!(bot.process_batch(vec![direct("A", "help")]).await.is_err());
        assert!(bot.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn run_drains_the_inbox_until_it_closes() {
        let db = league().await;
        let bot = bot(db, RecordingTransport::default());
        let (sender, inbox) = mpsc::unbounded_channel();

        sender.send(direct("A", "help")).unwrap();
        sender.send(message("elsewhere", "A", "<@BOT> help")).unwrap();
        drop(sender);

        assert!(bot.run(inbox).await.is_err());
        assert_eq!(bot.transport.messages().len(), 1);
    }

    #[tokio::test]
    async fn reports_are_checked_against_the_match_length() {
        let db = league().await;
        db.add_player(LEAGUE, "C", "Carol", "a").await.unwrap();
        db.add_match(
            LEAGUE,
            &NewMatch {
                player_1: "A".to_string(),
                player_2: Some("C".to_string()),
                week: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                grouping: "a".to_string(),
                season: 1,
                sets_needed: 3,
            },
        )
        .await
        .unwrap();
        let bot = bot(db.clone(), RecordingTransport::default());

        bot.process_batch(vec![message("COMP", "C", "<@BOT> me over <@A> 2-1")])
            .await
            .unwrap();
        let open = db.get_match_by_players(LEAGUE, "A", "C").await.unwrap().unwrap();
        assert!(!open.is_complete());
        assert!(bot.transport.messages()[0].starts_with("Didn't catch that."));
        assert!(bot.transport.reactions().is_empty());

        bot.process_batch(vec![message("COMP", "C", "<@BOT> me over <@A> 3-1")])
            .await
            .unwrap();
        let recorded = db.get_match_by_players(LEAGUE, "A", "C").await.unwrap().unwrap();
        assert_eq!(recorded.winner.as_deref(), Some("C"));
        assert_eq!(recorded.sets, 4);
        assert_eq!(bot.transport.reactions(), vec![Reaction::Success]);
        assert!(bot.transport.messages()[1].starts_with("Group A:"));
    }

    #[tokio::test]
    async fn store_faults_are_reported_to_the_commissioner() {
        let db = league().await;
        db.execute_raw(LEAGUE, r#"DROP TABLE "match""#).await.unwrap();
        let bot = bot(db, RecordingTransport::default());

        bot.process_batch(vec![message("COMP", "B", "<@BOT> me over <@A> 2-1")])
            .await
            .unwrap();

        let directs = bot.transport.directs();
        assert_eq!(directs.len(), 1);
        assert_eq!(directs[0].0, "C0");
        assert!(directs[0].1.starts_with("⚠️ Failed to enter into db"));
        assert_eq!(bot.transport.reactions(), vec![Reaction::Failure]);
        assert!(bot.transport.messages().is_empty());
    }

    #[tokio::test]
    async fn recorded_score_is_confirmed_when_the_commissioner_is_unreachable() {
        let db = league().await;
        let transport = RecordingTransport {
            fail_directs: true,
            ..RecordingTransport::default()
        };
        let bot = bot(db.clone(), transport);

        bot.process_batch(vec![message("COMP", "B", "<@BOT> me over <@A> 2-1")])
            .await
            .unwrap();

        let recorded = db.get_match_by_players(LEAGUE, "A", "B").await.unwrap().unwrap();
        assert_eq!(recorded.winner.as_deref(), Some("B"));
        assert_eq!(bot.transport.reactions(), vec![Reaction::Success]);
        assert!(bot.transport.messages()[0].starts_with("Group A:"));
    }
}
