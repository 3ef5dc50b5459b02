use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A registered ladder player.
///
/// `user_id` is the player's Discord id and the primary key of the `player` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub user_id: String,
    pub name: String,
    pub grouping: String,
    pub active: bool,
    pub order_idx: i64,
}

/// A scheduled or completed match.
///
/// A match without a `player_2` is a bye. A match is complete once it has a winner, at which
/// point `sets` lies within `[sets_needed, 2 * sets_needed - 1]` and `date_played` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Match {
    pub id: i64,
    pub player_1: String,
    pub player_2: Option<String>,
    pub winner: Option<String>,
    pub week: NaiveDate,
    pub grouping: String,
    pub season: i64,
    pub sets: i64,
    pub sets_needed: i64,
    pub date_played: Option<NaiveDate>,
    pub message_sent: bool,
}

impl Match {
    pub fn is_complete(&self) -> bool {
        self.winner.is_some()
    }

    pub fn is_bye(&self) -> bool {
        self.player_2.is_none()
    }

    /// The number of sets played when the match goes the distance.
    pub fn max_sets(&self) -> i64 {
        self.sets_needed * 2 - 1
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.player_1 == user_id || self.player_2.as_deref() == Some(user_id)
    }

    /// True if this match is between the two players, in either order.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        a != b && self.involves(a) && self.involves(b)
    }

    /// The losing player of a completed match.
    pub fn loser(&self) -> Option<&str> {
        let winner = self.winner.as_deref()?;
        if winner == self.player_1 {
            self.player_2.as_deref()
        } else {
            Some(self.player_1.as_str())
        }
    }
}

/// The fields needed to schedule a new match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatch {
    pub player_1: String,
    pub player_2: Option<String>,
    pub week: NaiveDate,
    pub grouping: String,
    pub season: i64,
    pub sets_needed: i64,
}

/// A statement that was executed against a league's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub statement: String,
    pub recorded_at: DateTime<Utc>,
}
