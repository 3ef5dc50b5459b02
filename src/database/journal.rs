use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use chrono::Utc;
use tracing::debug;

use super::models::JournalEntry;

/// Append-only record of the statements executed against each league's store.
///
/// Scoped to the store that owns it. Entries are never rewritten, only cleared as a whole.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Mutex<HashMap<String, Vec<JournalEntry>>>,
}

impl Journal {
    pub fn record(&self, league: &str, statement: impl Into<String>) {
        let statement = statement.into();
        debug!(league, statement = %statement, "journal");
        self.lock()
            .entry(league.to_string())
            .or_default()
            .push(JournalEntry {
                statement,
                recorded_at: Utc::now(),
            });
    }

    pub fn entries(&self, league: &str) -> Vec<JournalEntry> {
        self.lock().get(league).cloned().unwrap_or_default()
    }

    pub fn clear(&self, league: &str) {
        self.lock().remove(league);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<JournalEntry>>> {
        // A panic while pushing cannot leave a half-written entry behind.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
