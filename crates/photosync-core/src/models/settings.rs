//! Engine settings model

use serde::{Deserialize, Serialize};

/// Small persisted preferences read by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Queue newly discovered device media as `PENDING` instead of `LOCAL`.
    pub auto_upload: bool,
    /// Newest device modification time already reconciled (Unix ms).
    pub last_sync_cursor: Option<i64>,
}

impl Settings {
    /// Advance the cursor, never moving it backwards.
    pub fn advance_cursor(&mut self, candidate: Option<i64>) -> bool {
        match (self.last_sync_cursor, candidate) {
            (_, None) => false,
            (Some(current), Some(candidate)) if candidate <= current => false,
            (_, Some(candidate)) => {
                self.last_sync_cursor = Some(candidate);
                true
            }
        }
    }
}
