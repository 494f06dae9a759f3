use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user's ongoing conversation thread.
///
/// A user owns at most one session in practice. This is kept by
/// `get_or_create_session`, not by a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(user_id: Uuid) -> Self {
        let now = super::now_micros();
        Self {
            id: Uuid::now_v7(),
            user_id,
            started_at: now,
            last_active: now,
        }
    }
}
