use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Board {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub id: String,
    pub title: String,
    pub description: String,
    pub column_id: String,
    pub created_at: DateTime<Utc>,
}

/// One stage transition of a card. The first record of every card has no
/// `from_column_id` and stands for its initial placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MovementRecord {
    pub id: String,
    pub card_id: String,
    pub from_column_id: Option<String>,
    pub to_column_id: String,
    pub moved_at: DateTime<Utc>,
}

impl MovementRecord {
    pub fn is_initial_placement(&self) -> bool {
        self.from_column_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BlockRecord {
    pub id: String,
    pub card_id: String,
    pub blocked_at: DateTime<Utc>,
    pub block_reason: String,
    pub unblocked_at: Option<DateTime<Utc>>,
    pub unblock_reason: Option<String>,
}

impl BlockRecord {
    pub fn is_open(&self) -> bool {
        self.unblocked_at.is_none()
    }
}
