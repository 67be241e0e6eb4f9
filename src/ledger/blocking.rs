use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::domain::{BlockRecord, KanbanError};

/// Append-only log of block/unblock intervals. A card has at most one open
/// record (`unblocked_at IS NULL`) at any time, and its intervals never
/// overlap or start before the card's placement.
pub struct BlockingLedger;

impl BlockingLedger {
    pub async fn open(
        conn: &mut SqliteConnection,
        card_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<BlockRecord, KanbanError> {
        if let Some(open) = Self::open_block(conn, card_id).await? {
            return Err(KanbanError::CardAlreadyBlocked(format!(
                "Card {} has been blocked since {}",
                card_id,
                open.blocked_at.to_rfc3339()
            )));
        }

        let placed_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT moved_at FROM card_movements WHERE card_id = ? AND from_column_id IS NULL",
        )
        .bind(card_id)
        .fetch_optional(&mut *conn)
        .await?;
        let placed_at = placed_at.ok_or_else(|| {
            KanbanError::MalformedHistory(format!(
                "Card {} has no initial placement to block",
                card_id
            ))
        })?;
        if at < placed_at {
            return Err(KanbanError::MalformedHistory(format!(
                "Card {} cannot be blocked at {}, before it was placed at {}",
                card_id,
                at.to_rfc3339(),
                placed_at.to_rfc3339()
            )));
        }

        let last_unblocked = Self::history(conn, card_id)
            .await?
            .into_iter()
            .filter_map(|b| b.unblocked_at)
            .max();
        if let Some(last_unblocked) = last_unblocked {
            if at < last_unblocked {
                return Err(KanbanError::MalformedHistory(format!(
                    "Card {} cannot be blocked at {}, inside a block that ended at {}",
                    card_id,
                    at.to_rfc3339(),
                    last_unblocked.to_rfc3339()
                )));
            }
        }

        let record = BlockRecord {
            id: Uuid::now_v7().to_string(),
            card_id: card_id.to_string(),
            blocked_at: at,
            block_reason: reason.to_string(),
            unblocked_at: None,
            unblock_reason: None,
        };

        sqlx::query(
            "INSERT INTO card_blocks (id, card_id, blocked_at, block_reason) VALUES (?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.card_id)
        .bind(record.blocked_at)
        .bind(&record.block_reason)
        .execute(&mut *conn)
        .await?;

        Ok(record)
    }

    /// Closes the single open record of the card.
    pub async fn close(
        conn: &mut SqliteConnection,
        card_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<BlockRecord, KanbanError> {
        let mut record = Self::open_block(conn, card_id)
            .await?
            .ok_or_else(|| {
                KanbanError::CardNotBlocked(format!("Card {} has no open block", card_id))
            })?;

        if at < record.blocked_at {
            return Err(KanbanError::MalformedHistory(format!(
                "Card {} cannot be unblocked at {}, before it was blocked at {}",
                card_id,
                at.to_rfc3339(),
                record.blocked_at.to_rfc3339()
            )));
        }

        sqlx::query(
            "UPDATE card_blocks SET unblocked_at = ?, unblock_reason = ? WHERE id = ? AND unblocked_at IS NULL",
        )
        .bind(at)
        .bind(reason)
        .bind(&record.id)
        .execute(&mut *conn)
        .await?;

        record.unblocked_at = Some(at);
        record.unblock_reason = Some(reason.to_string());
        Ok(record)
    }

    pub async fn open_block(
        conn: &mut SqliteConnection,
        card_id: &str,
    ) -> Result<Option<BlockRecord>, KanbanError> {
        let mut open: Vec<BlockRecord> = sqlx::query_as(
            "SELECT * FROM card_blocks WHERE card_id = ? AND unblocked_at IS NULL",
        )
        .bind(card_id)
        .fetch_all(&mut *conn)
        .await?;

        if open.len() > 1 {
            return Err(KanbanError::MalformedHistory(format!(
                "Card {} has {} open blocks",
                card_id,
                open.len()
            )));
        }

        Ok(open.pop())
    }

    /// Full block history of one card, oldest first.
    pub async fn history(
        conn: &mut SqliteConnection,
        card_id: &str,
    ) -> Result<Vec<BlockRecord>, KanbanError> {
        let mut records: Vec<BlockRecord> = sqlx::query_as(
            "SELECT * FROM card_blocks WHERE card_id = ? ORDER BY blocked_at ASC, id ASC",
        )
        .bind(card_id)
        .fetch_all(&mut *conn)
        .await?;

        records.sort_by_key(|r| r.blocked_at);
        Ok(records)
    }

    /// Block records of every card currently on `board_id`.
    pub async fn history_for_board(
        conn: &mut SqliteConnection,
        board_id: &str,
    ) -> Result<Vec<BlockRecord>, KanbanError> {
        let mut records: Vec<BlockRecord> = sqlx::query_as(
            r#"
            SELECT b.id, b.card_id, b.blocked_at, b.block_reason, b.unblocked_at, b.unblock_reason
            FROM card_blocks b
            INNER JOIN cards c ON c.id = b.card_id
            INNER JOIN board_columns bc ON bc.id = c.column_id
            WHERE bc.board_id = ?
            ORDER BY b.card_id ASC, b.blocked_at ASC
            "#,
        )
        .bind(board_id)
        .fetch_all(&mut *conn)
        .await?;

        records.sort_by(|a, b| {
            a.card_id
                .cmp(&b.card_id)
                .then_with(|| a.blocked_at.cmp(&b.blocked_at))
        });
        Ok(records)
    }
}
