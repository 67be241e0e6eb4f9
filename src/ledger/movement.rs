use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::domain::{KanbanError, MovementRecord};

/// Append-only log of a card's stage transitions.
pub struct MovementLedger;

impl MovementLedger {
    /// Appends the placement record (`from_column_id = NULL`) of a new card.
    pub async fn record_initial_placement(
        conn: &mut SqliteConnection,
        card_id: &str,
        column_id: &str,
        at: DateTime<Utc>,
    ) -> Result<MovementRecord, KanbanError> {
        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM card_movements WHERE card_id = ?")
                .bind(card_id)
                .fetch_one(&mut *conn)
                .await?;

        if existing > 0 {
            return Err(KanbanError::MalformedHistory(format!(
                "Card {} already has {} movement records, cannot place it again",
                card_id, existing
            )));
        }

        let record = MovementRecord {
            id: Uuid::now_v7().to_string(),
            card_id: card_id.to_string(),
            from_column_id: None,
            to_column_id: column_id.to_string(),
            moved_at: at,
        };
        Self::insert(conn, &record).await?;

        Ok(record)
    }

    /// Appends a transition. `at` must be strictly after the card's latest
    /// record and `from_column_id` must be where that record left the card.
    pub async fn record_movement(
        conn: &mut SqliteConnection,
        card_id: &str,
        from_column_id: &str,
        to_column_id: &str,
        at: DateTime<Utc>,
    ) -> Result<MovementRecord, KanbanError> {
        let history = Self::history(conn, card_id).await?;
        let last = history.last().ok_or_else(|| {
            KanbanError::MalformedHistory(format!(
                "Card {} has no initial placement to move from",
                card_id
            ))
        })?;

        if at <= last.moved_at {
            return Err(KanbanError::MalformedHistory(format!(
                "Movement of card {} at {} is not after its latest record at {}",
                card_id,
                at.to_rfc3339(),
                last.moved_at.to_rfc3339()
            )));
        }

        if last.to_column_id != from_column_id {
            return Err(KanbanError::MalformedHistory(format!(
                "Card {} is recorded in column {}, not {}",
                card_id, last.to_column_id, from_column_id
            )));
        }

        let record = MovementRecord {
            id: Uuid::now_v7().to_string(),
            card_id: card_id.to_string(),
            from_column_id: Some(from_column_id.to_string()),
            to_column_id: to_column_id.to_string(),
            moved_at: at,
        };
        Self::insert(conn, &record).await?;

        Ok(record)
    }

    /// Full history of one card, oldest first. Every call re-reads the ledger.
    pub async fn history(
        conn: &mut SqliteConnection,
        card_id: &str,
    ) -> Result<Vec<MovementRecord>, KanbanError> {
        let mut records: Vec<MovementRecord> = sqlx::query_as(
            "SELECT * FROM card_movements WHERE card_id = ? ORDER BY moved_at ASC, id ASC",
        )
        .bind(card_id)
        .fetch_all(&mut *conn)
        .await?;

        records.sort_by_key(|r| r.moved_at);
        Ok(records)
    }

    /// Movement records of every card currently on `board_id`, oldest first.
    pub async fn history_for_board(
        conn: &mut SqliteConnection,
        board_id: &str,
    ) -> Result<Vec<MovementRecord>, KanbanError> {
        let mut records: Vec<MovementRecord> = sqlx::query_as(
            r#"
            SELECT m.id, m.card_id, m.from_column_id, m.to_column_id, m.moved_at
            FROM card_movements m
            INNER JOIN cards c ON c.id = m.card_id
            INNER JOIN board_columns bc ON bc.id = c.column_id
            WHERE bc.board_id = ?
            ORDER BY m.moved_at ASC, m.id ASC
            "#,
        )
        .bind(board_id)
        .fetch_all(&mut *conn)
        .await?;

        records.sort_by_key(|r| r.moved_at);
        Ok(records)
    }

    async fn insert(
        conn: &mut SqliteConnection,
        record: &MovementRecord,
    ) -> Result<(), KanbanError> {
        sqlx::query(
            "INSERT INTO card_movements (id, card_id, from_column_id, to_column_id, moved_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.card_id)
        .bind(&record.from_column_id)
        .bind(&record.to_column_id)
        .bind(record.moved_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
