use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    BlockRecord, BoardLayout, Card, CardState, Column, KanbanError, MovementRecord, Rejection,
    WorkflowPolicy,
};
use crate::ledger::{BlockingLedger, MovementLedger};

use super::BoardService;

#[derive(Debug, Clone, Serialize)]
pub struct CardDetails {
    pub card: Card,
    pub column: Column,
    pub blocked: bool,
    pub open_block: Option<BlockRecord>,
    pub block_count: i64,
}

/// A card together with its board layout and open block, read inside the
/// transaction that is about to change it.
struct LoadedCard {
    card: Card,
    layout: BoardLayout,
    open_block: Option<BlockRecord>,
}

impl LoadedCard {
    fn state(&self) -> Result<CardState<'_>, KanbanError> {
        let column = self.layout.get(&self.card.column_id).ok_or_else(|| {
            KanbanError::MalformedHistory(format!(
                "Card {} points at column {} outside its board",
                self.card.id, self.card.column_id
            ))
        })?;
        Ok(CardState::new(
            &self.card.id,
            column,
            usize::from(self.open_block.is_some()),
        ))
    }
}

pub struct CardService;

impl CardService {
    // ── Placement & lookup ─────────────────────────────────────

    /// Puts a new card into the board's INITIAL column.
    pub async fn create_card(
        pool: &SqlitePool,
        board_id: &str,
        title: &str,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<Card, KanbanError> {
        let mut tx = pool.begin().await?;

        let layout = BoardService::board_layout(&mut tx, board_id).await?;
        let card = Card {
            id: Uuid::now_v7().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            column_id: layout.initial().id.clone(),
            created_at: at,
        };

        sqlx::query(
            "INSERT INTO cards (id, title, description, column_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&card.id)
        .bind(&card.title)
        .bind(&card.description)
        .bind(&card.column_id)
        .bind(card.created_at)
        .execute(&mut *tx)
        .await?;

        MovementLedger::record_initial_placement(&mut tx, &card.id, &card.column_id, at).await?;

        tx.commit().await?;

        tracing::info!(
            card_id = card.id.as_str(),
            board_id,
            column_id = card.column_id.as_str(),
            "Card placed on board"
        );

        Ok(card)
    }

    pub async fn get_card(pool: &SqlitePool, card_id: &str) -> Result<Card, KanbanError> {
        let mut conn = pool.acquire().await?;
        Self::card_model(&mut conn, card_id).await
    }

    pub async fn card_model(
        conn: &mut SqliteConnection,
        card_id: &str,
    ) -> Result<Card, KanbanError> {
        sqlx::query_as("SELECT * FROM cards WHERE id = ?")
            .bind(card_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| KanbanError::NotFound(format!("Card not found: {}", card_id)))
    }

    pub async fn list_cards(pool: &SqlitePool, board_id: &str) -> Result<Vec<Card>, KanbanError> {
        let mut conn = pool.acquire().await?;
        Self::cards_on_board(&mut conn, board_id).await
    }

    pub async fn cards_on_board(
        conn: &mut SqliteConnection,
        board_id: &str,
    ) -> Result<Vec<Card>, KanbanError> {
        let cards: Vec<Card> = sqlx::query_as(
            r#"
            SELECT c.id, c.title, c.description, c.column_id, c.created_at
            FROM cards c
            INNER JOIN board_columns bc ON bc.id = c.column_id
            WHERE bc.board_id = ?
            ORDER BY c.id ASC
            "#,
        )
        .bind(board_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(cards)
    }

    /// Cards currently in `column_id`, oldest first.
    pub async fn cards_in_column(
        pool: &SqlitePool,
        column_id: &str,
    ) -> Result<Vec<Card>, KanbanError> {
        let mut conn = pool.acquire().await?;
        // Unknown columns are NotFound rather than an empty list.
        BoardService::layout_for_column(&mut conn, column_id).await?;

        let cards: Vec<Card> = sqlx::query_as(
            "SELECT * FROM cards WHERE column_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(column_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(cards)
    }

    pub async fn card_details(
        pool: &SqlitePool,
        card_id: &str,
    ) -> Result<CardDetails, KanbanError> {
        let mut conn = pool.acquire().await?;
        let loaded = Self::load(&mut conn, card_id).await?;
        let column = loaded.state()?.column.clone();

        let block_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM card_blocks WHERE card_id = ?")
                .bind(card_id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(CardDetails {
            blocked: loaded.open_block.is_some(),
            card: loaded.card,
            column,
            open_block: loaded.open_block,
            block_count,
        })
    }

    // ── Transitions ────────────────────────────────────────────

    /// Advances the card exactly one column.
    pub async fn move_to_next_column(
        pool: &SqlitePool,
        card_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Card, KanbanError> {
        let mut tx = pool.begin().await?;
        let loaded = Self::load(&mut tx, card_id).await?;
        let state = loaded.state()?;

        WorkflowPolicy::check_advance(&state).map_err(|r| Self::rejected(card_id, r))?;
        let target = loaded.layout.next_after(state.column).ok_or_else(|| {
            KanbanError::InvalidTransition(format!(
                "Column {} has no successor",
                state.column.name
            ))
        })?;

        let card = Self::apply_move(&mut tx, &loaded.card, target, at).await?;
        tx.commit().await?;

        Ok(card)
    }

    /// Moves the card into `target_column_id`, which must be the next column
    /// of its board or the board's CANCEL column.
    pub async fn move_card(
        pool: &SqlitePool,
        card_id: &str,
        target_column_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Card, KanbanError> {
        let mut tx = pool.begin().await?;
        let loaded = Self::load(&mut tx, card_id).await?;
        let state = loaded.state()?;
        let target = loaded.layout.require(target_column_id)?;

        WorkflowPolicy::check_move(&state, target).map_err(|r| Self::rejected(card_id, r))?;

        let card = Self::apply_move(&mut tx, &loaded.card, target, at).await?;
        tx.commit().await?;

        Ok(card)
    }

    pub async fn cancel(
        pool: &SqlitePool,
        card_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Card, KanbanError> {
        let mut tx = pool.begin().await?;
        let loaded = Self::load(&mut tx, card_id).await?;
        let state = loaded.state()?;

        WorkflowPolicy::check_cancel(&state).map_err(|r| Self::rejected(card_id, r))?;

        let card = Self::apply_move(&mut tx, &loaded.card, loaded.layout.cancel(), at).await?;
        tx.commit().await?;

        Ok(card)
    }

    pub async fn block(
        pool: &SqlitePool,
        card_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<BlockRecord, KanbanError> {
        let mut tx = pool.begin().await?;
        let loaded = Self::load(&mut tx, card_id).await?;

        WorkflowPolicy::check_block(&loaded.state()?).map_err(|r| Self::rejected(card_id, r))?;

        let record = BlockingLedger::open(&mut tx, card_id, reason, at).await?;
        tx.commit().await?;

        tracing::info!(card_id, reason, "Card blocked");

        Ok(record)
    }

    pub async fn unblock(
        pool: &SqlitePool,
        card_id: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<BlockRecord, KanbanError> {
        let mut tx = pool.begin().await?;
        let loaded = Self::load(&mut tx, card_id).await?;

        WorkflowPolicy::check_unblock(&loaded.state()?).map_err(|r| Self::rejected(card_id, r))?;

        let record = BlockingLedger::close(&mut tx, card_id, reason, at).await?;
        tx.commit().await?;

        tracing::info!(card_id, reason, "Card unblocked");

        Ok(record)
    }

    // ── Internals ──────────────────────────────────────────────

    async fn load(conn: &mut SqliteConnection, card_id: &str) -> Result<LoadedCard, KanbanError> {
        let card = Self::card_model(conn, card_id).await?;
        let layout = BoardService::layout_for_column(conn, &card.column_id).await?;
        let open_block = BlockingLedger::open_block(conn, card_id).await?;

        Ok(LoadedCard {
            card,
            layout,
            open_block,
        })
    }

    /// Ledger append first, pointer update second; both share the caller's
    /// transaction, so a failure in either leaves the card untouched.
    async fn apply_move(
        conn: &mut SqliteConnection,
        card: &Card,
        target: &Column,
        at: DateTime<Utc>,
    ) -> Result<Card, KanbanError> {
        let record: MovementRecord =
            MovementLedger::record_movement(conn, &card.id, &card.column_id, &target.id, at)
                .await?;

        let result = sqlx::query("UPDATE cards SET column_id = ? WHERE id = ?")
            .bind(&target.id)
            .bind(&card.id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(KanbanError::NotFound(format!("Card not found: {}", card.id)));
        }

        tracing::info!(
            card_id = card.id.as_str(),
            from_column = card.column_id.as_str(),
            to_column = target.id.as_str(),
            movement_id = record.id.as_str(),
            "Card moved"
        );

        Ok(Card {
            column_id: target.id.clone(),
            ..card.clone()
        })
    }

    fn rejected(card_id: &str, rejection: Rejection) -> KanbanError {
        let err = rejection.into_error(card_id);
        if err.is_workflow_violation() {
            tracing::warn!(card_id, error = %err, "Transition rejected");
        } else {
            tracing::error!(card_id, error = %err, "Card history is inconsistent");
        }
        err
    }
}
