use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{Board, BoardLayout, Column, ColumnKind, KanbanError};

/// A column to create; its order is its position in the list.
#[derive(Debug, Clone, Deserialize)]
pub struct NewColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl NewColumn {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Initial, one standard stage, final, cancel.
    pub fn default_set() -> Vec<NewColumn> {
        vec![
            NewColumn::new("Backlog", ColumnKind::Initial),
            NewColumn::new("In Progress", ColumnKind::Standard),
            NewColumn::new("Done", ColumnKind::Final),
            NewColumn::new("Cancelled", ColumnKind::Cancel),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardDetails {
    pub board: Board,
    pub layout: BoardLayout,
}

/// A column with the number of cards currently in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSummary {
    #[serde(flatten)]
    pub column: Column,
    pub card_count: i64,
}

pub struct BoardService;

impl BoardService {
    pub async fn create_board(
        pool: &SqlitePool,
        name: &str,
        columns: &[NewColumn],
        at: DateTime<Utc>,
    ) -> Result<BoardDetails, KanbanError> {
        let board = Board {
            id: Uuid::now_v7().to_string(),
            name: Self::board_name(name)?,
            created_at: at,
        };

        let columns: Vec<Column> = (0_i64..)
            .zip(columns)
            .map(|(order, c)| Column {
                id: Uuid::now_v7().to_string(),
                board_id: board.id.clone(),
                name: c.name.clone(),
                order,
                kind: c.kind,
            })
            .collect();
        let layout = BoardLayout::new(&board.id, columns)?;

        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO boards (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&board.id)
            .bind(&board.name)
            .bind(board.created_at)
            .execute(&mut *tx)
            .await?;

        for column in layout.columns() {
            sqlx::query(
                "INSERT INTO board_columns (id, board_id, name, column_order, kind) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&column.id)
            .bind(&column.board_id)
            .bind(&column.name)
            .bind(column.order)
            .bind(column.kind)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            board_id = board.id.as_str(),
            columns = layout.columns().len(),
            "Board created"
        );

        Ok(BoardDetails { board, layout })
    }

    pub async fn list_boards(pool: &SqlitePool) -> Result<Vec<Board>, KanbanError> {
        let boards: Vec<Board> =
            sqlx::query_as("SELECT * FROM boards ORDER BY created_at ASC, id ASC")
                .fetch_all(pool)
                .await?;

        Ok(boards)
    }

    pub async fn count_boards(pool: &SqlitePool) -> Result<i64, KanbanError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM boards")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    pub async fn rename_board(
        pool: &SqlitePool,
        board_id: &str,
        name: &str,
    ) -> Result<Board, KanbanError> {
        let name = Self::board_name(name)?;

        let result = sqlx::query("UPDATE boards SET name = ? WHERE id = ?")
            .bind(&name)
            .bind(board_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(KanbanError::NotFound(format!("Board not found: {}", board_id)));
        }

        tracing::info!(board_id, name = name.as_str(), "Board renamed");

        let mut conn = pool.acquire().await?;
        Self::board_model(&mut conn, board_id).await
    }

    /// Removes the board with its columns, its cards and their movement and
    /// block history. Returns the number of cards removed.
    pub async fn delete_board(pool: &SqlitePool, board_id: &str) -> Result<u64, KanbanError> {
        let mut tx = pool.begin().await?;
        Self::board_model(&mut tx, board_id).await?;

        let on_board = "SELECT c.id FROM cards c \
            INNER JOIN board_columns bc ON bc.id = c.column_id WHERE bc.board_id = ?";

        sqlx::query(&format!("DELETE FROM card_blocks WHERE card_id IN ({})", on_board))
            .bind(board_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM card_movements WHERE card_id IN ({})", on_board))
            .bind(board_id)
            .execute(&mut *tx)
            .await?;
        let cards = sqlx::query(
            "DELETE FROM cards WHERE column_id IN (SELECT id FROM board_columns WHERE board_id = ?)",
        )
        .bind(board_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query("DELETE FROM board_columns WHERE board_id = ?")
            .bind(board_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM boards WHERE id = ?")
            .bind(board_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(board_id, cards, "Board deleted");

        Ok(cards)
    }

    /// Columns of the board in order, each with its current card count.
    pub async fn column_summaries(
        pool: &SqlitePool,
        board_id: &str,
    ) -> Result<Vec<ColumnSummary>, KanbanError> {
        let mut conn = pool.acquire().await?;
        let layout = Self::board_layout(&mut conn, board_id).await?;

        let counts: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT bc.id, COUNT(c.id)
            FROM board_columns bc
            LEFT JOIN cards c ON c.column_id = bc.id
            WHERE bc.board_id = ?
            GROUP BY bc.id
            "#,
        )
        .bind(board_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(layout
            .columns()
            .iter()
            .map(|column| ColumnSummary {
                card_count: counts
                    .iter()
                    .find(|(id, _)| *id == column.id)
                    .map_or(0, |(_, count)| *count),
                column: column.clone(),
            })
            .collect())
    }

    pub async fn get_board(pool: &SqlitePool, board_id: &str) -> Result<BoardDetails, KanbanError> {
        let mut conn = pool.acquire().await?;
        let board = Self::board_model(&mut conn, board_id).await?;
        let layout = Self::board_layout(&mut conn, board_id).await?;

        Ok(BoardDetails { board, layout })
    }

    pub async fn board_model(
        conn: &mut SqliteConnection,
        board_id: &str,
    ) -> Result<Board, KanbanError> {
        sqlx::query_as("SELECT * FROM boards WHERE id = ?")
            .bind(board_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| KanbanError::NotFound(format!("Board not found: {}", board_id)))
    }

    /// Column lookup of a board, validated against the layout rules.
    pub async fn board_layout(
        conn: &mut SqliteConnection,
        board_id: &str,
    ) -> Result<BoardLayout, KanbanError> {
        let columns: Vec<Column> = sqlx::query_as(
            "SELECT * FROM board_columns WHERE board_id = ? ORDER BY column_order ASC",
        )
        .bind(board_id)
        .fetch_all(&mut *conn)
        .await?;

        if columns.is_empty() {
            // Distinguish an unknown board from a board stored without columns.
            Self::board_model(conn, board_id).await?;
        }

        BoardLayout::new(board_id, columns)
    }

    /// Layout of the board that owns `column_id`.
    pub async fn layout_for_column(
        conn: &mut SqliteConnection,
        column_id: &str,
    ) -> Result<BoardLayout, KanbanError> {
        let board_id: String =
            sqlx::query_scalar("SELECT board_id FROM board_columns WHERE id = ?")
                .bind(column_id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| KanbanError::NotFound(format!("Column not found: {}", column_id)))?;

        Self::board_layout(conn, &board_id).await
    }

    fn board_name(name: &str) -> Result<String, KanbanError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KanbanError::InvalidBoard(
                "Board name must not be empty".to_string(),
            ));
        }
        Ok(name.to_string())
    }
}
