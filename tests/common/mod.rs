#![allow(dead_code)]

use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use kanban_timeline::domain::{Card, ColumnKind};
use kanban_timeline::infrastructure::db;
use kanban_timeline::services::{BoardDetails, BoardService, CardService, NewColumn};

/// Single-connection in-memory database; the connection never expires so the
/// schema survives for the whole test.
pub async fn setup_test_db() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("Failed to parse database url")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to create test database");

    db::migrate(&pool).await.expect("Failed to run migrations");

    pool
}

/// Minutes after a fixed base instant.
pub fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// Backlog, Analysis, Build, Done, Cancelled.
pub async fn seed_board(pool: &SqlitePool) -> BoardDetails {
    let columns = [
        NewColumn::new("Backlog", ColumnKind::Initial),
        NewColumn::new("Analysis", ColumnKind::Standard),
        NewColumn::new("Build", ColumnKind::Standard),
        NewColumn::new("Done", ColumnKind::Final),
        NewColumn::new("Cancelled", ColumnKind::Cancel),
    ];

    BoardService::create_board(pool, "Delivery", &columns, t(0))
        .await
        .expect("Failed to create board")
}

pub async fn seed_card(pool: &SqlitePool, board: &BoardDetails, title: &str, at: i64) -> Card {
    CardService::create_card(pool, &board.board.id, title, "", t(at))
        .await
        .expect("Failed to create card")
}

/// Advances the card once per listed minute.
pub async fn advance_at(pool: &SqlitePool, card_id: &str, minutes: &[i64]) {
    for minute in minutes {
        CardService::move_to_next_column(pool, card_id, t(*minute))
            .await
            .expect("Failed to advance card");
    }
}

pub fn column_id(board: &BoardDetails, order: i64) -> String {
    board
        .layout
        .by_order(order)
        .expect("Missing column")
        .id
        .clone()
}
