mod common;

use common::{advance_at, column_id, seed_board, seed_card, setup_test_db, t};

use sqlx::SqlitePool;

use kanban_timeline::domain::{BlockRecord, ColumnKind, KanbanError};
use kanban_timeline::ledger::{BlockingLedger, MovementLedger};
use kanban_timeline::services::{BoardService, CardService, NewColumn};

#[tokio::test]
async fn test_new_card_is_placed_in_initial_column() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;

    let card = seed_card(&pool, &board, "Write docs", 1).await;
    assert_eq!(card.column_id, column_id(&board, 0));

    let mut conn = pool.acquire().await.unwrap();
    let history = MovementLedger::history(&mut conn, &card.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_initial_placement());
    assert_eq!(history[0].to_column_id, card.column_id);
    assert_eq!(history[0].moved_at, t(1));
}

#[tokio::test]
async fn test_advance_walks_every_column_up_to_final() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Feature", 1).await;

    advance_at(&pool, &card.id, &[10, 20, 30]).await;

    let details = CardService::card_details(&pool, &card.id).await.unwrap();
    assert_eq!(details.column.kind, ColumnKind::Final);
    assert_eq!(details.card.column_id, column_id(&board, 3));

    let err = CardService::move_to_next_column(&pool, &card.id, t(40))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::CardTerminal(_)), "{err}");

    let mut conn = pool.acquire().await.unwrap();
    let history = MovementLedger::history(&mut conn, &card.id).await.unwrap();
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn test_skipping_a_stage_is_rejected_and_changes_nothing() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Skipper", 1).await;

    let err = CardService::move_card(&pool, &card.id, &column_id(&board, 2), t(5))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::InvalidTransition(_)), "{err}");

    let err = CardService::move_card(&pool, &card.id, &column_id(&board, 3), t(5))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::InvalidTransition(_)), "{err}");

    let reloaded = CardService::get_card(&pool, &card.id).await.unwrap();
    assert_eq!(reloaded.column_id, column_id(&board, 0));

    let mut conn = pool.acquire().await.unwrap();
    assert_eq!(MovementLedger::history(&mut conn, &card.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_move_card_to_next_column_and_cancel() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Mover", 1).await;

    let moved = CardService::move_card(&pool, &card.id, &column_id(&board, 1), t(5))
        .await
        .unwrap();
    assert_eq!(moved.column_id, column_id(&board, 1));

    let cancelled = CardService::move_card(&pool, &card.id, &column_id(&board, 4), t(9))
        .await
        .unwrap();
    assert_eq!(cancelled.column_id, column_id(&board, 4));

    let err = CardService::cancel(&pool, &card.id, t(12)).await.unwrap_err();
    assert!(matches!(err, KanbanError::CardTerminal(_)), "{err}");
}

#[tokio::test]
async fn test_cancel_from_any_non_terminal_column() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;

    for order in 0..3 {
        let card = seed_card(&pool, &board, &format!("Card {order}"), 1).await;
        let steps: Vec<i64> = (0..order).map(|i| 10 + i).collect();
        advance_at(&pool, &card.id, &steps).await;

        let cancelled = CardService::cancel(&pool, &card.id, t(50)).await.unwrap();
        assert_eq!(cancelled.column_id, column_id(&board, 4));
    }
}

#[tokio::test]
async fn test_final_card_cannot_be_cancelled() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Shipped", 1).await;
    advance_at(&pool, &card.id, &[10, 20, 30]).await;

    let err = CardService::cancel(&pool, &card.id, t(40)).await.unwrap_err();
    assert!(matches!(err, KanbanError::CardTerminal(_)), "{err}");

    let reloaded = CardService::get_card(&pool, &card.id).await.unwrap();
    assert_eq!(reloaded.column_id, column_id(&board, 3));
}

#[tokio::test]
async fn test_blocked_card_cannot_advance_or_cancel() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Stuck", 1).await;
    advance_at(&pool, &card.id, &[5]).await;

    CardService::block(&pool, &card.id, "waiting on vendor", t(6))
        .await
        .unwrap();

    let err = CardService::move_to_next_column(&pool, &card.id, t(7))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::CardBlocked(_)), "{err}");

    let err = CardService::cancel(&pool, &card.id, t(7)).await.unwrap_err();
    assert!(matches!(err, KanbanError::CardBlocked(_)), "{err}");

    let closed = CardService::unblock(&pool, &card.id, "vendor replied", t(8))
        .await
        .unwrap();
    assert_eq!(closed.unblocked_at, Some(t(8)));
    assert_eq!(closed.unblock_reason.as_deref(), Some("vendor replied"));

    let advanced = CardService::move_to_next_column(&pool, &card.id, t(9))
        .await
        .unwrap();
    assert_eq!(advanced.column_id, column_id(&board, 2));
}

#[tokio::test]
async fn test_block_and_unblock_preconditions() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Flaky", 1).await;

    let err = CardService::unblock(&pool, &card.id, "nothing to do", t(2))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::CardNotBlocked(_)), "{err}");

    let opened = CardService::block(&pool, &card.id, "waiting", t(3)).await.unwrap();
    assert!(opened.is_open());

    let err = CardService::block(&pool, &card.id, "again", t(4)).await.unwrap_err();
    assert!(matches!(err, KanbanError::CardAlreadyBlocked(_)), "{err}");

    let err = CardService::unblock(&pool, &card.id, "too early", t(2))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");

    CardService::unblock(&pool, &card.id, "done", t(5)).await.unwrap();
    CardService::block(&pool, &card.id, "second time", t(6)).await.unwrap();

    let details = CardService::card_details(&pool, &card.id).await.unwrap();
    assert!(details.blocked);
    assert_eq!(details.block_count, 2);
    assert_eq!(
        details.open_block.map(|b| b.block_reason),
        Some("second time".to_string())
    );
}

#[tokio::test]
async fn test_terminal_card_cannot_be_blocked() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Dropped", 1).await;
    CardService::cancel(&pool, &card.id, t(2)).await.unwrap();

    let err = CardService::block(&pool, &card.id, "late", t(3)).await.unwrap_err();
    assert!(matches!(err, KanbanError::CardTerminal(_)), "{err}");
}

#[tokio::test]
async fn test_failed_pointer_update_rolls_back_the_movement() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Atomic", 1).await;

    sqlx::query(
        r#"
        CREATE TRIGGER refuse_card_moves BEFORE UPDATE OF column_id ON cards
        BEGIN
            SELECT RAISE(ABORT, 'card pointer is read-only');
        END;
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = CardService::move_to_next_column(&pool, &card.id, t(5))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::Database(_)), "{err}");

    let reloaded = CardService::get_card(&pool, &card.id).await.unwrap();
    assert_eq!(reloaded.column_id, column_id(&board, 0));

    let mut conn = pool.acquire().await.unwrap();
    let history = MovementLedger::history(&mut conn, &card.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].is_initial_placement());
}

#[tokio::test]
async fn test_movement_must_be_later_than_previous_record() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Time traveller", 10).await;

    let err = CardService::move_to_next_column(&pool, &card.id, t(10))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");

    let err = CardService::move_to_next_column(&pool, &card.id, t(3))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");

    let reloaded = CardService::get_card(&pool, &card.id).await.unwrap();
    assert_eq!(reloaded.column_id, column_id(&board, 0));
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Lonely", 1).await;

    let err = CardService::move_to_next_column(&pool, "missing", t(2))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");

    let err = CardService::create_card(&pool, "missing", "Orphan", "", t(2))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");

    let other = BoardService::create_board(&pool, "Other", &NewColumn::default_set(), t(0))
        .await
        .unwrap();
    let foreign_column = other.layout.columns()[1].id.clone();
    let err = CardService::move_card(&pool, &card.id, &foreign_column, t(2))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn test_invalid_board_layout_is_not_stored() {
    let pool = setup_test_db().await;

    let columns = [
        NewColumn::new("Todo", ColumnKind::Initial),
        NewColumn::new("Done", ColumnKind::Final),
        NewColumn::new("Doing", ColumnKind::Standard),
        NewColumn::new("Dropped", ColumnKind::Cancel),
    ];
    let err = BoardService::create_board(&pool, "Broken", &columns, t(0))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::InvalidBoard(_)), "{err}");

    let err = BoardService::create_board(&pool, "Tiny", &columns[..1], t(0))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::InvalidBoard(_)), "{err}");

    assert!(BoardService::list_boards(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_board_returns_ordered_layout() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;

    let loaded = BoardService::get_board(&pool, &board.board.id).await.unwrap();
    let names: Vec<&str> = loaded
        .layout
        .columns()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["Backlog", "Analysis", "Build", "Done", "Cancelled"]);
    assert_eq!(loaded.layout, board.layout);

    let err = BoardService::get_board(&pool, "missing").await.unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn test_ledgers_reject_duplicate_state() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Ledger", 1).await;
    let mut conn = pool.acquire().await.unwrap();

    let err = MovementLedger::record_initial_placement(&mut conn, &card.id, &card.column_id, t(2))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");

    let err = MovementLedger::record_movement(
        &mut conn,
        &card.id,
        &column_id(&board, 2),
        &column_id(&board, 3),
        t(3),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");

    BlockingLedger::open(&mut conn, &card.id, "first", t(4)).await.unwrap();
    let err = BlockingLedger::open(&mut conn, &card.id, "second", t(5))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::CardAlreadyBlocked(_)), "{err}");

    let open = BlockingLedger::open_block(&mut conn, &card.id).await.unwrap();
    assert_eq!(open.map(|b| b.block_reason), Some("first".to_string()));
}

#[tokio::test]
async fn test_list_cards_only_returns_cards_of_the_board() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let other = BoardService::create_board(&pool, "Other", &NewColumn::default_set(), t(0))
        .await
        .unwrap();

    let a = seed_card(&pool, &board, "A", 1).await;
    let b = seed_card(&pool, &board, "B", 2).await;
    seed_card(&pool, &other, "C", 3).await;
    advance_at(&pool, &b.id, &[5]).await;

    let cards = CardService::list_cards(&pool, &board.board.id).await.unwrap();
    let mut ids: Vec<&str> = cards.iter().map(|c| c.id.as_str()).collect();
    ids.sort();
    let mut expected = vec![a.id.as_str(), b.id.as_str()];
    expected.sort();
    assert_eq!(ids, expected);
}

async fn block_history(pool: &SqlitePool, card_id: &str) -> Vec<BlockRecord> {
    let mut conn = pool.acquire().await.unwrap();
    BlockingLedger::history(&mut conn, card_id).await.unwrap()
}

#[tokio::test]
async fn test_unblock_before_block_start_leaves_ledger_unchanged() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Rewind", 0).await;
    CardService::block(&pool, &card.id, "waiting", t(10)).await.unwrap();
    let before = block_history(&pool, &card.id).await;

    let err = CardService::unblock(&pool, &card.id, "too soon", t(5))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");

    {
        let mut conn = pool.acquire().await.unwrap();
        let err = BlockingLedger::close(&mut conn, &card.id, "too soon", t(9))
            .await
            .unwrap_err();
        assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");
    }

    let after = block_history(&pool, &card.id).await;
    assert_eq!(after, before);
    assert!(after[0].is_open());
}

#[tokio::test]
async fn test_block_overlapping_a_closed_block_leaves_ledger_unchanged() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Overlap", 0).await;
    CardService::block(&pool, &card.id, "review", t(10)).await.unwrap();
    CardService::unblock(&pool, &card.id, "approved", t(20)).await.unwrap();
    let before = block_history(&pool, &card.id).await;

    let err = CardService::block(&pool, &card.id, "infra", t(15))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");
    assert!(err.to_string().contains(&card.id), "{err}");

    {
        let mut conn = pool.acquire().await.unwrap();
        let err = BlockingLedger::open(&mut conn, &card.id, "infra", t(19))
            .await
            .unwrap_err();
        assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");
    }

    assert_eq!(block_history(&pool, &card.id).await, before);

    // A block may start exactly where the previous one ended.
    CardService::block(&pool, &card.id, "infra", t(20)).await.unwrap();
    assert_eq!(block_history(&pool, &card.id).await.len(), 2);
}

#[tokio::test]
async fn test_block_before_placement_leaves_ledger_unchanged() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;
    let card = seed_card(&pool, &board, "Late arrival", 10).await;

    let err = CardService::block(&pool, &card.id, "waiting", t(5))
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::MalformedHistory(_)), "{err}");
    assert!(block_history(&pool, &card.id).await.is_empty());

    let details = CardService::card_details(&pool, &card.id).await.unwrap();
    assert!(!details.blocked);
    assert_eq!(details.block_count, 0);
}

#[tokio::test]
async fn test_rename_board() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;

    let renamed = BoardService::rename_board(&pool, &board.board.id, "  Platform  ")
        .await
        .unwrap();
    assert_eq!(renamed.id, board.board.id);
    assert_eq!(renamed.name, "Platform");

    let loaded = BoardService::get_board(&pool, &board.board.id).await.unwrap();
    assert_eq!(loaded.board.name, "Platform");
    assert_eq!(loaded.layout, board.layout);

    let err = BoardService::rename_board(&pool, "missing", "Anything")
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");

    let err = BoardService::rename_board(&pool, &board.board.id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::InvalidBoard(_)), "{err}");
    let loaded = BoardService::get_board(&pool, &board.board.id).await.unwrap();
    assert_eq!(loaded.board.name, "Platform");
}

#[tokio::test]
async fn test_delete_board_removes_cards_and_history() {
    let pool = setup_test_db().await;
    assert_eq!(BoardService::count_boards(&pool).await.unwrap(), 0);

    let board = seed_board(&pool).await;
    let other = BoardService::create_board(&pool, "Other", &NewColumn::default_set(), t(0))
        .await
        .unwrap();
    assert_eq!(BoardService::count_boards(&pool).await.unwrap(), 2);

    let moved = seed_card(&pool, &board, "Moved", 1).await;
    advance_at(&pool, &moved.id, &[5, 10]).await;
    let blocked = seed_card(&pool, &board, "Blocked", 2).await;
    CardService::block(&pool, &blocked.id, "waiting", t(3)).await.unwrap();
    let kept = seed_card(&pool, &other, "Kept", 1).await;
    CardService::block(&pool, &kept.id, "waiting", t(4)).await.unwrap();

    let removed = BoardService::delete_board(&pool, &board.board.id).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(BoardService::count_boards(&pool).await.unwrap(), 1);

    let err = BoardService::get_board(&pool, &board.board.id).await.unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");
    let err = CardService::get_card(&pool, &moved.id).await.unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");

    {
        let mut conn = pool.acquire().await.unwrap();
        assert!(MovementLedger::history(&mut conn, &moved.id).await.unwrap().is_empty());
        assert!(BlockingLedger::history(&mut conn, &blocked.id).await.unwrap().is_empty());
        assert_eq!(MovementLedger::history(&mut conn, &kept.id).await.unwrap().len(), 1);
        assert!(BlockingLedger::open_block(&mut conn, &kept.id).await.unwrap().is_some());
    }

    let cards = CardService::list_cards(&pool, &other.board.id).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].id, kept.id);

    let err = BoardService::delete_board(&pool, &board.board.id).await.unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn test_column_summaries_count_cards_per_column() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;

    seed_card(&pool, &board, "A", 1).await;
    let b = seed_card(&pool, &board, "B", 2).await;
    let c = seed_card(&pool, &board, "C", 3).await;
    advance_at(&pool, &b.id, &[5]).await;
    CardService::cancel(&pool, &c.id, t(6)).await.unwrap();

    let summaries = BoardService::column_summaries(&pool, &board.board.id)
        .await
        .unwrap();
    let counts: Vec<(&str, i64)> = summaries
        .iter()
        .map(|s| (s.column.name.as_str(), s.card_count))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("Backlog", 1),
            ("Analysis", 1),
            ("Build", 0),
            ("Done", 0),
            ("Cancelled", 1),
        ]
    );

    let json = serde_json::to_value(&summaries[0]).unwrap();
    assert_eq!(json["name"], "Backlog");
    assert_eq!(json["card_count"], 1);

    let err = BoardService::column_summaries(&pool, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn test_cards_in_column_lists_only_that_column() {
    let pool = setup_test_db().await;
    let board = seed_board(&pool).await;

    let a = seed_card(&pool, &board, "A", 1).await;
    let b = seed_card(&pool, &board, "B", 2).await;
    let c = seed_card(&pool, &board, "C", 3).await;
    advance_at(&pool, &b.id, &[5]).await;

    let backlog = CardService::cards_in_column(&pool, &column_id(&board, 0))
        .await
        .unwrap();
    let titles: Vec<&str> = backlog.iter().map(|card| card.title.as_str()).collect();
    assert_eq!(titles, vec!["A", "C"]);
    assert_eq!(backlog[0].id, a.id);
    assert_eq!(backlog[1].id, c.id);

    let analysis = CardService::cards_in_column(&pool, &column_id(&board, 1))
        .await
        .unwrap();
    assert_eq!(analysis.len(), 1);
    assert_eq!(analysis[0].id, b.id);

    let done = CardService::cards_in_column(&pool, &column_id(&board, 3))
        .await
        .unwrap();
    assert!(done.is_empty());

    let err = CardService::cards_in_column(&pool, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, KanbanError::NotFound(_)), "{err}");
}
