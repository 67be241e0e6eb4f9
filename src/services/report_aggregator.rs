use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::domain::{BlockRecord, BoardLayout, Card, KanbanError, MovementRecord};
use crate::ledger::{BlockingLedger, MovementLedger};
use crate::timeline::{duration_secs, BlockInterval, Timeline, TimelineReconstructor};

use super::{BoardService, CardService};

/// Everything the ledgers know about one card.
#[derive(Debug, Clone)]
pub struct CardHistory {
    pub card: Card,
    pub movements: Vec<MovementRecord>,
    pub blocks: Vec<BlockRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRow {
    pub card_id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(rename = "seconds", with = "duration_secs")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingRow {
    pub card_id: String,
    pub title: String,
    #[serde(flatten)]
    pub interval: BlockInterval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingReport {
    pub rows: Vec<BlockingRow>,
    pub total_blocks: usize,
    pub open_blocks: usize,
    pub resolved_blocks: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardTimeline {
    pub card_id: String,
    pub title: String,
    pub column_id: String,
    #[serde(flatten)]
    pub timeline: Timeline,
}

impl CardTimeline {
    pub fn is_completed(&self) -> bool {
        self.timeline.is_completed()
    }

    pub fn total_block_count(&self) -> usize {
        self.timeline.total_block_count()
    }

    pub fn total_blocking_time(&self) -> Duration {
        self.timeline.total_blocking_time()
    }
}

/// A movement record with its column names resolved for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementEntry {
    pub movement_id: String,
    pub from_column_id: Option<String>,
    pub from_column_name: Option<String>,
    pub to_column_id: String,
    pub to_column_name: String,
    pub moved_at: DateTime<Utc>,
}

impl MovementEntry {
    pub fn is_initial_placement(&self) -> bool {
        self.from_column_id.is_none()
    }
}

pub struct ReportAggregator;

impl ReportAggregator {
    // ── Board reports ──────────────────────────────────────────

    /// Completed cards of the board, slowest first.
    pub async fn completion_report(
        pool: &SqlitePool,
        board_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<CompletionRow>, KanbanError> {
        let mut conn = pool.acquire().await?;
        let layout = BoardService::board_layout(&mut conn, board_id).await?;
        let histories = Self::board_histories(&mut conn, board_id).await?;

        let rows = Self::build_completion_report(&histories, &layout, now)?;
        tracing::debug!(
            board_id,
            cards = histories.len(),
            completed = rows.len(),
            "Completion report generated"
        );

        Ok(rows)
    }

    pub async fn blocking_report(
        pool: &SqlitePool,
        board_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BlockingReport, KanbanError> {
        let mut conn = pool.acquire().await?;
        // Validates the board id; an unknown board is NotFound, not an empty report.
        BoardService::board_layout(&mut conn, board_id).await?;
        let histories = Self::board_histories(&mut conn, board_id).await?;

        let report = Self::build_blocking_report(&histories, now)?;
        tracing::debug!(
            board_id,
            total = report.total_blocks,
            open = report.open_blocks,
            "Blocking report generated"
        );

        Ok(report)
    }

    // ── Card reports ───────────────────────────────────────────

    pub async fn card_timeline(
        pool: &SqlitePool,
        card_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CardTimeline, KanbanError> {
        let mut conn = pool.acquire().await?;
        let history = Self::card_history(&mut conn, card_id).await?;
        let layout = BoardService::layout_for_column(&mut conn, &history.card.column_id).await?;

        let timeline = Self::build_card_timeline(&history, &layout, now)?;
        tracing::debug!(
            card_id,
            completed = timeline.is_completed(),
            blocks = timeline.total_block_count(),
            "Card timeline generated"
        );

        Ok(timeline)
    }

    pub async fn movement_history(
        pool: &SqlitePool,
        card_id: &str,
    ) -> Result<Vec<MovementEntry>, KanbanError> {
        let mut conn = pool.acquire().await?;
        let card = CardService::card_model(&mut conn, card_id).await?;
        let layout = BoardService::layout_for_column(&mut conn, &card.column_id).await?;
        let movements = MovementLedger::history(&mut conn, card_id).await?;

        Self::build_movement_history(&movements, &layout)
    }

    pub async fn card_history(
        conn: &mut SqliteConnection,
        card_id: &str,
    ) -> Result<CardHistory, KanbanError> {
        let card = CardService::card_model(conn, card_id).await?;
        let movements = MovementLedger::history(conn, card_id).await?;
        let blocks = BlockingLedger::history(conn, card_id).await?;

        Ok(CardHistory {
            card,
            movements,
            blocks,
        })
    }

    /// Histories of every card on the board, ordered by card id.
    pub async fn board_histories(
        conn: &mut SqliteConnection,
        board_id: &str,
    ) -> Result<Vec<CardHistory>, KanbanError> {
        let cards = CardService::cards_on_board(conn, board_id).await?;
        let mut movements = group_by_card(
            MovementLedger::history_for_board(conn, board_id).await?,
            |m| &m.card_id,
        );
        let mut blocks = group_by_card(
            BlockingLedger::history_for_board(conn, board_id).await?,
            |b| &b.card_id,
        );

        Ok(cards
            .into_iter()
            .map(|card| CardHistory {
                movements: movements.remove(&card.id).unwrap_or_default(),
                blocks: blocks.remove(&card.id).unwrap_or_default(),
                card,
            })
            .collect())
    }

    // ── Pure builders ──────────────────────────────────────────

    pub fn build_completion_report(
        histories: &[CardHistory],
        layout: &BoardLayout,
        now: DateTime<Utc>,
    ) -> Result<Vec<CompletionRow>, KanbanError> {
        let mut rows = Vec::new();
        for history in histories {
            if let Some(completion) =
                TimelineReconstructor::completion(&history.movements, layout, now)?
            {
                rows.push(CompletionRow {
                    card_id: history.card.id.clone(),
                    title: history.card.title.clone(),
                    started_at: completion.started_at,
                    completed_at: completion.completed_at,
                    duration: completion.duration,
                });
            }
        }

        rows.sort_by(|a, b| {
            b.duration
                .cmp(&a.duration)
                .then_with(|| a.card_id.cmp(&b.card_id))
        });
        Ok(rows)
    }

    pub fn build_blocking_report(
        histories: &[CardHistory],
        now: DateTime<Utc>,
    ) -> Result<BlockingReport, KanbanError> {
        let mut rows = Vec::new();
        for history in histories {
            for interval in TimelineReconstructor::block_intervals(&history.blocks, now)? {
                rows.push(BlockingRow {
                    card_id: history.card.id.clone(),
                    title: history.card.title.clone(),
                    interval,
                });
            }
        }

        rows.sort_by(|a, b| {
            a.card_id
                .cmp(&b.card_id)
                .then_with(|| a.interval.blocked_at.cmp(&b.interval.blocked_at))
        });

        let open_blocks = rows.iter().filter(|r| r.interval.is_open()).count();
        Ok(BlockingReport {
            total_blocks: rows.len(),
            resolved_blocks: rows.len() - open_blocks,
            open_blocks,
            rows,
        })
    }

    pub fn build_card_timeline(
        history: &CardHistory,
        layout: &BoardLayout,
        now: DateTime<Utc>,
    ) -> Result<CardTimeline, KanbanError> {
        let timeline =
            TimelineReconstructor::reconstruct(&history.movements, &history.blocks, layout, now)?;

        Ok(CardTimeline {
            card_id: history.card.id.clone(),
            title: history.card.title.clone(),
            column_id: history.card.column_id.clone(),
            timeline,
        })
    }

    pub fn build_movement_history(
        movements: &[MovementRecord],
        layout: &BoardLayout,
    ) -> Result<Vec<MovementEntry>, KanbanError> {
        let name_of = |m: &MovementRecord, column_id: &str| {
            layout.get(column_id).map(|c| c.name.clone()).ok_or_else(|| {
                KanbanError::MalformedHistory(format!(
                    "Card {}: movement {} references column {} outside board {}",
                    m.card_id,
                    m.id,
                    column_id,
                    layout.board_id()
                ))
            })
        };

        movements
            .iter()
            .map(|m| {
                Ok(MovementEntry {
                    movement_id: m.id.clone(),
                    from_column_name: m
                        .from_column_id
                        .as_deref()
                        .map(|id| name_of(m, id))
                        .transpose()?,
                    from_column_id: m.from_column_id.clone(),
                    to_column_name: name_of(m, &m.to_column_id)?,
                    to_column_id: m.to_column_id.clone(),
                    moved_at: m.moved_at,
                })
            })
            .collect()
    }
}

fn group_by_card<T>(
    records: Vec<T>,
    card_id: impl Fn(&T) -> &String,
) -> BTreeMap<String, Vec<T>> {
    records.into_iter().fold(BTreeMap::new(), |mut groups, record| {
        groups
            .entry(card_id(&record).clone())
            .or_insert_with(Vec::new)
            .push(record);
        groups
    })
}
