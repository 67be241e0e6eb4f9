//! Derives time-based metrics from a card's movement and block history.
//!
//! Nothing here reads a clock or touches storage: callers pass the already
//! fetched records and the instant `now` the report is computed against, so
//! the same input always produces the same [`Timeline`].


use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::{BlockRecord, BoardLayout, ColumnKind, KanbanError, MovementRecord};

/// Serializes a `chrono::Duration` as whole seconds.
pub(crate) mod duration_secs {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDwell {
    pub column_id: String,
    pub column_name: String,
    pub column_order: i64,
    pub kind: ColumnKind,
    #[serde(rename = "seconds", with = "duration_secs")]
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionInterval {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(rename = "seconds", with = "duration_secs")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInterval {
    pub block_id: String,
    pub blocked_at: DateTime<Utc>,
    pub block_reason: String,
    pub unblocked_at: Option<DateTime<Utc>>,
    pub unblock_reason: Option<String>,
    /// For an open block this is "blocked for at least this long so far".
    #[serde(rename = "seconds", with = "duration_secs")]
    pub duration: Duration,
    pub status: BlockStatus,
}

impl BlockInterval {
    pub fn is_open(&self) -> bool {
        self.status == BlockStatus::Open
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timeline {
    /// One entry per visited column, ordered by column id.
    pub column_dwell_times: Vec<ColumnDwell>,
    pub completion: Option<CompletionInterval>,
    pub block_intervals: Vec<BlockInterval>,
}

impl Timeline {
    pub fn is_completed(&self) -> bool {
        self.completion.is_some()
    }

    pub fn total_block_count(&self) -> usize {
        self.block_intervals.len()
    }

    pub fn total_blocking_time(&self) -> Duration {
        self.block_intervals
            .iter()
            .fold(Duration::zero(), |total, b| total + b.duration)
    }

    pub fn total_dwell_time(&self) -> Duration {
        self.column_dwell_times
            .iter()
            .fold(Duration::zero(), |total, d| total + d.duration)
    }
}

pub struct TimelineReconstructor;

impl TimelineReconstructor {
    pub fn reconstruct(
        movements: &[MovementRecord],
        blocks: &[BlockRecord],
        layout: &BoardLayout,
        now: DateTime<Utc>,
    ) -> Result<Timeline, KanbanError> {
        let movements = Self::ordered_movements(movements, layout, now)?;
        let block_intervals = Self::block_intervals(blocks, now)?;

        if let Some(placement) = movements.iter().find(|m| m.is_initial_placement()) {
            if let Some(early) = blocks.iter().find(|b| b.blocked_at < placement.moved_at) {
                return Err(KanbanError::MalformedHistory(format!(
                    "Card {}: block {} starts at {} before the card was placed at {}",
                    early.card_id,
                    early.id,
                    early.blocked_at.to_rfc3339(),
                    placement.moved_at.to_rfc3339()
                )));
            }
        }

        Ok(Timeline {
            column_dwell_times: Self::fold_dwell_times(&movements, layout, now),
            completion: Self::completion_from_ordered(&movements, layout),
            block_intervals,
        })
    }

    /// Time spent in each visited column, including the still-running stay in
    /// the current column up to `now`.
    pub fn dwell_times(
        movements: &[MovementRecord],
        layout: &BoardLayout,
        now: DateTime<Utc>,
    ) -> Result<Vec<ColumnDwell>, KanbanError> {
        let movements = Self::ordered_movements(movements, layout, now)?;
        Ok(Self::fold_dwell_times(&movements, layout, now))
    }

    /// Placement-to-first-FINAL-entry interval, or `None` while in progress.
    pub fn completion(
        movements: &[MovementRecord],
        layout: &BoardLayout,
        now: DateTime<Utc>,
    ) -> Result<Option<CompletionInterval>, KanbanError> {
        let movements = Self::ordered_movements(movements, layout, now)?;
        Ok(Self::completion_from_ordered(&movements, layout))
    }

    pub fn block_intervals(
        blocks: &[BlockRecord],
        now: DateTime<Utc>,
    ) -> Result<Vec<BlockInterval>, KanbanError> {
        let mut ordered: Vec<&BlockRecord> = blocks.iter().collect();
        ordered.sort_by_key(|b| b.blocked_at);

        let open = ordered.iter().filter(|b| b.is_open()).count();
        if open > 1 {
            return Err(KanbanError::MalformedHistory(format!(
                "Card {} has {} open blocks",
                ordered[0].card_id, open
            )));
        }

        let intervals = ordered
            .into_iter()
            .map(|b| Self::block_interval(b, now))
            .collect::<Result<Vec<_>, _>>()?;

        // Intervals of one card never overlap; touching ends are fine.
        for pair in intervals.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let prev_end = prev.blocked_at + prev.duration;
            if next.blocked_at < prev_end {
                return Err(KanbanError::MalformedHistory(format!(
                    "Card {}: block {} starts at {} while block {} lasts until {}",
                    blocks[0].card_id,
                    next.block_id,
                    next.blocked_at.to_rfc3339(),
                    prev.block_id,
                    prev_end.to_rfc3339()
                )));
            }
        }

        Ok(intervals)
    }

    pub fn block_interval(
        block: &BlockRecord,
        now: DateTime<Utc>,
    ) -> Result<BlockInterval, KanbanError> {
        let (end, status) = match block.unblocked_at {
            Some(unblocked_at) => (unblocked_at, BlockStatus::Resolved),
            None => (now, BlockStatus::Open),
        };

        if end < block.blocked_at {
            return Err(KanbanError::MalformedHistory(format!(
                "Block {} of card {} ends at {} before it starts at {}",
                block.id,
                block.card_id,
                end.to_rfc3339(),
                block.blocked_at.to_rfc3339()
            )));
        }

        Ok(BlockInterval {
            block_id: block.id.clone(),
            blocked_at: block.blocked_at,
            block_reason: block.block_reason.clone(),
            unblocked_at: block.unblocked_at,
            unblock_reason: block.unblock_reason.clone(),
            duration: end - block.blocked_at,
            status,
        })
    }

    /// Stable-sorts by `moved_at` and rejects histories that sorting cannot
    /// repair.
    fn ordered_movements<'a>(
        movements: &'a [MovementRecord],
        layout: &BoardLayout,
        now: DateTime<Utc>,
    ) -> Result<Vec<&'a MovementRecord>, KanbanError> {
        let mut ordered: Vec<&MovementRecord> = movements.iter().collect();
        ordered.sort_by_key(|m| m.moved_at);

        let malformed = |m: &MovementRecord, what: String| {
            KanbanError::MalformedHistory(format!("Card {}: {}", m.card_id, what))
        };

        for &record in &ordered {
            let unknown = std::iter::once(record.to_column_id.as_str())
                .chain(record.from_column_id.as_deref())
                .find(|id| layout.get(id).is_none());
            if let Some(column_id) = unknown {
                return Err(malformed(
                    record,
                    format!(
                        "movement {} references column {} outside board {}",
                        record.id,
                        column_id,
                        layout.board_id()
                    ),
                ));
            }
        }

        let placements = ordered.iter().filter(|m| m.is_initial_placement()).count();
        if placements > 1 {
            return Err(malformed(
                ordered[0],
                format!("{} initial placements recorded", placements),
            ));
        }

        if let Some(pos) = ordered.iter().position(|m| m.is_initial_placement()) {
            if pos != 0 {
                return Err(malformed(
                    ordered[pos],
                    "initial placement is not the earliest movement".to_string(),
                ));
            }
        }

        for pair in ordered.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.moved_at == prev.moved_at {
                return Err(malformed(
                    next,
                    format!(
                        "movements {} and {} share the instant {}",
                        prev.id,
                        next.id,
                        next.moved_at.to_rfc3339()
                    ),
                ));
            }
            if let Some(from) = next.from_column_id.as_deref() {
                if from != prev.to_column_id {
                    return Err(malformed(
                        next,
                        format!(
                            "movement {} leaves column {} but the card was in {}",
                            next.id, from, prev.to_column_id
                        ),
                    ));
                }
            }
        }

        if let Some(&last) = ordered.last() {
            if now < last.moved_at {
                return Err(malformed(
                    last,
                    format!(
                        "report instant {} precedes latest movement at {}",
                        now.to_rfc3339(),
                        last.moved_at.to_rfc3339()
                    ),
                ));
            }
        }

        Ok(ordered)
    }

    fn fold_dwell_times(
        ordered: &[&MovementRecord],
        layout: &BoardLayout,
        now: DateTime<Utc>,
    ) -> Vec<ColumnDwell> {
        let Some((first, rest)) = ordered.split_first() else {
            return Vec::new();
        };

        let (closed, last_time, last_column) = rest.iter().fold(
            (
                BTreeMap::<&str, Duration>::new(),
                first.moved_at,
                first.to_column_id.as_str(),
            ),
            |(totals, last_time, last_column), record| {
                (
                    accumulate(totals, last_column, record.moved_at - last_time),
                    record.moved_at,
                    record.to_column_id.as_str(),
                )
            },
        );
        let totals = accumulate(closed, last_column, now - last_time);

        totals
            .into_iter()
            .filter_map(|(column_id, duration)| {
                layout.get(column_id).map(|column| ColumnDwell {
                    column_id: column.id.clone(),
                    column_name: column.name.clone(),
                    column_order: column.order,
                    kind: column.kind,
                    duration,
                })
            })
            .collect()
    }

    fn completion_from_ordered(
        ordered: &[&MovementRecord],
        layout: &BoardLayout,
    ) -> Option<CompletionInterval> {
        let started_at = ordered
            .iter()
            .filter(|m| m.is_initial_placement())
            .map(|m| m.moved_at)
            .min()?;

        let completed_at = ordered
            .iter()
            .filter(|m| {
                layout
                    .get(&m.to_column_id)
                    .is_some_and(|c| c.kind == ColumnKind::Final)
            })
            .map(|m| m.moved_at)
            .min()?;

        Some(CompletionInterval {
            started_at,
            completed_at,
            duration: completed_at - started_at,
        })
    }
}

fn accumulate<'a>(
    mut totals: BTreeMap<&'a str, Duration>,
    column_id: &'a str,
    span: Duration,
) -> BTreeMap<&'a str, Duration> {
    let total = totals.get(column_id).copied().unwrap_or_else(Duration::zero) + span;
    totals.insert(column_id, total);
    totals
}
