//! Workflow rules for moving, blocking and cancelling cards.
//!
//! Everything here is a pure function of the card's current column and its
//! number of open blocks. The `can_*` predicates answer yes/no; the `check_*`
//! variants say why not, and callers turn a [`Rejection`] into a
//! [`KanbanError`] with [`Rejection::into_error`].

use super::{Column, ColumnKind, KanbanError};

/// What the policy needs to know about a card.
#[derive(Debug, Clone, Copy)]
pub struct CardState<'a> {
    pub card_id: &'a str,
    pub column: &'a Column,
    pub open_blocks: usize,
}

impl<'a> CardState<'a> {
    pub fn new(card_id: &'a str, column: &'a Column, open_blocks: usize) -> Self {
        Self {
            card_id,
            column,
            open_blocks,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.open_blocks > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Target is neither the next column nor the cancel column.
    SkipsStage { from: i64, to: i64 },
    /// Card sits in a FINAL or CANCEL column.
    Terminal(ColumnKind),
    AlreadyBlocked,
    NotBlocked,
    /// Card has an open block and the operation needs it unblocked.
    Blocked,
    /// More than one open block was found for the card.
    MultipleOpenBlocks(usize),
}

impl Rejection {
    pub fn into_error(self, card_id: &str) -> KanbanError {
        match self {
            Rejection::SkipsStage { from, to } => KanbanError::InvalidTransition(format!(
                "Card {} cannot move from order {} to order {}: columns advance one step at a time",
                card_id, from, to
            )),
            Rejection::Terminal(kind) => KanbanError::CardTerminal(format!(
                "Card {} is in a {} column and can no longer change",
                card_id, kind
            )),
            Rejection::AlreadyBlocked => KanbanError::CardAlreadyBlocked(format!(
                "Card {} already has an open block",
                card_id
            )),
            Rejection::NotBlocked => {
                KanbanError::CardNotBlocked(format!("Card {} has no open block", card_id))
            }
            Rejection::Blocked => KanbanError::CardBlocked(format!(
                "Card {} must be unblocked first",
                card_id
            )),
            Rejection::MultipleOpenBlocks(count) => KanbanError::MalformedHistory(format!(
                "Card {} has {} open blocks",
                card_id, count
            )),
        }
    }
}

pub struct WorkflowPolicy;

impl WorkflowPolicy {
    /// Cancellation is always a legal target; anything else must be exactly
    /// one step ahead.
    pub fn can_move(current_order: i64, target_order: i64, target_is_cancel: bool) -> bool {
        target_is_cancel || target_order == current_order + 1
    }

    pub fn can_advance(column: &Column) -> bool {
        match column.kind {
            ColumnKind::Initial | ColumnKind::Standard => true,
            ColumnKind::Final | ColumnKind::Cancel => false,
        }
    }

    pub fn can_block(card: &CardState<'_>) -> bool {
        Self::check_block(card).is_ok()
    }

    pub fn can_unblock(card: &CardState<'_>) -> bool {
        card.open_blocks == 1
    }

    pub fn can_cancel(card: &CardState<'_>) -> bool {
        Self::check_cancel(card).is_ok()
    }

    /// Moving into `target`, which may be the next column or the cancel column.
    pub fn check_move(card: &CardState<'_>, target: &Column) -> Result<(), Rejection> {
        let target_is_cancel = match target.kind {
            ColumnKind::Cancel => true,
            ColumnKind::Initial | ColumnKind::Standard | ColumnKind::Final => false,
        };
        if target_is_cancel {
            return Self::check_cancel(card);
        }

        Self::check_advance(card)?;
        if !Self::can_move(card.column.order, target.order, false) {
            return Err(Rejection::SkipsStage {
                from: card.column.order,
                to: target.order,
            });
        }
        Ok(())
    }

    pub fn check_advance(card: &CardState<'_>) -> Result<(), Rejection> {
        if !Self::can_advance(card.column) {
            return Err(Rejection::Terminal(card.column.kind));
        }
        if card.is_blocked() {
            return Err(Rejection::Blocked);
        }
        Ok(())
    }

    pub fn check_block(card: &CardState<'_>) -> Result<(), Rejection> {
        if card.column.kind.is_terminal() {
            return Err(Rejection::Terminal(card.column.kind));
        }
        if card.is_blocked() {
            return Err(Rejection::AlreadyBlocked);
        }
        Ok(())
    }

    pub fn check_unblock(card: &CardState<'_>) -> Result<(), Rejection> {
        match card.open_blocks {
            0 => Err(Rejection::NotBlocked),
            1 => Ok(()),
            n => Err(Rejection::MultipleOpenBlocks(n)),
        }
    }

    pub fn check_cancel(card: &CardState<'_>) -> Result<(), Rejection> {
        if card.column.kind.is_terminal() {
            return Err(Rejection::Terminal(card.column.kind));
        }
        if card.is_blocked() {
            return Err(Rejection::Blocked);
        }
        Ok(())
    }
}
