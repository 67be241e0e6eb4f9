use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::KanbanError;

/// Role a column plays in its board's workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "lowercase")]
pub enum ColumnKind {
    Initial,
    Standard,
    Final,
    Cancel,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Initial => "initial",
            ColumnKind::Standard => "standard",
            ColumnKind::Final => "final",
            ColumnKind::Cancel => "cancel",
        }
    }

    pub fn all() -> &'static [ColumnKind] {
        &[
            ColumnKind::Initial,
            ColumnKind::Standard,
            ColumnKind::Final,
            ColumnKind::Cancel,
        ]
    }

    /// Terminal columns cannot be left once entered.
    pub fn is_terminal(&self) -> bool {
        match self {
            ColumnKind::Initial | ColumnKind::Standard => false,
            ColumnKind::Final | ColumnKind::Cancel => true,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColumnKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(ColumnKind::Initial),
            "standard" => Ok(ColumnKind::Standard),
            "final" => Ok(ColumnKind::Final),
            "cancel" => Ok(ColumnKind::Cancel),
            _ => Err(format!("Invalid column kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Column {
    pub id: String,
    pub board_id: String,
    pub name: String,
    #[sqlx(rename = "column_order")]
    pub order: i64,
    pub kind: ColumnKind,
}

/// The validated, order-sorted column set of one board.
///
/// Orders form the dense sequence `0..N`, the INITIAL column sits at order 0,
/// FINAL at `N - 2` and CANCEL at `N - 1`; every other column is STANDARD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardLayout {
    board_id: String,
    columns: Vec<Column>,
}

impl BoardLayout {
    pub fn new(board_id: &str, mut columns: Vec<Column>) -> Result<Self, KanbanError> {
        if columns.len() < 3 {
            return Err(KanbanError::InvalidBoard(format!(
                "Board {} needs at least an initial, a final and a cancel column, got {}",
                board_id,
                columns.len()
            )));
        }

        if let Some(foreign) = columns.iter().find(|c| c.board_id != board_id) {
            return Err(KanbanError::InvalidBoard(format!(
                "Column {} belongs to board {}, not {}",
                foreign.id, foreign.board_id, board_id
            )));
        }

        columns.sort_by_key(|c| c.order);

        let last = columns.len() as i64 - 1;
        for (expected, column) in (0_i64..).zip(columns.iter()) {
            if column.order != expected {
                return Err(KanbanError::InvalidBoard(format!(
                    "Column orders must be dense from 0: expected {}, found {} ({})",
                    expected, column.order, column.name
                )));
            }

            let required = match expected {
                0 => ColumnKind::Initial,
                o if o == last => ColumnKind::Cancel,
                o if o == last - 1 => ColumnKind::Final,
                _ => ColumnKind::Standard,
            };
            if column.kind != required {
                return Err(KanbanError::InvalidBoard(format!(
                    "Column '{}' at order {} must be {}, found {}",
                    column.name, column.order, required, column.kind
                )));
            }
        }

        Ok(Self {
            board_id: board_id.to_string(),
            columns,
        })
    }

    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn require(&self, column_id: &str) -> Result<&Column, KanbanError> {
        self.get(column_id)
            .ok_or_else(|| KanbanError::NotFound(format!("Column not found: {}", column_id)))
    }

    pub fn by_order(&self, order: i64) -> Option<&Column> {
        usize::try_from(order).ok().and_then(|i| self.columns.get(i))
    }

    pub fn initial(&self) -> &Column {
        &self.columns[0]
    }

    pub fn final_column(&self) -> &Column {
        &self.columns[self.columns.len() - 2]
    }

    pub fn cancel(&self) -> &Column {
        &self.columns[self.columns.len() - 1]
    }

    /// The column one step further along the workflow, if any.
    ///
    /// The step after the FINAL column would be CANCEL, which is never an
    /// advance target, so FINAL and CANCEL both have no successor.
    pub fn next_after(&self, column: &Column) -> Option<&Column> {
        if column.kind.is_terminal() {
            return None;
        }
        self.by_order(column.order + 1)
    }
}
