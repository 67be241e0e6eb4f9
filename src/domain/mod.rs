pub mod card;
pub mod column;
pub mod error;
pub mod policy;

pub use card::{BlockRecord, Board, Card, MovementRecord};
pub use column::{BoardLayout, Column, ColumnKind};
pub use error::KanbanError;
pub use policy::{CardState, Rejection, WorkflowPolicy};
