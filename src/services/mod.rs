pub mod board_service;
pub mod card_service;
pub mod report_aggregator;

pub use board_service::{BoardDetails, BoardService, ColumnSummary, NewColumn};
pub use card_service::{CardDetails, CardService};
pub use report_aggregator::{
    BlockingReport, BlockingRow, CardHistory, CardTimeline, CompletionRow, MovementEntry,
    ReportAggregator,
};
