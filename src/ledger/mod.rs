//! Append-only card history backed by SQLite.
//!
//! Ledger calls take a `&mut SqliteConnection` so a service can run several
//! of them, plus its own updates, inside one transaction.

pub mod blocking;
pub mod movement;

pub use blocking::BlockingLedger;
pub use movement::MovementLedger;
