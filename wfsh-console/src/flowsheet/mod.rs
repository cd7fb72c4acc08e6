//! Flowsheet state: ordered sequence store, pending-operation ledger,
//! reconciliation engine, and pagination window.
//!
//! The engine is the sole mutation gateway. Everything else in the console
//! (HTTP handlers, the live channel task) goes through it rather than
//! touching the store or ledger directly.

pub mod engine;
pub mod pagination;
pub mod pending;
pub mod store;

pub use engine::{FlowsheetEngine, FlowsheetSnapshot, NewSong};
pub use pagination::PageWindow;
pub use store::{MoveTarget, SequenceStore, ORDER_SPACING};
