//! Backend collaborators
//!
//! The console talks to two upstream services: the backend flowsheet API
//! (REST mutations and history pages, plus its SSE live update channel) and
//! the show-control service (read-only on-air status). Both are reached
//! through traits so the reconciliation engine can be driven by scripted
//! doubles in tests.

pub mod api;
pub mod http;
pub mod live;

pub use api::{FlowsheetApi, OnAirStatus, ShowControl};
pub use http::{HttpFlowsheetApi, HttpShowControl};
pub use live::LiveChannel;
