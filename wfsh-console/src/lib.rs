//! # WFSH Console Library
//!
//! Flowsheet console service: maintains the live DJ flowsheet as an ordered
//! optimistic mirror of the backend, reconciles local intents against
//! backend confirmations and live channel pushes, and serves renderers over
//! REST plus SSE.
//!
//! Key components:
//! - [`flowsheet::FlowsheetEngine`] - reconciliation engine and sole mutation gateway
//! - [`flowsheet::SequenceStore`] - ordered sequence plus local queue
//! - [`backend`] - REST and SSE clients for the backend services
//! - [`api`] - renderer-facing HTTP surface
//! - [`sse`] - renderer-facing event stream

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod flowsheet;
pub mod sse;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{Error, Result};
