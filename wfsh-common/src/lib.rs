//! # WFSH Common Library
//!
//! Shared code for the WFSH flowsheet services including:
//! - Flowsheet entry model and wire classification
//! - Event types (FlowsheetEvent enum) and EventBus
//! - Live update channel wire types
//! - API request/response types
//! - Configuration loading

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod model;

pub use error::{Error, Result};
