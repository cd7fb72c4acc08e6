//! Shared API types for WFSH services

pub mod types;

pub use types::ErrorResponse;
