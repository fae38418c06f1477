//! Tourline Shared Types and Utilities
//!
//! This crate contains the conversation domain types, the error taxonomy and
//! database helpers shared across the Tourline conversation services.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
