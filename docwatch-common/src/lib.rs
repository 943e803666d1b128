//! # docwatch Common Library
//!
//! Shared code for the docwatch workspace including:
//! - Job service wire types (task summaries, file tree DTOs, scan/analyze requests)
//! - Push event envelope and payload types
//! - Configuration loading
//! - Timestamp helpers

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
