//! Turns saved bookmarks into tone-specific AI summaries, theme labels and
//! weekly digests, with per-owner cost tracking.

pub mod ai;
pub mod clustering;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
