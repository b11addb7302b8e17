//! Event storage and training datasets
//!
//! SQLite persistence for match event logs and the windowed dataset fed to
//! both models.

pub mod database;
pub mod dataset;

pub use database::{Database, DatabaseStats, EventFilter};
pub use dataset::{WindowBatch, WindowBatcher, WindowDataset, WindowSample};
