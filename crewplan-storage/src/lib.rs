//! Persistence layer for CrewPlan
//!
//! This crate provides the SQLite-backed implementations of the core
//! `FeedbackStore`, `WeightHistory` and `RunStore` seams, plus the manager
//! that owns the connection pool and applies migrations.

pub mod error;
pub mod manager;
pub mod migrations;
pub mod repositories;

pub use error::{Error, Result};
pub use manager::{DatabaseConfig, DatabaseStats, StorageManager};
pub use repositories::{FeedbackRepository, RunRepository, StoredRun, WeightRepository};

/// Re-export core types for convenience
pub use crewplan_core as core;
