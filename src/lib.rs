//! CrewPlan command-line runner
//!
//! Wires the core pipeline to SQLite storage, the HTTP proposal provider and
//! HTTP completion callbacks, driven by layered configuration.

pub mod app;
pub mod callback;
pub mod config;
pub mod logging;
pub mod source;

pub use app::App;
pub use config::Config;
