//! qorch orchestrator.
//!
//! Wires the quota ledger, recommendation scorer, connectivity probe and
//! configuration deployer from environment configuration, and serves them
//! over HTTP.

pub mod api;
pub mod config;
pub mod engine;
pub mod state;

pub use config::Config;
pub use engine::Engine;
pub use state::AppState;
