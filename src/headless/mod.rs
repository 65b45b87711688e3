//! Headless mode for automated runs
//!
//! This module runs scenarios without any graphical output, suitable for
//! automated testing, balance sweeps and agent integration.
//!
//! ## Usage
//!
//! ```bash
//! # Run a headless scenario
//! cargo run --release -- --scenario scenarios/default.json
//! ```
//!
//! ## JSON Configuration
//!
//! ```json
//! {
//!   "random_seed": 42,
//!   "max_duration_secs": 120,
//!   "squads": [{ "type_id": "archer", "count": 3, "position": [0.0, 0.0] }],
//!   "waves": [
//!     { "start_secs": 2.0, "count": 10, "interval_secs": 0.5,
//!       "spawns": [{ "type_id": "grunt", "weight": 3.0 }] }
//!   ]
//! }
//! ```

pub mod config;
pub mod runner;

pub use config::ScenarioConfig;
pub use runner::{run_headless, run_headless_with_log, MatchOutcome, MatchResult};
