//! Engine Configuration Module
//!
//! Operator-tunable thresholds loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `ENGAGEMENT_CONFIG` environment variable (path to TOML file)
//! 2. `engagement.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! The config is loaded once by the composition root and handed to each
//! service by value or reference; nothing reads it from a global.
//!
//! ```ignore
//! let config = EngineConfig::load();
//! let aggregator = Aggregator::new(store, clock, config.aggregation.clone());
//! ```

mod engine_config;
pub mod defaults;

pub use engine_config::*;
