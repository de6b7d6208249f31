//! Shared data structures for external-video engagement estimation
//!
//! - Events: ClickEvent / ReturnEvent and the tagged `EventRecord`
//! - Platforms: platform families, duration buckets, nominal durations
//! - Scales: `Fraction` (0..=1) vs `Percent` (0..=100)
//! - Ranges: 7d / 30d / 90d aggregation windows
//! - Estimates: per-video stats, labels and completion reports

mod event;
mod platform;
mod scale;
mod range;
mod estimate;

pub use event::*;
pub use platform::*;
pub use scale::*;
pub use range::*;
pub use estimate::*;
