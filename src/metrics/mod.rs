pub mod collector;
pub mod stream;
pub mod summary;

pub use collector::{StatsCollector, StatsSnapshot};
pub use summary::LatencySummary;
