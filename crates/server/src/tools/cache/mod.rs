//! Refresh and cache-maintenance MCP tools.

pub mod invalidate;
pub mod refresh;
pub mod stats;

pub use invalidate::{InvalidateParams, invalidate_impl};
pub use refresh::{RefreshParams, refresh_impl};
pub use stats::{StatsParams, stats_impl};
