//! Site traversal and the multi-site harvest run.
//!
//! [`CrawlEngine`] walks one site breadth-first within a page budget.
//! [`Harvester`] runs one crawl-then-download task per seed site and bounds
//! the whole run with a wall-clock timeout.

mod engine;
mod frontier;
mod harvester;
mod stats;

pub use engine::{CrawlEngine, SiteCrawl};
pub use frontier::Frontier;
pub use harvester::{HarvestError, HarvestReport, Harvester, SiteReport};
pub use stats::{HarvestStats, HarvestSummary};
