pub mod candidates;
pub mod correlate;
pub mod detail;
pub mod explore;
pub mod filters;
pub mod markup;
pub mod report;
pub mod retry;
pub mod runner;

#[cfg(test)]
mod test_support;

pub use candidates::{CandidateExtractor, ExploreMode};
pub use correlate::{Correlation, CorrelationEngine, FlightBox};
pub use detail::{CandidateVisit, DetailStage};
pub use explore::{build_explore_url, parse_compact_date, DateSelection, ExplorationStage};
pub use filters::{Luggage, NonstopToggle};
pub use report::{general_table, parse_price, top_deals_table, Report, Reporter, ResultsTable};
pub use retry::{BoundedRetry, RetryOutcome};
pub use runner::{FlightPipeline, Gathered, RunOptions, RunSummary};
