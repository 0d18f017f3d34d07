//! One complete exploration run.

use crate::candidates::{CandidateExtractor, ExploreMode};
use crate::detail::{CandidateVisit, DetailStage};
use crate::explore::{DateSelection, ExplorationStage};
use crate::filters::Luggage;
use crate::report::{Report, Reporter};
use flightbot_core::config::Config;
use flightbot_core::{Error, Result, Route, RunState};
use flightbot_tools::{Browser, LinkShortener, ReportTransport};
use tracing::{error, info};

/// Inputs of one run, already resolved against the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub route: Route,
    pub dates: DateSelection,
    pub mode: ExploreMode,
    pub luggage: Luggage,
}

impl RunOptions {
    /// Everything from the config: configured route, month range, default
    /// luggage and the site's own cheapest destinations.
    pub fn from_config(config: &Config) -> Self {
        Self {
            route: Route::new(
                config.explore.location.from.clone(),
                config.explore.location.to.clone(),
            ),
            dates: DateSelection::from_config(),
            mode: ExploreMode::Anywhere,
            luggage: Luggage::from_config(config),
        }
    }
}

/// Browsing side of a run, before reporting.
#[derive(Debug, Clone)]
pub struct Gathered {
    pub explore_url: String,
    pub candidates: usize,
    pub visits: Vec<CandidateVisit>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub gathered: Gathered,
    pub state: RunState,
    pub report: Report,
}

pub struct FlightPipeline<'a> {
    config: &'a Config,
    shortener: &'a dyn LinkShortener,
    transport: &'a dyn ReportTransport,
}

impl<'a> FlightPipeline<'a> {
    pub fn new(
        config: &'a Config,
        shortener: &'a dyn LinkShortener,
        transport: &'a dyn ReportTransport,
    ) -> Self {
        Self {
            config,
            shortener,
            transport,
        }
    }

    /// Explore, extract candidates and visit each of them, filling `state`.
    ///
    /// An empty explore page aborts before any detail tab is opened.
    pub async fn gather(
        &self,
        browser: &mut dyn Browser,
        options: &RunOptions,
        state: &mut RunState,
    ) -> Result<Gathered> {
        let explore_url = ExplorationStage::new(self.config)
            .load(browser, &options.route, &options.dates)
            .await?;

        let extractor = CandidateExtractor::new(self.config, &options.route, options.mode);
        let candidates = match extractor.extract(browser, state).await {
            Ok(n) => n,
            Err(e @ Error::BlockedOrEmptyResult { .. }) => {
                error!(error = %e, errors = state.error_count, "no candidates, aborting run");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let detail = DetailStage::new(self.config, options.mode, options.luggage, self.shortener);
        let visits = detail.visit_all(browser, state).await?;

        info!(
            candidates,
            offers = state.top_results.len(),
            errors = state.error_count,
            "exploration finished"
        );
        Ok(Gathered {
            explore_url,
            candidates,
            visits,
        })
    }

    pub async fn report(&self, state: &RunState, route: &Route) -> Result<Report> {
        Reporter::new(
            self.transport,
            &self.config.email.subject,
            &self.config.email.body,
        )
        .publish(state, route)
        .await
    }

    pub async fn run(&self, browser: &mut dyn Browser, options: &RunOptions) -> Result<RunSummary> {
        let mut state = RunState::new();
        let gathered = self.gather(browser, options, &mut state).await?;
        let report = self.report(&state, &options.route).await?;
        Ok(RunSummary {
            gathered,
            state,
            report,
        })
    }
}
