//! Per-candidate detail tab handling.
//!
//! For candidate `i` the stage walks the explore page's `i`-th destination
//! through these steps, strictly in order and never overlapping with another
//! candidate:
//!
//! 1. select the destination on the explore tab
//! 2. open the detail tab, switch to it, refresh and settle
//! 3. apply luggage and nonstop filters (best effort)
//! 4. read every flight box and correlate it
//! 5. close the detail tab, switch back to the explore tab and go back
//!
//! Step 5 runs whenever step 2 produced a tab, whatever happened in between.

use crate::candidates::ExploreMode;
use crate::correlate::{Correlation, CorrelationEngine, FlightBox};
use crate::filters::{apply_luggage, apply_nonstop, Luggage};
use flightbot_core::config::Config;
use flightbot_core::{Candidate, Error, Result, RunState};
use flightbot_tools::browser::nth_locator;
use flightbot_tools::{Browser, ElementRef, LinkShortener, TabHandle};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

const TAB_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// What happened on one candidate's detail tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateVisit {
    pub index: usize,
    pub boxes: usize,
    pub accepted: usize,
    pub mismatched: usize,
    /// A flight box could not be read; the remaining boxes were skipped.
    pub aborted: bool,
}

pub struct DetailStage<'a> {
    config: &'a Config,
    destination: &'a str,
    luggage: Luggage,
    engine: CorrelationEngine<'a>,
}

impl<'a> DetailStage<'a> {
    pub fn new(
        config: &'a Config,
        mode: ExploreMode,
        luggage: Luggage,
        shortener: &'a dyn LinkShortener,
    ) -> Self {
        Self {
            config,
            destination: mode.result_locators(&config.locators).destination,
            luggage,
            engine: CorrelationEngine::new(config, shortener),
        }
    }

    /// Visit every candidate in index order. Accepted offers are appended to
    /// `state.top_results`.
    pub async fn visit_all(
        &self,
        browser: &mut dyn Browser,
        state: &mut RunState,
    ) -> Result<Vec<CandidateVisit>> {
        let total = state.general_results.len();
        let mut visits = Vec::with_capacity(total);
        for index in 0..total {
            let visit = self.visit(browser, state, index).await?;
            info!(
                index,
                total,
                accepted = visit.accepted,
                mismatched = visit.mismatched,
                aborted = visit.aborted,
                "Finding top deals"
            );
            visits.push(visit);
        }
        Ok(visits)
    }

    pub async fn visit(
        &self,
        browser: &mut dyn Browser,
        state: &mut RunState,
        index: usize,
    ) -> Result<CandidateVisit> {
        let candidate = state
            .candidate(index)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no candidate at index {}", index)))?;
        let timeout = self.config.browser.wait_timeout();
        let origin = browser.current_window().await?;

        let destination = nth_locator(self.destination, index + 1);
        browser.wait_for(&destination, timeout).await?;
        browser.click(&destination).await?;

        let check_flights = &self.config.locators.check_flights_xpath;
        browser.wait_for(check_flights, timeout).await?;
        browser.click(check_flights).await?;
        let tab = self.await_new_tab(browser, &origin).await?;
        browser.switch_to(&tab).await?;
        debug!(index, tab = %tab, city = %candidate.city, "switched to detail tab");

        let mut visit = CandidateVisit {
            index,
            ..Default::default()
        };
        let worked = self
            .work_in_tab(browser, &candidate, state, &mut visit)
            .await;
        let released = release_tab(browser, &origin).await;
        worked?;
        released?;
        Ok(visit)
    }

    async fn work_in_tab(
        &self,
        browser: &mut dyn Browser,
        candidate: &Candidate,
        state: &mut RunState,
        visit: &mut CandidateVisit,
    ) -> Result<()> {
        let settle = self.config.browser.settle_delay();
        browser.refresh().await?;
        sleep(settle).await;

        let luggage = apply_luggage(browser, self.config, self.luggage).await;
        let nonstop = apply_nonstop(browser, self.config).await;
        debug!(?luggage, ?nonstop, "filters applied");
        sleep(settle).await;

        let boxes = browser
            .find_all(&self.config.locators.flight_box_xpath)
            .await?;
        visit.boxes = boxes.len();

        for (n, element) in boxes.iter().enumerate() {
            let flight = match self.read_box(browser, element).await {
                Ok(flight) => flight,
                Err(e) => {
                    error!(index = visit.index, flight_box = n, error = %e, "issue with flight box element");
                    state.record_extraction_failure();
                    visit.aborted = true;
                    break;
                }
            };
            match self.engine.correlate(flight, candidate).await {
                Correlation::Accepted(offer) => {
                    state.top_results.push(offer);
                    visit.accepted += 1;
                }
                Correlation::CarrierMismatch { .. } => visit.mismatched += 1,
            }
        }
        Ok(())
    }

    async fn read_box(&self, browser: &mut dyn Browser, element: &ElementRef) -> Result<FlightBox> {
        let markup = browser
            .read_attribute(element, "outerHTML")
            .await?
            .ok_or_else(|| Error::Extraction("flight box has no markup".into()))?;
        FlightBox::parse(&markup, &self.config.locators)
    }

    /// Newest window other than `origin`, polled until the wait timeout.
    async fn await_new_tab(&self, browser: &mut dyn Browser, origin: &TabHandle) -> Result<TabHandle> {
        let deadline = Instant::now() + self.config.browser.wait_timeout();
        loop {
            let handles = browser.window_handles().await?;
            if let Some(tab) = handles.into_iter().rev().find(|h| h != origin) {
                return Ok(tab);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout("detail tab did not open".into()));
            }
            sleep(TAB_POLL_INTERVAL).await;
        }
    }
}

/// Close the active detail tab and return to the explore results.
async fn release_tab(browser: &mut dyn Browser, origin: &TabHandle) -> Result<()> {
    let closed = browser.close_window().await;
    if let Err(e) = &closed {
        warn!(error = %e, "failed to close detail tab");
    }
    browser.switch_to(origin).await?;
    browser.back().await?;
    closed
}
