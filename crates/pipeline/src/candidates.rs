//! Reads destination candidates off the loaded explore page.

use crate::markup::{parse_fragment, texts_by_class};
use crate::retry::{click_until_registered, RetryOutcome, DROP_DOWN_CONFIRM, FIELD_CLEAR};
use flightbot_core::config::{Config, Locators};
use flightbot_core::{Candidate, Error, Result, Route, RunState};
use flightbot_tools::Browser;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

/// How the explore page was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploreMode {
    /// The site's own cheapest-destinations grid.
    Anywhere,
    /// The location fields were rewritten to the user's route; results render
    /// without a city label.
    UserSpecified,
}

/// Locators that differ between the two explore modes.
#[derive(Debug, Clone, Copy)]
pub struct ResultLocators<'a> {
    pub entries: &'a str,
    pub price_class: &'a str,
    pub city_class: &'a str,
    pub date_class: &'a str,
    /// Base of the per-destination selector used by the detail stage.
    pub destination: &'a str,
}

impl ExploreMode {
    pub fn result_locators(self, locators: &Locators) -> ResultLocators<'_> {
        match self {
            Self::Anywhere => ResultLocators {
                entries: &locators.flight_xpath,
                price_class: &locators.price_class,
                city_class: &locators.city_class,
                date_class: &locators.date_class,
                destination: &locators.curr_cheap_dest_xpath,
            },
            Self::UserSpecified => ResultLocators {
                entries: &locators.specific_flight_xpath,
                price_class: &locators.specific_price_class,
                city_class: &locators.specific_city_class,
                date_class: &locators.specific_date_class,
                destination: &locators.check_flights_xpath,
            },
        }
    }
}

/// `"from $120"` reads as `"$120"`; a single token is kept whole.
pub fn starting_price(text: &str) -> String {
    let mut tokens = text.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(_), Some(second)) => second.to_string(),
        (Some(only), None) => only.to_string(),
        _ => String::new(),
    }
}

/// Build a candidate from one result's markup. `city` overrides the label
/// read from the page.
pub fn parse_candidate(
    markup: &str,
    locators: &ResultLocators<'_>,
    city: Option<&str>,
) -> Result<Candidate> {
    let doc = parse_fragment(markup);
    let first = |class: &str, what: &str| -> Result<String> {
        texts_by_class(&doc, "div", class)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Extraction(format!("result has no {} (div.{})", what, class)))
    };

    let price = first(locators.price_class, "price")?;
    let date_range = first(locators.date_class, "dates")?;
    let city = match city {
        Some(c) => c.to_string(),
        None => first(locators.city_class, "city")?,
    };

    Ok(Candidate {
        city,
        date_range,
        starting_price: starting_price(&price),
    })
}

pub struct CandidateExtractor<'a> {
    config: &'a Config,
    route: &'a Route,
    mode: ExploreMode,
}

impl<'a> CandidateExtractor<'a> {
    pub fn new(config: &'a Config, route: &'a Route, mode: ExploreMode) -> Self {
        Self {
            config,
            route,
            mode,
        }
    }

    /// Append every explore result to `state.general_results`, in page order.
    ///
    /// An empty page is fatal: the site either blocked the session or had
    /// nothing to show.
    pub async fn extract(&self, browser: &mut dyn Browser, state: &mut RunState) -> Result<usize> {
        if self.mode == ExploreMode::UserSpecified {
            self.modify_locations(browser).await?;
        }

        let locators = self.mode.result_locators(&self.config.locators);
        let entries = browser.find_all(locators.entries).await?;
        if entries.is_empty() {
            error!(locator = locators.entries, "Bot encountered an error/block, try again later");
            return Err(Error::BlockedOrEmptyResult {
                locator: locators.entries.to_string(),
            });
        }

        let city = match self.mode {
            ExploreMode::UserSpecified => Some(self.route.to.as_str()),
            ExploreMode::Anywhere => None,
        };

        for entry in &entries {
            let markup = browser
                .read_attribute(entry, "outerHTML")
                .await?
                .ok_or_else(|| {
                    Error::Extraction(format!("{}[{}] has no markup", entry.locator(), entry.index()))
                })?;
            let candidate = parse_candidate(&markup, &locators, city)?;
            debug!(
                index = state.general_results.len(),
                city = %candidate.city,
                price = %candidate.starting_price,
                "candidate"
            );
            state.general_results.push(candidate);
        }

        info!(count = entries.len(), "Gathered general flights info");
        Ok(entries.len())
    }

    async fn modify_locations(&self, browser: &mut dyn Browser) -> Result<()> {
        let l = &self.config.locators;
        self.change_location(
            browser,
            &l.from_click_drop_xpath,
            &l.from_xpath,
            &l.from_loc_drop_down_xpath,
            &self.route.from,
        )
        .await?;
        self.change_location(
            browser,
            &l.to_click_drop_xpath,
            &l.to_xpath,
            &l.to_loc_drop_down_xpath,
            &self.route.to,
        )
        .await
    }

    async fn change_location(
        &self,
        browser: &mut dyn Browser,
        open: &str,
        field: &str,
        drop_down: &str,
        value: &str,
    ) -> Result<()> {
        browser.wait_for(open, self.config.browser.wait_timeout()).await?;
        browser.click(open).await?;

        let cleared = FIELD_CLEAR
            .run(&mut *browser, |b| {
                let field = field.to_string();
                async move {
                    if b.input_value(&field).await?.is_empty() {
                        return Ok(());
                    }
                    b.clear_input(&field).await?;
                    Err(Error::Validation(format!("{} still has a value", field)))
                }
                .boxed()
            })
            .await;
        if let RetryOutcome::Exhausted { attempts, .. } = cleared {
            warn!(field, attempts, "location field did not clear");
        }

        browser.type_text(field, value).await?;

        if self.config.explore.location.no_drop_down.iter().any(|v| v == value) {
            return Ok(());
        }
        match click_until_registered(browser, drop_down, DROP_DOWN_CONFIRM).await {
            RetryOutcome::Succeeded { attempt, .. } => {
                debug!(drop_down, attempt, "drop-down suggestion confirmed")
            }
            RetryOutcome::Exhausted { attempts, .. } => {
                debug!(drop_down, attempts, "drop-down suggestion never registered")
            }
        }
        Ok(())
    }
}
