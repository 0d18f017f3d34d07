//! Detail-tab filters: luggage counters and the nonstop toggle.
//!
//! Both are best effort. A control that is missing or refuses a click never
//! stops the candidate; the outcome is only logged.

use flightbot_core::config::Config;
use flightbot_tools::Browser;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Luggage {
    pub carry_on: u32,
    pub checked: u32,
}

impl Luggage {
    pub fn from_config(config: &Config) -> Self {
        Self {
            carry_on: config.flight.luggage.carry_on_bag,
            checked: config.flight.luggage.checked_bag,
        }
    }

    /// Requested counts, each falling back to `flight.luggage` when absent.
    pub fn resolve(carry_on: Option<u32>, checked: Option<u32>, config: &Config) -> Self {
        let defaults = Self::from_config(config);
        Self {
            carry_on: carry_on.unwrap_or(defaults.carry_on),
            checked: checked.unwrap_or(defaults.checked),
        }
    }
}

/// How many increments each counter actually accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LuggageApplied {
    pub carry_on: u32,
    pub checked: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonstopToggle {
    AlreadyActive,
    Activated,
    Unavailable,
}

/// Click each increment control once per requested bag. The first refusal
/// ends that control; counters often stop at a site-imposed maximum.
pub async fn apply_luggage(
    browser: &mut dyn Browser,
    config: &Config,
    luggage: Luggage,
) -> LuggageApplied {
    let timeout = config.browser.wait_timeout();
    let locators = &config.locators;
    LuggageApplied {
        carry_on: increment(browser, &locators.luggage_carry_xpath, luggage.carry_on, timeout).await,
        checked: increment(browser, &locators.luggage_checked_xpath, luggage.checked, timeout).await,
    }
}

async fn increment(browser: &mut dyn Browser, locator: &str, times: u32, timeout: Duration) -> u32 {
    for done in 0..times {
        let clicked = match browser.wait_for(locator, timeout).await {
            Ok(()) => browser.click(locator).await,
            Err(e) => Err(e),
        };
        if let Err(e) = clicked {
            debug!(locator, requested = times, applied = done, error = %e, "luggage control stopped");
            return done;
        }
    }
    times
}

/// Turn on the nonstop filter unless it is already on.
pub async fn apply_nonstop(browser: &mut dyn Browser, config: &Config) -> NonstopToggle {
    let locator = &config.locators.nonstop_xpath;
    if let Err(e) = browser.wait_for(locator, config.browser.wait_timeout()).await {
        debug!(error = %e, "nonstop filter not present");
        return NonstopToggle::Unavailable;
    }
    match browser.is_selected(locator).await {
        Ok(true) => NonstopToggle::AlreadyActive,
        Ok(false) => match browser.click(locator).await {
            Ok(()) => NonstopToggle::Activated,
            Err(e) => {
                debug!(error = %e, "nonstop filter click failed");
                NonstopToggle::Unavailable
            }
        },
        Err(e) => {
            debug!(error = %e, "nonstop filter state unreadable");
            NonstopToggle::Unavailable
        }
    }
}
