//! Scripted in-memory browser and service doubles for pipeline tests.

use async_trait::async_trait;
use flightbot_core::config::{Config, Locators};
use flightbot_core::{Error, Result};
use flightbot_tools::{Browser, ElementRef, LinkShortener, ReportEmail, ReportTransport, TabHandle};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SAMPLE_CONFIG: &str = r#"{
  "headless": true,
  "site": "https://www.kayak.com/",
  "explore": {
    "location": { "from": "TLV", "to": "anywhere" },
    "filters": { "stops": 0 },
    "dates": { "range": { "duration": "5,10", "month": 9 } }
  },
  "flight": { "luggage": { "carry-on_bag": 1, "checked_bag": 0 } },
  "xPaths": {
    "flight_xpath": "//div[@class='Explore-GridViewItem']",
    "price_class": "price",
    "city_class": "city",
    "date_class": "dates",
    "curr_cheap_dest_xpath": "(//div[@class='Explore-GridViewItem'])",
    "specific_flight_xpath": "//div[@class='Explore-Specific']",
    "specific_price_class": "price",
    "specific_city_class": "city",
    "specific_date_class": "dates",
    "from_xpath": "//input[@name='origin']",
    "to_xpath": "//input[@name='destination']",
    "from_loc_drop_down_xpath": "//li[@id='origin-0']",
    "to_loc_drop_down_xpath": "//li[@id='destination-0']",
    "from_click_drop_xpath": "//div[@id='origin-box']",
    "to_click_drop_xpath": "//div[@id='destination-box']",
    "check_flights_xpath": "//a[@class='check-flights']",
    "luggage_carry_xpath": "//button[@aria-label='Increase carry-on']",
    "luggage_checked_xpath": "//button[@aria-label='Increase checked']",
    "nonstop_xpath": "//input[@id='stops-0']",
    "flight_box_xpath": "//div[@class='resultWrapper']",
    "f_price_class": "price-text",
    "f_times_class": "depart-time base-time",
    "f_carry_bag_class": "bag-count"
  },
  "browser": { "settleMillis": 0, "waitTimeoutSecs": 1 }
}"#;

pub fn sample_config() -> Config {
    Config::from_json_str(SAMPLE_CONFIG).unwrap()
}

/// Markup of one explore-page result.
pub fn explore_entry(city: &str, dates: &str, price: &str) -> String {
    format!(
        r#"<div class="Explore-GridViewItem"><div class="city">{}</div><div class="dates">{}</div><div class="price">from {}</div></div>"#,
        city, dates, price
    )
}

/// Markup of one detail-tab flight box. Carriers are rendered as the text
/// node right after each time block.
pub fn flight_box(
    price: &str,
    outbound_carrier: &str,
    return_carrier: &str,
    carry_indicator: &str,
    href: &str,
) -> String {
    format!(
        concat!(
            r#"<div class="resultWrapper">"#,
            r#"<div class="leg"><div class="depart-time base-time">08:00 - 10:30</div>{}</div>"#,
            r#"<div class="leg"><div class="depart-time base-time">19:15 - 21:40</div>{}</div>"#,
            r#"<div class="bags"><div class="bag-count">0</div><div class="bag-count">{}</div></div>"#,
            r#"<div class="price-text">{}</div>"#,
            r#"<div class="booking"><a href="{}">View Deal</a></div>"#,
            r#"</div>"#
        ),
        outbound_carrier, return_carrier, carry_indicator, price, href
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Explore,
    Detail(usize),
}

/// Browser double. One explore tab exists from the start; clicking the
/// check-flights control after selecting the i-th destination opens a detail
/// tab for candidate i (without switching to it, like a real browser).
pub struct FakeBrowser {
    locators: Locators,
    destination_base: String,
    tabs: Vec<(TabHandle, Tab)>,
    active: Option<TabHandle>,
    next_tab: usize,
    explore_entries: HashMap<String, Vec<String>>,
    detail_boxes: Vec<Vec<String>>,
    selected: Option<usize>,
    failing_reads: HashSet<(usize, usize)>,
    missing: HashSet<String>,
    inputs: HashMap<String, String>,
    sticky_clears: u32,
    drop_down_failures: u32,
    nonstop_present: bool,
    nonstop_selected: bool,
    luggage_limit: Option<u32>,
    luggage_clicks: HashMap<String, u32>,
    visited: Vec<String>,
    clicks: Vec<String>,
    log: Vec<String>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        let config = sample_config();
        let destination_base = config.locators.curr_cheap_dest_xpath.clone();
        Self {
            locators: config.locators,
            destination_base,
            tabs: vec![(TabHandle::new("explore"), Tab::Explore)],
            active: Some(TabHandle::new("explore")),
            next_tab: 1,
            explore_entries: HashMap::new(),
            detail_boxes: Vec::new(),
            selected: None,
            failing_reads: HashSet::new(),
            missing: HashSet::new(),
            inputs: HashMap::new(),
            sticky_clears: 0,
            drop_down_failures: 0,
            nonstop_present: true,
            nonstop_selected: false,
            luggage_limit: None,
            luggage_clicks: HashMap::new(),
            visited: Vec::new(),
            clicks: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Explore page results under `locator`.
    pub fn with_explore_entries(mut self, locator: &str, entries: Vec<String>) -> Self {
        self.explore_entries.insert(locator.to_string(), entries);
        self
    }

    /// Flight boxes shown in the detail tab of each candidate, by index.
    pub fn with_detail_boxes(mut self, boxes: Vec<Vec<String>>) -> Self {
        self.detail_boxes = boxes;
        self
    }

    /// Locator used to select the i-th destination (1-based suffix).
    pub fn with_destination_base(mut self, base: &str) -> Self {
        self.destination_base = base.to_string();
        self
    }

    pub fn with_failing_read(mut self, candidate: usize, flight_box: usize) -> Self {
        self.failing_reads.insert((candidate, flight_box));
        self
    }

    /// `locator` is never found: waits time out, clicks and lookups fail.
    pub fn with_missing(mut self, locator: &str) -> Self {
        self.missing.insert(locator.to_string());
        self
    }

    pub fn with_input(mut self, locator: &str, value: &str) -> Self {
        self.inputs.insert(locator.to_string(), value.to_string());
        self
    }

    /// The next `n` clears leave the field untouched.
    pub fn with_sticky_clears(mut self, n: u32) -> Self {
        self.sticky_clears = n;
        self
    }

    /// The next `n` drop-down confirmation clicks fail.
    pub fn with_drop_down_failures(mut self, n: u32) -> Self {
        self.drop_down_failures = n;
        self
    }

    pub fn with_nonstop(mut self, present: bool, selected: bool) -> Self {
        self.nonstop_present = present;
        self.nonstop_selected = selected;
        self
    }

    /// Luggage increment controls stop responding after `limit` clicks each.
    pub fn with_luggage_limit(mut self, limit: u32) -> Self {
        self.luggage_limit = Some(limit);
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.clone()
    }

    pub fn clicks(&self) -> &[String] {
        &self.clicks
    }

    pub fn clicks_on(&self, locator: &str) -> usize {
        self.clicks.iter().filter(|c| c.as_str() == locator).count()
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn input(&self, locator: &str) -> String {
        self.inputs.get(locator).cloned().unwrap_or_default()
    }

    pub fn nonstop_selected(&self) -> bool {
        self.nonstop_selected
    }

    pub fn luggage_clicks(&self, locator: &str) -> u32 {
        self.luggage_clicks.get(locator).copied().unwrap_or(0)
    }

    pub fn open_tabs(&self) -> usize {
        self.tabs.len()
    }

    pub fn active_tab(&self) -> Option<&str> {
        self.active.as_ref().map(|h| h.as_str())
    }

    fn active_tab_kind(&self) -> Result<Tab> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| Error::Browser("no active window".into()))?;
        self.tabs
            .iter()
            .find(|(h, _)| h == active)
            .map(|(_, t)| *t)
            .ok_or_else(|| Error::Browser(format!("window {} is gone", active)))
    }

    fn destination_position(&self, locator: &str) -> Option<usize> {
        locator
            .strip_prefix(self.destination_base.as_str())?
            .strip_prefix('[')?
            .strip_suffix(']')?
            .parse()
            .ok()
    }

    fn markups(&self, tab: Tab, locator: &str) -> Vec<String> {
        match tab {
            Tab::Explore => self.explore_entries.get(locator).cloned().unwrap_or_default(),
            Tab::Detail(i) if locator == self.locators.flight_box_xpath => {
                self.detail_boxes.get(i).cloned().unwrap_or_default()
            }
            Tab::Detail(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.active_tab_kind()?;
        self.visited.push(url.to_string());
        self.log.push(format!("navigate {}", url));
        Ok(())
    }

    async fn find_all(&mut self, locator: &str) -> Result<Vec<ElementRef>> {
        let tab = self.active_tab_kind()?;
        if self.missing.contains(locator) {
            return Err(Error::Browser(format!("target crashed while looking up {}", locator)));
        }
        let count = self.markups(tab, locator).len();
        Ok((0..count).map(|i| ElementRef::new(locator, i)).collect())
    }

    async fn wait_for(&mut self, locator: &str, _timeout: Duration) -> Result<()> {
        self.active_tab_kind()?;
        if self.missing.contains(locator)
            || (locator == self.locators.nonstop_xpath && !self.nonstop_present)
        {
            return Err(Error::Timeout(locator.to_string()));
        }
        Ok(())
    }

    async fn click(&mut self, locator: &str) -> Result<()> {
        let tab = self.active_tab_kind()?;
        self.clicks.push(locator.to_string());
        if self.missing.contains(locator) {
            return Err(Error::ElementNotFound(locator.to_string()));
        }

        if tab == Tab::Explore {
            if let Some(position) = self.destination_position(locator) {
                if position == 0 {
                    return Err(Error::ElementNotFound(locator.to_string()));
                }
                self.selected = Some(position - 1);
                self.log.push(format!("select {}", position - 1));
                return Ok(());
            }
            if locator == self.locators.check_flights_xpath {
                let candidate = self
                    .selected
                    .take()
                    .ok_or_else(|| Error::Browser("no destination selected".into()))?;
                let handle = TabHandle::new(format!("detail-{}", self.next_tab));
                self.next_tab += 1;
                self.log.push(format!("open {}", handle));
                self.tabs.push((handle, Tab::Detail(candidate)));
                return Ok(());
            }
            if locator == self.locators.from_loc_drop_down_xpath
                || locator == self.locators.to_loc_drop_down_xpath
            {
                if self.drop_down_failures > 0 {
                    self.drop_down_failures -= 1;
                    return Err(Error::Browser("element click intercepted".into()));
                }
                return Ok(());
            }
            return Ok(());
        }

        if locator == self.locators.nonstop_xpath {
            if !self.nonstop_present {
                return Err(Error::ElementNotFound(locator.to_string()));
            }
            self.nonstop_selected = !self.nonstop_selected;
            return Ok(());
        }
        if locator == self.locators.luggage_carry_xpath
            || locator == self.locators.luggage_checked_xpath
        {
            let clicks = self.luggage_clicks.entry(locator.to_string()).or_insert(0);
            if let Some(limit) = self.luggage_limit {
                if *clicks >= limit {
                    return Err(Error::Timeout(locator.to_string()));
                }
            }
            *clicks += 1;
        }
        Ok(())
    }

    async fn is_selected(&mut self, locator: &str) -> Result<bool> {
        self.active_tab_kind()?;
        if locator == self.locators.nonstop_xpath {
            return Ok(self.nonstop_selected);
        }
        Ok(false)
    }

    async fn read_text(&mut self, element: &ElementRef) -> Result<String> {
        let tab = self.active_tab_kind()?;
        self.markups(tab, element.locator())
            .get(element.index())
            .cloned()
            .ok_or_else(|| Error::ElementNotFound(element.locator().to_string()))
    }

    async fn read_attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>> {
        let tab = self.active_tab_kind()?;
        if let Tab::Detail(candidate) = tab {
            if self.failing_reads.contains(&(candidate, element.index())) {
                return Err(Error::Browser("stale element reference".into()));
            }
        }
        if name != "outerHTML" {
            return Ok(None);
        }
        Ok(self.markups(tab, element.locator()).get(element.index()).cloned())
    }

    async fn input_value(&mut self, locator: &str) -> Result<String> {
        self.active_tab_kind()?;
        Ok(self.input(locator))
    }

    async fn clear_input(&mut self, locator: &str) -> Result<()> {
        self.active_tab_kind()?;
        self.log.push(format!("clear {}", locator));
        if self.sticky_clears > 0 {
            self.sticky_clears -= 1;
            return Ok(());
        }
        self.inputs.insert(locator.to_string(), String::new());
        Ok(())
    }

    async fn type_text(&mut self, locator: &str, text: &str) -> Result<()> {
        self.active_tab_kind()?;
        self.log.push(format!("type {} {}", locator, text));
        self.inputs
            .entry(locator.to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn window_handles(&mut self) -> Result<Vec<TabHandle>> {
        Ok(self.tabs.iter().map(|(h, _)| h.clone()).collect())
    }

    async fn current_window(&mut self) -> Result<TabHandle> {
        self.active
            .clone()
            .ok_or_else(|| Error::Browser("no active window".into()))
    }

    async fn switch_to(&mut self, handle: &TabHandle) -> Result<()> {
        if !self.tabs.iter().any(|(h, _)| h == handle) {
            return Err(Error::Browser(format!("no such window {}", handle)));
        }
        self.log.push(format!("switch {}", handle));
        self.active = Some(handle.clone());
        Ok(())
    }

    async fn close_window(&mut self) -> Result<()> {
        let active = self
            .active
            .take()
            .ok_or_else(|| Error::Browser("no active window".into()))?;
        self.log.push(format!("close {}", active));
        self.tabs.retain(|(h, _)| *h != active);
        Ok(())
    }

    async fn back(&mut self) -> Result<()> {
        self.active_tab_kind()?;
        self.log.push("back".into());
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.active_tab_kind()?;
        self.log.push("refresh".into());
        Ok(())
    }
}

/// Shortener that always fails.
pub struct FailingShortener;

#[async_trait]
impl LinkShortener for FailingShortener {
    async fn shorten(&self, _url: &str) -> Result<String> {
        Err(Error::Shortener("service unavailable".into()))
    }
}

/// Shortener that maps every URL to `https://tiny.test/<n>` and records input.
#[derive(Default)]
pub struct RecordingShortener {
    pub seen: Mutex<Vec<String>>,
}

#[async_trait]
impl LinkShortener for RecordingShortener {
    async fn shorten(&self, url: &str) -> Result<String> {
        let mut seen = self.seen.lock().unwrap();
        seen.push(url.to_string());
        Ok(format!("https://tiny.test/{}", seen.len()))
    }
}

/// Transport that keeps delivered emails, or fails when asked to.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<ReportEmail>>,
    pub fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<ReportEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportTransport for RecordingTransport {
    async fn deliver(&self, email: &ReportEmail) -> Result<()> {
        if self.fail {
            return Err(Error::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Formatted log output of the current thread, for asserting on what a
/// stage reported.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Events on this thread land here until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
