use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::Paths;

/// Environment variable that overrides `email.appPassword`.
pub const SMTP_PASSWORD_ENV: &str = "FLIGHTBOT_SMTP_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub headless: bool,
    pub site: String,
    pub explore: ExploreConfig,
    pub flight: FlightConfig,
    #[serde(rename = "xPaths")]
    pub locators: Locators,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreConfig {
    pub location: LocationConfig,
    pub filters: FiltersConfig,
    pub dates: DatesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationConfig {
    pub from: String,
    pub to: String,
    /// Location values the explore form accepts without confirming a
    /// drop-down suggestion.
    #[serde(default = "default_no_drop_down")]
    pub no_drop_down: Vec<String>,
}

fn default_no_drop_down() -> Vec<String> {
    vec!["anywhere".to_string(), "EUcg".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersConfig {
    /// Value of the `stops` query parameter, e.g. `"0"` or `"-1"`.
    #[serde(deserialize_with = "string_or_number")]
    pub stops: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatesConfig {
    pub range: RangeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeConfig {
    /// Trip length in days as `"min,max"`.
    pub duration: String,
    pub month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightConfig {
    pub luggage: LuggageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LuggageConfig {
    #[serde(rename = "carry-on_bag")]
    pub carry_on_bag: u32,
    #[serde(rename = "checked_bag")]
    pub checked_bag: u32,
}

/// Named UI locators. XPath fields end in `_xpath`; the `*_class` fields are
/// CSS class names matched inside element markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locators {
    // explore page, default mode
    pub flight_xpath: String,
    pub price_class: String,
    pub city_class: String,
    pub date_class: String,
    pub curr_cheap_dest_xpath: String,

    // explore page, user-specified mode
    pub specific_flight_xpath: String,
    pub specific_price_class: String,
    pub specific_city_class: String,
    pub specific_date_class: String,

    // location form
    pub from_xpath: String,
    pub to_xpath: String,
    pub from_loc_drop_down_xpath: String,
    pub to_loc_drop_down_xpath: String,
    pub from_click_drop_xpath: String,
    pub to_click_drop_xpath: String,

    // detail tab
    pub check_flights_xpath: String,
    pub luggage_carry_xpath: String,
    pub luggage_checked_xpath: String,
    pub nonstop_xpath: String,
    pub flight_box_xpath: String,
    pub f_price_class: String,
    pub f_times_class: String,
    pub f_carry_bag_class: String,
}

impl Locators {
    pub fn xpaths(&self) -> [(&'static str, &str); 14] {
        [
            ("flight_xpath", &self.flight_xpath),
            ("curr_cheap_dest_xpath", &self.curr_cheap_dest_xpath),
            ("specific_flight_xpath", &self.specific_flight_xpath),
            ("from_xpath", &self.from_xpath),
            ("to_xpath", &self.to_xpath),
            ("from_loc_drop_down_xpath", &self.from_loc_drop_down_xpath),
            ("to_loc_drop_down_xpath", &self.to_loc_drop_down_xpath),
            ("from_click_drop_xpath", &self.from_click_drop_xpath),
            ("to_click_drop_xpath", &self.to_click_drop_xpath),
            ("check_flights_xpath", &self.check_flights_xpath),
            ("luggage_carry_xpath", &self.luggage_carry_xpath),
            ("luggage_checked_xpath", &self.luggage_checked_xpath),
            ("nonstop_xpath", &self.nonstop_xpath),
            ("flight_box_xpath", &self.flight_box_xpath),
        ]
    }

    pub fn class_names(&self) -> [(&'static str, &str); 9] {
        [
            ("price_class", &self.price_class),
            ("city_class", &self.city_class),
            ("date_class", &self.date_class),
            ("specific_price_class", &self.specific_price_class),
            ("specific_city_class", &self.specific_city_class),
            ("specific_date_class", &self.specific_date_class),
            ("f_price_class", &self.f_price_class),
            ("f_times_class", &self.f_times_class),
            ("f_carry_bag_class", &self.f_carry_bag_class),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Floor applied to every element lookup.
    #[serde(default = "default_implicit_wait_secs")]
    pub implicit_wait_secs: u64,
    /// Explicit wait-for-presence timeout used at click sites.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_settle_millis")]
    pub settle_millis: u64,
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default)]
    pub profile_dir: Option<String>,
}

fn default_implicit_wait_secs() -> u64 {
    15
}

fn default_wait_timeout_secs() -> u64 {
    10
}

fn default_settle_millis() -> u64 {
    2000
}

fn default_page_load_timeout_secs() -> u64 {
    30
}

fn default_engine() -> String {
    "chrome".to_string()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            implicit_wait_secs: default_implicit_wait_secs(),
            wait_timeout_secs: default_wait_timeout_secs(),
            settle_millis: default_settle_millis(),
            page_load_timeout_secs: default_page_load_timeout_secs(),
            engine: default_engine(),
            profile_dir: None,
        }
    }
}

impl BrowserConfig {
    pub fn implicit_wait(&self) -> Duration {
        Duration::from_secs(self.implicit_wait_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub app_password: String,
    #[serde(default = "default_smtp_server")]
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_body")]
    pub body: String,
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_subject() -> String {
    "Flights Bot".to_string()
}

fn default_body() -> String {
    "Today's Results: ".to_string()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sender: String::new(),
            app_password: String::new(),
            server: default_smtp_server(),
            port: default_smtp_port(),
            subject: default_subject(),
            body: default_body(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub console: bool,
    #[serde(default = "default_true")]
    pub file: bool,
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_rotation")]
    pub rotation: LogRotation,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_dir() -> String {
    "log_files".to_string()
}

fn default_rotation() -> LogRotation {
    LogRotation::Never
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: true,
            file: true,
            dir: default_log_dir(),
            rotation: default_rotation(),
        }
    }
}

/// Inclusive trip-length range in days, written `"min,max"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationRange {
    pub min: u32,
    pub max: u32,
}

impl FromStr for DurationRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (min, max) = s
            .split_once(',')
            .ok_or_else(|| Error::Validation(format!("duration '{}' is not 'min,max'", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| Error::Validation(format!("duration '{}': {}", s, e)))
        };
        let range = Self {
            min: parse(min)?,
            max: parse(max)?,
        };
        if range.min > range.max {
            return Err(Error::Validation(format!(
                "duration '{}': min is greater than max",
                s
            )));
        }
        Ok(range)
    }
}

impl fmt::Display for DurationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.min, self.max)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

impl Config {
    /// Load and fully validate a config document.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json_str(&content)?;
        if let Ok(password) = std::env::var(SMTP_PASSWORD_ENV) {
            if !password.is_empty() {
                config.email.app_password = password;
            }
        }
        Ok(config)
    }

    pub fn load_default(paths: &Paths) -> Result<Self> {
        Self::load(&paths.config_file())
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("invalid config document: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let site = url::Url::parse(&self.site)
            .map_err(|e| Error::Config(format!("site: '{}' is not a URL: {}", self.site, e)))?;
        if site.scheme() != "http" && site.scheme() != "https" {
            return Err(Error::Config(format!(
                "site: unsupported scheme '{}'",
                site.scheme()
            )));
        }

        require_non_empty("explore.location.from", &self.explore.location.from)?;
        require_non_empty("explore.location.to", &self.explore.location.to)?;
        require_non_empty("explore.filters.stops", &self.explore.filters.stops)?;

        self.explore
            .dates
            .range
            .duration
            .parse::<DurationRange>()
            .map_err(|e| Error::Config(format!("explore.dates.range.duration: {}", e)))?;

        let month = self.explore.dates.range.month;
        if !(1..=12).contains(&month) {
            return Err(Error::Config(format!(
                "explore.dates.range.month: {} is not a month",
                month
            )));
        }

        for (name, value) in self.locators.xpaths() {
            require_non_empty(&format!("xPaths.{}", name), value)?;
        }
        for (name, value) in self.locators.class_names() {
            let key = format!("xPaths.{}", name);
            require_non_empty(&key, value)?;
            if let Some(bad) = value
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == ' '))
            {
                return Err(Error::Config(format!(
                    "{}: '{}' contains '{}', expected class names only",
                    key, value, bad
                )));
            }
        }

        if self.browser.engine != "chrome" && self.browser.engine != "edge" {
            return Err(Error::Config(format!(
                "browser.engine: '{}' is not supported (chrome, edge)",
                self.browser.engine
            )));
        }

        Ok(())
    }

    /// `site` without a trailing slash, ready for path concatenation.
    pub fn site_base(&self) -> &str {
        self.site.trim_end_matches('/')
    }

    pub fn default_duration(&self) -> DurationRange {
        // validated at load time
        self.explore
            .dates
            .range
            .duration
            .parse()
            .unwrap_or(DurationRange { min: 1, max: 1 })
    }
}

fn require_non_empty(key: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{}: must not be empty", key)));
    }
    Ok(())
}
