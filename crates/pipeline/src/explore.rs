//! Explore page URL construction and loading.

use chrono::{Datelike, NaiveDate};
use flightbot_core::config::{Config, DurationRange};
use flightbot_core::{Error, Result, Route};
use flightbot_tools::Browser;
use tracing::info;

const COMPACT_DATE: &str = "%Y%m%d";

/// Which dates the explore page should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSelection {
    /// Fixed departure and return days.
    Exact { depart: NaiveDate, ret: NaiveDate },
    /// A whole calendar month with a trip-length range. Unset fields fall
    /// back to `explore.dates.range` and the current year.
    Range {
        duration: Option<DurationRange>,
        year: Option<i32>,
        month: Option<u32>,
    },
}

impl DateSelection {
    pub fn from_config() -> Self {
        Self::Range {
            duration: None,
            year: None,
            month: None,
        }
    }
}

/// Parse a `YYYYMMDD` date.
pub fn parse_compact_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), COMPACT_DATE)
        .map_err(|e| Error::Validation(format!("date '{}' is not YYYYMMDD: {}", s, e)))
}

/// First and last calendar day of `month`.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::Validation(format!("{}-{} is not a valid month", year, month)))?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let last = next_first
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| Error::Validation(format!("{}-{} has no last day", year, month)))?;
    Ok((first, last))
}

pub fn build_explore_url(
    config: &Config,
    route: &Route,
    dates: &DateSelection,
    today: NaiveDate,
) -> Result<String> {
    let site = config.site_base();
    match dates {
        DateSelection::Exact { depart, ret } => {
            if ret < depart {
                return Err(Error::Validation(format!(
                    "return date {} is before departure {}",
                    ret, depart
                )));
            }
            Ok(format!(
                "{}/explore/{}-anywhere/{},{}",
                site,
                route.from,
                depart.format(COMPACT_DATE),
                ret.format(COMPACT_DATE)
            ))
        }
        DateSelection::Range {
            duration,
            year,
            month,
        } => {
            let duration = duration.unwrap_or_else(|| config.default_duration());
            let month = month.unwrap_or(config.explore.dates.range.month);
            let year = year.unwrap_or_else(|| today.year());
            let (first, last) = month_bounds(year, month)?;
            Ok(format!(
                "{}/explore/{}-anywhere/{},{}?stops={}&tripdurationrange={}",
                site,
                route.from,
                first.format(COMPACT_DATE),
                last.format(COMPACT_DATE),
                config.explore.filters.stops,
                duration
            ))
        }
    }
}

pub struct ExplorationStage<'a> {
    config: &'a Config,
}

impl<'a> ExplorationStage<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Build the explore URL and navigate to it. Navigation errors are fatal.
    pub async fn load(
        &self,
        browser: &mut dyn Browser,
        route: &Route,
        dates: &DateSelection,
    ) -> Result<String> {
        let today = chrono::Local::now().date_naive();
        let url = build_explore_url(self.config, route, dates, today)?;
        info!(url = %url, "loading explore page");
        browser.navigate(&url).await?;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_config, FakeBrowser};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_exact_url() {
        let cfg = sample_config();
        let dates = DateSelection::Exact {
            depart: parse_compact_date("20240901").unwrap(),
            ret: parse_compact_date("20240910").unwrap(),
        };
        let url = build_explore_url(&cfg, &Route::new("TLV", "anywhere"), &dates, today()).unwrap();
        assert_eq!(url, "https://www.kayak.com/explore/TLV-anywhere/20240901,20240910");
    }

    #[test]
    fn test_exact_rejects_reversed_dates() {
        let cfg = sample_config();
        let dates = DateSelection::Exact {
            depart: parse_compact_date("20240910").unwrap(),
            ret: parse_compact_date("20240901").unwrap(),
        };
        assert!(build_explore_url(&cfg, &Route::new("TLV", "anywhere"), &dates, today()).is_err());
    }

    #[test]
    fn test_range_url_from_config_defaults() {
        let cfg = sample_config();
        let url = build_explore_url(
            &cfg,
            &Route::new("TLV", "anywhere"),
            &DateSelection::from_config(),
            today(),
        )
        .unwrap();
        assert_eq!(
            url,
            "https://www.kayak.com/explore/TLV-anywhere/20240901,20240930?stops=0&tripdurationrange=5,10"
        );
    }

    #[test]
    fn test_range_url_with_overrides() {
        let cfg = sample_config();
        let dates = DateSelection::Range {
            duration: Some("3,4".parse().unwrap()),
            year: Some(2024),
            month: Some(2),
        };
        let url = build_explore_url(&cfg, &Route::new("ATH", "ROM"), &dates, today()).unwrap();
        assert_eq!(
            url,
            "https://www.kayak.com/explore/ATH-anywhere/20240201,20240229?stops=0&tripdurationrange=3,4"
        );
    }

    #[test]
    fn test_month_bounds() {
        let (first, last) = month_bounds(2023, 12).unwrap();
        assert_eq!(first.to_string(), "2023-12-01");
        assert_eq!(last.to_string(), "2023-12-31");
        let (_, last) = month_bounds(2023, 2).unwrap();
        assert_eq!(last.to_string(), "2023-02-28");
        assert!(month_bounds(2023, 13).is_err());
    }

    #[test]
    fn test_parse_compact_date() {
        assert_eq!(parse_compact_date("20241231").unwrap().to_string(), "2024-12-31");
        assert!(parse_compact_date("2024-12-31").is_err());
        assert!(parse_compact_date("20241332").is_err());
    }

    #[tokio::test]
    async fn test_load_navigates() {
        let cfg = sample_config();
        let mut browser = FakeBrowser::new();
        let url = ExplorationStage::new(&cfg)
            .load(&mut browser, &Route::new("TLV", "anywhere"), &DateSelection::from_config())
            .await
            .unwrap();
        assert_eq!(browser.visited(), vec![url]);
    }
}
