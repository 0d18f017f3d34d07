//! Turns raw flight-box markup into accepted offers.

use crate::markup::{class_selector, next_sibling_text, parse_fragment, text_of};
use flightbot_core::config::{Config, Locators};
use flightbot_core::{Candidate, DetailedFlight, Error, Result};
use flightbot_tools::LinkShortener;
use scraper::{ElementRef, Selector};
use tracing::{debug, warn};

/// Carry-on indicator text shown when the site cannot tell whether the bag
/// is included in the price.
pub const CARRY_ON_UNKNOWN: &str = "?";

/// Fields pulled out of one flight box, before any rule is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightBox {
    pub depart_time: String,
    pub return_time: String,
    pub outbound_carrier: String,
    pub return_carrier: String,
    pub price: String,
    pub carry_on_indicator: String,
    pub href: String,
}

impl FlightBox {
    /// Parse the `outerHTML` of a flight box. Missing structure is an
    /// extraction failure.
    pub fn parse(markup: &str, locators: &Locators) -> Result<Self> {
        let doc = parse_fragment(markup);

        let times_sel = class_selector("div", &locators.f_times_class)?;
        let times: Vec<_> = doc.select(&times_sel).take(2).collect();
        let (outbound, inbound) = match times.as_slice() {
            [outbound, inbound] => (*outbound, *inbound),
            _ => {
                return Err(Error::Extraction(format!(
                    "expected two div.{} blocks, found {}",
                    locators.f_times_class,
                    times.len()
                )))
            }
        };

        let price_sel = class_selector("div", &locators.f_price_class)?;
        let price = doc
            .select(&price_sel)
            .next()
            .map(text_of)
            .ok_or_else(|| Error::Extraction(format!("no div.{}", locators.f_price_class)))?;

        // the second indicator belongs to the carry-on bag
        let bag_sel = class_selector("div", &locators.f_carry_bag_class)?;
        let carry_on_indicator = doc
            .select(&bag_sel)
            .nth(1)
            .map(text_of)
            .ok_or_else(|| {
                Error::Extraction(format!("no carry-on div.{}", locators.f_carry_bag_class))
            })?;

        let link_sel = Selector::parse("a[href]")
            .map_err(|e| Error::Extraction(format!("link selector: {:?}", e)))?;
        let href = doc
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
            .ok_or_else(|| Error::Extraction("no deal link".into()))?;

        let outbound_carrier = carrier_after(outbound, "outbound")?;
        let return_carrier = carrier_after(inbound, "return")?;

        Ok(Self {
            depart_time: text_of(outbound),
            return_time: text_of(inbound),
            outbound_carrier,
            return_carrier,
            price,
            carry_on_indicator,
            href,
        })
    }

    pub fn carriers_match(&self) -> bool {
        self.outbound_carrier == self.return_carrier
    }

    /// False only when the carry-on indicator shows [`CARRY_ON_UNKNOWN`].
    ///
    /// The site sometimes renders `0` where it means unknown; those still
    /// count as final until the two can be told apart.
    pub fn is_final_price(&self) -> bool {
        self.carry_on_indicator != CARRY_ON_UNKNOWN
    }
}

/// The carrier is rendered right after the leg's time block.
fn carrier_after(time: ElementRef<'_>, leg: &str) -> Result<String> {
    next_sibling_text(time).ok_or_else(|| Error::Extraction(format!("no {} carrier", leg)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Accepted(DetailedFlight),
    /// Outbound and return legs fly different carriers. Dropped, not an error.
    CarrierMismatch { outbound: String, inbound: String },
}

pub struct CorrelationEngine<'a> {
    site_base: &'a str,
    shortener: &'a dyn LinkShortener,
}

impl<'a> CorrelationEngine<'a> {
    pub fn new(config: &'a Config, shortener: &'a dyn LinkShortener) -> Self {
        Self {
            site_base: config.site_base(),
            shortener,
        }
    }

    pub fn absolute_link(&self, href: &str) -> String {
        if href.starts_with('/') {
            format!("{}{}", self.site_base, href)
        } else {
            format!("{}/{}", self.site_base, href)
        }
    }

    /// Short form of the deal link, or the absolute link when shortening fails.
    pub async fn deal_link(&self, href: &str) -> String {
        let link = self.absolute_link(href);
        match self.shortener.shorten(&link).await {
            Ok(short) => short,
            Err(e) => {
                warn!(link = %link, error = %e, "unsuccessful link shortening");
                link
            }
        }
    }

    /// Apply the carrier-match and price-finality rules to one box found
    /// for `candidate`.
    pub async fn correlate(&self, flight: FlightBox, candidate: &Candidate) -> Correlation {
        if !flight.carriers_match() {
            debug!(
                city = %candidate.city,
                outbound = %flight.outbound_carrier,
                inbound = %flight.return_carrier,
                "carrier mismatch, skipping offer"
            );
            return Correlation::CarrierMismatch {
                outbound: flight.outbound_carrier,
                inbound: flight.return_carrier,
            };
        }

        let is_final_price = flight.is_final_price();
        let deal_link = self.deal_link(&flight.href).await;
        Correlation::Accepted(DetailedFlight {
            city: candidate.city.clone(),
            date_range: candidate.date_range.clone(),
            price: flight.price,
            is_final_price,
            carrier: flight.outbound_carrier,
            depart_time: flight.depart_time,
            return_time: flight.return_time,
            deal_link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flight_box, sample_config, FailingShortener, RecordingShortener};
    use flightbot_tools::NoopShortener;

    fn candidate() -> Candidate {
        Candidate {
            city: "Athens".into(),
            date_range: "Sep 3 - 9".into(),
            starting_price: "$120".into(),
        }
    }

    fn parsed(markup: &str) -> FlightBox {
        FlightBox::parse(markup, &sample_config().locators).unwrap()
    }

    #[test]
    fn test_parse_flight_box() {
        let b = parsed(&flight_box("$143", "Aegean", "Aegean", "1", "/book/abc"));
        assert_eq!(b.depart_time, "08:00 - 10:30");
        assert_eq!(b.return_time, "19:15 - 21:40");
        assert_eq!(b.outbound_carrier, "Aegean");
        assert_eq!(b.return_carrier, "Aegean");
        assert_eq!(b.price, "$143");
        assert_eq!(b.carry_on_indicator, "1");
        assert_eq!(b.href, "/book/abc");
    }

    #[test]
    fn test_parse_rejects_single_time_block() {
        let markup = r#"<div><div class="depart-time base-time">08:00</div>El Al<div class="price-text">$1</div></div>"#;
        let err = FlightBox::parse(markup, &sample_config().locators).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_parse_rejects_missing_carriers() {
        let markup = flight_box("$10", "", "", "1", "/x");
        let err = FlightBox::parse(&markup, &sample_config().locators).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));

        let one_sided = flight_box("$10", "Aegean", "  ", "1", "/x");
        let err = FlightBox::parse(&one_sided, &sample_config().locators).unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_indented_carriers_still_compared() {
        let markup = concat!(
            "<div class=\"resultWrapper\">\n",
            "<div class=\"leg\"><div class=\"depart-time base-time\">08:00</div>\n  <span>Aegean</span>\n</div>\n",
            "<div class=\"leg\"><div class=\"depart-time base-time\">20:00</div>\n  <span>Wizz</span>\n</div>\n",
            "<div class=\"bag-count\">0</div><div class=\"bag-count\">1</div>\n",
            "<div class=\"price-text\">$10</div>\n",
            "<a href=\"/book/9\">View Deal</a>\n",
            "</div>"
        );
        let cfg = sample_config();
        let engine = CorrelationEngine::new(&cfg, &NoopShortener);
        let outcome = engine.correlate(parsed(markup), &candidate()).await;
        assert_eq!(
            outcome,
            Correlation::CarrierMismatch {
                outbound: "Aegean".into(),
                inbound: "Wizz".into()
            }
        );
    }

    #[test]
    fn test_price_finality_sentinel() {
        assert!(!parsed(&flight_box("$1", "A", "A", "?", "/x")).is_final_price());
        assert!(parsed(&flight_box("$1", "A", "A", "1", "/x")).is_final_price());
        assert!(parsed(&flight_box("$1", "A", "A", "0", "/x")).is_final_price());
        assert!(parsed(&flight_box("$1", "A", "A", "", "/x")).is_final_price());
    }

    #[tokio::test]
    async fn test_carrier_mismatch_dropped() {
        let cfg = sample_config();
        let engine = CorrelationEngine::new(&cfg, &NoopShortener);
        let outcome = engine
            .correlate(parsed(&flight_box("$1", "A", "B", "1", "/x")), &candidate())
            .await;
        assert_eq!(
            outcome,
            Correlation::CarrierMismatch {
                outbound: "A".into(),
                inbound: "B".into()
            }
        );
    }

    #[tokio::test]
    async fn test_carrier_match_accepted() {
        let cfg = sample_config();
        let shortener = RecordingShortener::default();
        let engine = CorrelationEngine::new(&cfg, &shortener);
        let outcome = engine
            .correlate(parsed(&flight_box("$143", "A", "A", "?", "/book/1")), &candidate())
            .await;
        let Correlation::Accepted(flight) = outcome else {
            panic!("expected accepted offer");
        };
        assert_eq!(flight.city, "Athens");
        assert_eq!(flight.date_range, "Sep 3 - 9");
        assert_eq!(flight.carrier, "A");
        assert!(!flight.is_final_price);
        assert_eq!(flight.deal_link, "https://tiny.test/1");
        assert_eq!(
            shortener.seen.lock().unwrap().as_slice(),
            ["https://www.kayak.com/book/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_mismatch_never_shortens() {
        let cfg = sample_config();
        let shortener = RecordingShortener::default();
        let engine = CorrelationEngine::new(&cfg, &shortener);
        engine
            .correlate(parsed(&flight_box("$1", "A", "B", "1", "/x")), &candidate())
            .await;
        assert!(shortener.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_falls_back_when_shortener_fails() {
        let cfg = sample_config();
        let engine = CorrelationEngine::new(&cfg, &FailingShortener);
        assert_eq!(
            engine.deal_link("/flights/TLV-ATH?sort=price_a").await,
            "https://www.kayak.com/flights/TLV-ATH?sort=price_a"
        );
        assert_eq!(engine.absolute_link("book/2"), "https://www.kayak.com/book/2");
    }
}
