use serde::{Deserialize, Serialize};

/// Origin and destination codes for one run, either typed by the user or
/// taken from `explore.location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub from: String,
    pub to: String,
}

impl Route {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A destination found on the explore page.
///
/// The position of a candidate inside `RunState::general_results` is the only
/// link back to its entry on the explore page, so that sequence is never
/// re-sorted or filtered once extraction finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub city: String,
    pub date_range: String,
    pub starting_price: String,
}

/// A concrete offer accepted from a detail tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedFlight {
    pub city: String,
    pub date_range: String,
    pub price: String,
    /// False when the carry-on indicator could not confirm the bag is included.
    pub is_final_price: bool,
    pub carrier: String,
    pub depart_time: String,
    pub return_time: String,
    pub deal_link: String,
}

/// In-memory record of one run. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub error_count: u32,
    pub general_results: Vec<Candidate>,
    pub top_results: Vec<DetailedFlight>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_extraction_failure(&mut self) {
        self.error_count += 1;
    }

    pub fn candidate(&self, index: usize) -> Option<&Candidate> {
        self.general_results.get(index)
    }
}
