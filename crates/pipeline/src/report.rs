//! Result tables and delivery of the top-deals report.

use flightbot_core::{Error, Result, Route, RunState};
use flightbot_tools::{ReportEmail, ReportTransport};
use tracing::{debug, error, info};

const CURRENCY_SYMBOLS: [char; 5] = ['$', '€', '£', '₪', '¥'];

/// Numeric sort key of a displayed price: the digits after the last
/// currency symbol (`"from $1,250"` -> 1250).
pub fn parse_price(text: &str) -> Result<u64> {
    let tail = match text.rfind(|c| CURRENCY_SYMBOLS.contains(&c)) {
        Some(pos) => &text[pos..],
        None => text,
    };
    let digits: String = tail.chars().filter(char::is_ascii_digit).collect();
    digits
        .parse()
        .map_err(|_| Error::Report(format!("price '{}' has no digits", text)))
}

/// A titled table rendered as plain ASCII.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultsTable {
    pub fn new(title: &str, headers: Vec<String>) -> Self {
        Self {
            title: title.to_string(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.headers.len() {
            return Err(Error::Report(format!(
                "{}: row has {} cells, expected {}",
                self.title,
                row.len(),
                self.headers.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Stable ascending sort on the parsed price in `column`.
    pub fn sort_by_price(&mut self, column: &str) -> Result<()> {
        let idx = self
            .headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| Error::Report(format!("{}: no column '{}'", self.title, column)))?;
        let mut keyed = self
            .rows
            .drain(..)
            .map(|row| parse_price(&row[idx]).map(|key| (key, row)))
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by_key(|(key, _)| *key);
        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(())
    }

    /// The table body without the title line.
    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let border = {
            let mut s = String::from("+");
            for w in &widths {
                s.push_str(&"-".repeat(w + 2));
                s.push('+');
            }
            s
        };
        let line = |cells: &[String]| {
            let mut s = String::from("|");
            for (cell, w) in cells.iter().zip(&widths) {
                s.push_str(&format!(" {:^width$} |", cell, width = w));
            }
            s
        };

        let mut out = vec![border.clone(), line(self.headers.as_slice()), border.clone()];
        out.extend(self.rows.iter().map(|r| line(r.as_slice())));
        out.push(border);
        out.join("\n")
    }

    /// `"<title> (<rows>):"` followed by the table.
    pub fn render_with_title(&self) -> String {
        format!("{} ({}):\n\n{}", self.title, self.len(), self.render())
    }
}

pub const GENERAL_TITLE: &str = "Top Locations - General Results";
pub const TOP_TITLE: &str = "Top Flights";

pub fn general_table(state: &RunState) -> Result<ResultsTable> {
    let headers = ["City", "Dates", "Starting Price"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    let mut table = ResultsTable::new(GENERAL_TITLE, headers);
    for c in &state.general_results {
        table.push_row(vec![
            c.city.clone(),
            c.date_range.clone(),
            c.starting_price.clone(),
        ])?;
    }
    table.sort_by_price("Starting Price")?;
    Ok(table)
}

pub fn top_deals_table(state: &RunState, route: &Route) -> Result<ResultsTable> {
    let headers = vec![
        "City".to_string(),
        "Dates".to_string(),
        "Price".to_string(),
        "Is Final Price ?".to_string(),
        "Company".to_string(),
        format!("Times: {}-{}", route.from, route.to),
        format!("Times: {}-{}", route.to, route.from),
        "Link to Deal".to_string(),
    ];
    let mut table = ResultsTable::new(TOP_TITLE, headers);
    for f in &state.top_results {
        table.push_row(vec![
            f.city.clone(),
            f.date_range.clone(),
            f.price.clone(),
            if f.is_final_price { "True" } else { "False" }.to_string(),
            f.carrier.clone(),
            f.depart_time.clone(),
            f.return_time.clone(),
            f.deal_link.clone(),
        ])?;
    }
    table.sort_by_price("Price")?;
    Ok(table)
}

/// What the reporter produced. A table is `None` when it could not be built.
#[derive(Debug, Default)]
pub struct Report {
    pub general: Option<ResultsTable>,
    pub top: Option<ResultsTable>,
    pub delivered: bool,
}

pub struct Reporter<'a> {
    transport: &'a dyn ReportTransport,
    subject: String,
    body_prefix: String,
}

impl<'a> Reporter<'a> {
    pub fn new(transport: &'a dyn ReportTransport, subject: &str, body_prefix: &str) -> Self {
        Self {
            transport,
            subject: subject.to_string(),
            body_prefix: body_prefix.to_string(),
        }
    }

    /// Build both tables and mail the top deals.
    ///
    /// Table errors are logged and leave that table out; without a top-deals
    /// table nothing is sent. Transport errors propagate.
    pub async fn publish(&self, state: &RunState, route: &Route) -> Result<Report> {
        let mut report = Report::default();

        match general_table(state) {
            Ok(table) => report.general = Some(table),
            Err(e) => error!(error = %e, "issue with creating generic table"),
        }
        debug!(table = GENERAL_TITLE, errors = state.error_count, "table errors");

        match top_deals_table(state, route) {
            Ok(table) => report.top = Some(table),
            Err(e) => error!(error = %e, "issue with creating top table"),
        }
        debug!(table = TOP_TITLE, errors = state.error_count, "table errors");

        let pending = report.top.as_ref().map(|top| {
            let email = ReportEmail {
                subject: self.subject.clone(),
                body_prefix: self.body_prefix.clone(),
                report: top.render(),
            };
            (top.len(), email)
        });
        let Some((rows, email)) = pending else {
            return Ok(report);
        };

        info!(rows, "sending results via email");
        self.transport.deliver(&email).await?;
        report.delivered = true;
        Ok(report)
    }
}
