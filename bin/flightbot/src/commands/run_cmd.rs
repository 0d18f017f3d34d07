use crate::logging;
use crate::prompt::Prompter;
use anyhow::Context;
use clap::Args;
use flightbot_core::config::DurationRange;
use flightbot_core::{Config, Paths, Route, RunState};
use flightbot_pipeline::{
    general_table, parse_compact_date, top_deals_table, DateSelection, ExploreMode, FlightPipeline,
    Luggage, ResultsTable, RunOptions,
};
use flightbot_tools::{
    ChromeSession, LaunchOptions, LinkShortener, NoopShortener, SmtpReportTransport,
    TinyUrlShortener,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, Instrument};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Config file (defaults to ~/.flightbot/config.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use the configured route and dates without asking
    #[arg(long)]
    pub default: bool,

    /// Origin code
    #[arg(long)]
    pub from: Option<String>,

    /// Destination code
    #[arg(long)]
    pub to: Option<String>,

    /// Carry-on bags to add
    #[arg(long = "carry-on")]
    pub carry_on: Option<u32>,

    /// Checked bags to add
    #[arg(long)]
    pub checked: Option<u32>,

    /// Departure date (YYYYMMDD)
    #[arg(long, requires = "return_date")]
    pub depart: Option<String>,

    /// Return date (YYYYMMDD)
    #[arg(long = "return", requires = "depart")]
    pub return_date: Option<String>,

    /// Trip length range in days, e.g. 5,10
    #[arg(long, conflicts_with = "depart")]
    pub duration: Option<String>,

    #[arg(long, conflicts_with = "depart")]
    pub year: Option<i32>,

    /// Month number, 1-12
    #[arg(long, conflicts_with = "depart")]
    pub month: Option<u32>,

    /// Address that receives the report
    #[arg(long)]
    pub email: Option<String>,

    /// Keep full deal links
    #[arg(long)]
    pub no_shorten: bool,
}

/// Explore, gather top deals and mail the report.
pub async fn run(args: RunArgs, verbose: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_path = args.config.clone().unwrap_or_else(|| paths.config_file());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    let log_dir = paths.log_dir(&config.logging.dir);
    let _guard = logging::init_run(&config.logging, &log_dir, verbose)?;

    let run_id = uuid::Uuid::new_v4();
    println!("{}\n", run_id);
    info!(config = %config_path.display(), "Logger initiated");

    let span = tracing::info_span!("run", id = %run_id);
    execute(&args, &config, &paths).instrument(span).await
}

async fn execute(args: &RunArgs, config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let (options, receiver) = {
        let mut prompter = Prompter::stdio();
        let options = resolve_options(args, config, &mut prompter)?;
        let receiver = match &args.email {
            Some(addr) => addr.clone(),
            None => prompter.ask("\nEmail (to receive results): ")?,
        };
        (options, receiver)
    };

    let transport = SmtpReportTransport::new(&config.email, &receiver)?;
    let shortener: Box<dyn LinkShortener> = if args.no_shorten {
        Box::new(NoopShortener)
    } else {
        Box::new(TinyUrlShortener::new()?)
    };

    info!(from = %options.route.from, to = %options.route.to, mode = ?options.mode, "creating a bot instance");
    println!("\nloading driver...");
    let mut browser = ChromeSession::launch(LaunchOptions::from_config(config, paths)).await?;

    let pipeline = FlightPipeline::new(config, shortener.as_ref(), &transport);
    let mut state = RunState::new();
    let outcome = match pipeline.gather(&mut browser, &options, &mut state).await {
        Ok(gathered) => {
            print_tables(&state, &options.route);
            pipeline
                .report(&state, &options.route)
                .await
                .map(|report| (gathered, report))
        }
        Err(e) => Err(e),
    };
    browser.quit().await;

    match outcome {
        Ok((gathered, report)) => {
            info!(
                candidates = gathered.candidates,
                offers = state.top_results.len(),
                errors = state.error_count,
                delivered = report.delivered,
                "Bot process finished."
            );
            println!("Exiting ...");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "unsuccessful run");
            Err(e.into())
        }
    }
}

fn print_tables(state: &RunState, route: &Route) {
    let print = |table: flightbot_core::Result<ResultsTable>| {
        if let Ok(table) = table {
            println!("\n{}\n", table.render_with_title());
        }
    };
    print(general_table(state));
    println!("\n{}\n", "*".repeat(100));
    print(top_deals_table(state, route));
}

/// Fill in whatever the flags left open, asking in the usual order:
/// route, luggage, then dates.
pub fn resolve_options<R: BufRead, W: Write>(
    args: &RunArgs,
    config: &Config,
    prompter: &mut Prompter<R, W>,
) -> anyhow::Result<RunOptions> {
    let use_default = if args.default {
        true
    } else if args.from.is_some() || args.to.is_some() {
        false
    } else {
        prompter.confirm("Use default configuration ? (y/n): ")?
    };

    if use_default {
        let mut options = RunOptions::from_config(config);
        options.luggage = Luggage::resolve(args.carry_on, args.checked, config);
        if let Some(dates) = dates_from_flags(args)? {
            options.dates = dates;
        }
        return Ok(options);
    }

    let from = match &args.from {
        Some(v) => v.clone(),
        None => prompter.ask("From (format=city): ")?,
    };
    let to = match &args.to {
        Some(v) => v.clone(),
        None => prompter.ask("To (format=city): ")?,
    };
    let carry_on = match args.carry_on {
        Some(n) => n,
        None => prompter.ask_parsed("Carry-on bag (0/1): ")?,
    };
    let checked = match args.checked {
        Some(n) => n,
        None => prompter.ask_parsed("Checked bag: ")?,
    };

    let dates = match dates_from_flags(args)? {
        Some(dates) => dates,
        None if prompter.confirm("Exact dates? (y/n): ")? => DateSelection::Exact {
            depart: ask_date(prompter, "Departure date (format=yyyymmdd): ")?,
            ret: ask_date(prompter, "Return date (format=yyyymmdd): ")?,
        },
        None => DateSelection::Range {
            duration: Some(prompter.ask_parsed::<DurationRange>("Duration (format=d,d(ex. 5,10)): ")?),
            year: Some(ask_year(prompter)?),
            month: Some(ask_month(prompter)?),
        },
    };

    Ok(RunOptions {
        route: Route::new(from, to),
        dates,
        mode: ExploreMode::UserSpecified,
        luggage: Luggage {
            carry_on,
            checked,
        },
    })
}

fn dates_from_flags(args: &RunArgs) -> anyhow::Result<Option<DateSelection>> {
    if let (Some(depart), Some(ret)) = (&args.depart, &args.return_date) {
        return Ok(Some(DateSelection::Exact {
            depart: parse_compact_date(depart)?,
            ret: parse_compact_date(ret)?,
        }));
    }
    if args.duration.is_none() && args.year.is_none() && args.month.is_none() {
        return Ok(None);
    }
    let year = args.year.map(checked_year).transpose()?;
    let month = args.month.map(checked_month).transpose()?;
    let duration = args
        .duration
        .as_deref()
        .map(str::parse::<DurationRange>)
        .transpose()?;
    Ok(Some(DateSelection::Range {
        duration,
        year,
        month,
    }))
}

fn checked_month(month: u32) -> anyhow::Result<u32> {
    if !(1..=12).contains(&month) {
        anyhow::bail!("{} is not a month", month);
    }
    Ok(month)
}

fn checked_year(year: i32) -> anyhow::Result<i32> {
    if !(1000..=9999).contains(&year) {
        anyhow::bail!("{} is not a four-digit year", year);
    }
    Ok(year)
}

fn ask_date<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    question: &str,
) -> anyhow::Result<chrono::NaiveDate> {
    loop {
        let answer = prompter.ask(question)?;
        match parse_compact_date(&answer) {
            Ok(date) => return Ok(date),
            Err(e) => prompter.say(&e.to_string())?,
        }
    }
}

fn ask_year<R: BufRead, W: Write>(prompter: &mut Prompter<R, W>) -> anyhow::Result<i32> {
    loop {
        let year: i32 = prompter.ask_parsed("Year (format=yyyy): ")?;
        match checked_year(year) {
            Ok(year) => return Ok(year),
            Err(e) => prompter.say(&e.to_string())?,
        }
    }
}

fn ask_month<R: BufRead, W: Write>(prompter: &mut Prompter<R, W>) -> anyhow::Result<u32> {
    loop {
        let month: u32 = prompter.ask_parsed("Month (format=m(ex. 9 for sept.)): ")?;
        match checked_month(month) {
            Ok(month) => return Ok(month),
            Err(e) => prompter.say(&e.to_string())?,
        }
    }
}
