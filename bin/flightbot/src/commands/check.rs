use anyhow::Context;
use flightbot_core::{Config, Paths};
use std::path::PathBuf;

/// Load and validate a config file, then summarize what a run would use.
pub fn run(config: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let path = config.unwrap_or_else(|| paths.config_file());
    let config = Config::load(&path)
        .with_context(|| format!("Invalid config {}", path.display()))?;

    let location = &config.explore.location;
    let range = &config.explore.dates.range;
    let luggage = &config.flight.luggage;

    println!("✅ {} is valid", path.display());
    println!();
    println!("  Site:      {}", config.site_base());
    println!("  Route:     {} -> {}", location.from, location.to);
    println!("  Dates:     month {}, trips of {} days", range.month, range.duration);
    println!("  Stops:     {}", config.explore.filters.stops);
    println!(
        "  Luggage:   {} carry-on, {} checked",
        luggage.carry_on_bag, luggage.checked_bag
    );
    println!(
        "  Browser:   {} ({})",
        config.browser.engine,
        if config.headless { "headless" } else { "windowed" }
    );
    println!(
        "  Locators:  {} xPaths, {} class names",
        config.locators.xpaths().len(),
        config.locators.class_names().len()
    );
    if config.email.sender.is_empty() {
        println!("  Email:     (no sender configured)");
    } else {
        println!("  Email:     {} via {}:{}", config.email.sender, config.email.server, config.email.port);
    }
    println!("  Logs:      {}", paths.log_dir(&config.logging.dir).display());

    Ok(())
}
