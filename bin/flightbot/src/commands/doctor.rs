use flightbot_core::config::SMTP_PASSWORD_ENV;
use flightbot_core::{Config, Paths};
use flightbot_tools::browser::{find_browser_binary, list_available_browsers, BrowserEngine};
use std::path::{Path, PathBuf};

#[derive(Default)]
struct Tally {
    ok: u32,
    warn: u32,
    err: u32,
}

impl Tally {
    fn ok(&mut self, label: &str, detail: &str) {
        self.ok += 1;
        print_line("✅", label, detail);
    }

    fn warn(&mut self, label: &str, hint: &str) {
        self.warn += 1;
        print_line("⚠️ ", label, hint);
    }

    fn err(&mut self, label: &str, hint: &str) {
        self.err += 1;
        print_line("❌", label, hint);
    }
}

fn print_line(mark: &str, label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  {} {}", mark, label);
    } else {
        println!("  {} {}: {}", mark, label, detail);
    }
}

/// Check the config, browser, mail credentials and log directory.
pub fn run(config: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let path = config.unwrap_or_else(|| paths.config_file());
    let mut tally = Tally::default();

    println!();
    println!("🩺 flightbot doctor");
    println!("================================");
    println!();

    println!("📋 Configuration");
    let config = if path.exists() {
        tally.ok("Config file exists", &path.display().to_string());
        match Config::load(&path) {
            Ok(config) => {
                tally.ok("Config is valid", config.site_base());
                Some(config)
            }
            Err(e) => {
                tally.err("Config is invalid", &e.to_string());
                None
            }
        }
    } else {
        tally.err("Config file not found", "Pass --config or create ~/.flightbot/config.json");
        None
    };
    println!();

    println!("🖥️  Browser");
    let available = list_available_browsers();
    if available.is_empty() {
        tally.err("No Chrome or Edge binary found", "Install Chrome to run the bot");
    }
    for (engine, binary) in &available {
        println!("  • {:<8} {}", engine.name(), binary);
    }
    if let Some(config) = &config {
        match BrowserEngine::parse(&config.browser.engine) {
            Some(engine) => match find_browser_binary(engine) {
                Some(binary) => tally.ok(&format!("Configured engine '{}'", engine.name()), &binary),
                None => tally.err(
                    &format!("Configured engine '{}' not installed", engine.name()),
                    "Change browser.engine or install it",
                ),
            },
            None => tally.err(
                &format!("Unknown engine '{}'", config.browser.engine),
                "Use chrome or edge",
            ),
        }
        if config.headless {
            println!("  Mode: headless");
        } else {
            println!("  Mode: windowed");
        }
    }
    println!();

    if let Some(config) = &config {
        println!("📧 Email");
        if config.email.sender.trim().is_empty() {
            tally.err("No sender configured", "Set email.sender");
        } else {
            tally.ok("Sender", &config.email.sender);
        }
        if std::env::var(SMTP_PASSWORD_ENV).is_ok() {
            tally.ok("SMTP password", &format!("from {}", SMTP_PASSWORD_ENV));
        } else if !config.email.app_password.is_empty() {
            tally.ok("SMTP password", "from config");
        } else {
            tally.err(
                "No SMTP password",
                &format!("Set email.appPassword or {}", SMTP_PASSWORD_ENV),
            );
        }
        println!("  Relay: {}:{}", config.email.server, config.email.port);
        println!();

        println!("📝 Logging");
        if config.logging.file {
            let dir = paths.log_dir(&config.logging.dir);
            match check_writable(&dir) {
                Ok(()) => tally.ok("Log directory writable", &dir.display().to_string()),
                Err(e) => tally.err("Log directory not writable", &e.to_string()),
            }
        } else {
            tally.warn("File logging disabled", "Runs leave no log file behind");
        }
        println!();
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  ✅ {} passed  ⚠️  {} warnings  ❌ {} errors",
        tally.ok, tally.warn, tally.err
    );
    println!();
    if tally.err > 0 {
        println!("  {} error(s) must be fixed before a run.", tally.err);
    } else if tally.warn > 0 {
        println!("  Ready to run. Some optional features are off.");
    } else {
        println!("  🎉 All good!");
    }
    println!();

    Ok(())
}

fn check_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".doctor_test");
    std::fs::write(&probe, "test")?;
    std::fs::remove_file(&probe)
}
