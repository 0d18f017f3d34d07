use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".flightbot"))
            .unwrap_or_else(|| PathBuf::from(".flightbot"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    /// Browser profiles live here unless `browser.profileDir` says otherwise.
    pub fn sessions_dir(&self) -> PathBuf {
        self.base.join("sessions")
    }

    /// Resolve the log directory; relative paths hang off the base dir.
    pub fn log_dir(&self, configured: &str) -> PathBuf {
        let dir = PathBuf::from(configured);
        if dir.is_absolute() {
            dir
        } else {
            self.base.join(dir)
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
