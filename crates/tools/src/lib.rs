pub mod browser;
pub mod email;
pub mod shortener;

pub use browser::{Browser, ChromeSession, ElementRef, LaunchOptions, TabHandle};
pub use email::{ReportEmail, ReportTransport, SmtpReportTransport};
pub use shortener::{LinkShortener, NoopShortener, TinyUrlShortener};
