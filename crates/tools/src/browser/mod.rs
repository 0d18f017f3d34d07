//! Browser capability consumed by the exploration pipeline.
//!
//! The pipeline only ever talks to [`Browser`]; [`ChromeSession`] is the
//! production implementation, driving Chrome (or Edge) over the DevTools
//! protocol. Locators are XPath expressions.

pub mod cdp;
pub mod session;

use async_trait::async_trait;
use flightbot_core::Result;
use std::fmt;
use std::time::Duration;

pub use session::{
    find_browser_binary, list_available_browsers, BrowserEngine, ChromeSession, LaunchOptions,
};

/// Opaque reference to one open window/tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabHandle(String);

impl TabHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `index`-th (0-based) match of `locator` at the time it was located.
///
/// References are re-resolved on every read, so an element that left the
/// page reads as an error rather than stale data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    locator: String,
    index: usize,
}

impl ElementRef {
    pub fn new(locator: impl Into<String>, index: usize) -> Self {
        Self {
            locator: locator.into(),
            index,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// One browser session with a single active window.
///
/// Every lookup (`find_all`, `click`, ...) polls for up to the session's
/// implicit wait before giving up; `wait_for` takes its own explicit timeout.
#[async_trait]
pub trait Browser: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// All matches in document order. Empty when nothing matched within the
    /// implicit wait.
    async fn find_all(&mut self, locator: &str) -> Result<Vec<ElementRef>>;

    async fn wait_for(&mut self, locator: &str, timeout: Duration) -> Result<()>;

    /// Click the first match.
    async fn click(&mut self, locator: &str) -> Result<()>;

    /// Checked/selected state of the first match (checkbox, toggle, option).
    async fn is_selected(&mut self, locator: &str) -> Result<bool>;

    async fn read_text(&mut self, element: &ElementRef) -> Result<String>;

    /// Property first, then attribute, like WebDriver's `getAttribute`.
    async fn read_attribute(&mut self, element: &ElementRef, name: &str)
        -> Result<Option<String>>;

    async fn input_value(&mut self, locator: &str) -> Result<String>;

    async fn clear_input(&mut self, locator: &str) -> Result<()>;

    async fn type_text(&mut self, locator: &str, text: &str) -> Result<()>;

    /// Open page windows in the order they were opened, oldest first.
    async fn window_handles(&mut self) -> Result<Vec<TabHandle>>;

    async fn current_window(&mut self) -> Result<TabHandle>;

    async fn switch_to(&mut self, handle: &TabHandle) -> Result<()>;

    /// Close the active window. Another window must be switched to before
    /// further interaction.
    async fn close_window(&mut self) -> Result<()>;

    async fn back(&mut self) -> Result<()>;

    async fn refresh(&mut self) -> Result<()>;
}

/// Build a locator addressing the `position`-th (1-based) match of `base`.
pub fn nth_locator(base: &str, position: usize) -> String {
    format!("{}[{}]", base, position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nth_locator() {
        assert_eq!(
            nth_locator("(//div[@class='Explore-GridViewItem'])", 3),
            "(//div[@class='Explore-GridViewItem'])[3]"
        );
    }

    #[test]
    fn test_element_ref_accessors() {
        let el = ElementRef::new("//a", 2);
        assert_eq!(el.locator(), "//a");
        assert_eq!(el.index(), 2);
        assert_eq!(TabHandle::new("T1").to_string(), "T1");
    }
}
