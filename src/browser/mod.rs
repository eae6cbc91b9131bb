//! Narrow page-driver interface over a browser (or a static HTML snapshot).
//!
//! The pipeline only ever navigates, lists elements by CSS selector, reads
//! their text/attributes, clicks, and takes the rendered HTML. Everything
//! else about the browser stays behind this trait so extraction logic can be
//! exercised with recorded pages.

pub mod chromium;
pub mod snapshot;

use std::time::Duration;

use async_trait::async_trait;

use crate::fetch::FetchError;
use crate::settings::{SettleMode, Settings};

pub use chromium::ChromiumDriver;
pub use snapshot::SnapshotDriver;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid selector {0:?}")]
    Selector(String),
    #[error("element {selector}[{index}] is gone")]
    StaleElement { selector: String, index: usize },
    #[error("no page loaded")]
    NoPage,
    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),
    #[error("browser error: {0}")]
    Browser(String),
}

/// Position of an element in the result of a `find_all` query.
///
/// Handles are re-resolved on use, so they survive as long as the page
/// structure does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
    pub tag: String,
}

#[async_trait(?Send)]
pub trait PageDriver {
    /// Load `url` and wait until the page is settled.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;
    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>, DriverError>;
    async fn read_text(&mut self, element: &ElementHandle) -> Result<String, DriverError>;
    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;
    /// Click and wait for the page to settle again.
    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;
    /// Current rendered HTML.
    async fn content(&mut self) -> Result<String, DriverError>;
    fn current_url(&self) -> Option<&str>;
    /// Whether `click` can do anything useful.
    fn interactive(&self) -> bool;
    /// Release the underlying resources. Safe to call more than once.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Readiness policy, resolved from settings.
#[derive(Debug, Clone, Copy)]
pub enum Settle {
    Ready {
        poll: Duration,
        quiet_polls: u32,
        timeout: Duration,
    },
    Fixed(Duration),
}

impl Settle {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.settle {
            SettleMode::Ready => Settle::Ready {
                poll: Duration::from_millis(settings.settle_poll_ms),
                quiet_polls: settings.settle_quiet_polls,
                timeout: Duration::from_millis(settings.settle_timeout_ms),
            },
            SettleMode::Fixed => Settle::Fixed(Duration::from_millis(settings.settle_ms)),
        }
    }
}

/// Tracks successive readiness probes until the page has been complete and
/// quiet for `quiet_polls` polls in a row.
#[derive(Debug, Default)]
pub(crate) struct QuietTracker {
    last_resources: Option<u64>,
    quiet: u32,
}

impl QuietTracker {
    /// Feed one probe result; returns true once settled.
    pub(crate) fn observe(&mut self, ready_state: &str, resources: u64, quiet_polls: u32) -> bool {
        if ready_state != "complete" {
            self.last_resources = None;
            self.quiet = 0;
            return false;
        }
        if self.last_resources == Some(resources) {
            self.quiet += 1;
        } else {
            self.quiet = 0;
        }
        self.last_resources = Some(resources);
        self.quiet >= quiet_polls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_tracker_needs_consecutive_stable_polls() {
        let mut t = QuietTracker::default();
        assert!(!t.observe("loading", 3, 2));
        assert!(!t.observe("complete", 5, 2));
        assert!(!t.observe("complete", 5, 2));
        // a late resource resets the count
        assert!(!t.observe("complete", 6, 2));
        assert!(!t.observe("complete", 6, 2));
        assert!(t.observe("complete", 6, 2));
    }

    #[test]
    fn settle_mode_maps_from_settings() {
        let mut settings = Settings::default();
        assert!(matches!(Settle::from_settings(&settings), Settle::Ready { quiet_polls: 3, .. }));
        settings.settle = SettleMode::Fixed;
        settings.settle_ms = 500;
        assert!(matches!(
            Settle::from_settings(&settings),
            Settle::Fixed(d) if d == Duration::from_millis(500)
        ));
    }
}
