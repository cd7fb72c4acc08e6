//! History window tracking for paginated flowsheet loading
//!
//! Page 0 is the newest slice of the flowsheet; higher pages reach further
//! back into the show's history. The window records how deep the console has
//! loaded and gates load-more so only one fetch is ever outstanding.

use serde::{Deserialize, Serialize};

/// Loaded-history window over the backend's paginated flowsheet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageWindow {
    /// Most recently completed page.
    page: u32,
    /// Rows per page, fixed from configuration.
    limit: u32,
    /// Deepest page ever loaded. Never decreases.
    max_page_loaded: u32,
    /// Whether a page fetch is outstanding.
    in_flight: bool,
}

impl PageWindow {
    pub fn new(limit: u32) -> Self {
        Self {
            page: 0,
            limit,
            max_page_loaded: 0,
            in_flight: false,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn max_page_loaded(&self) -> u32 {
        self.max_page_loaded
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Claim the next page to fetch, or `None` if a fetch is already
    /// outstanding (duplicate load-more triggers are no-ops).
    ///
    /// # Examples
    /// ```
    /// use wfsh_console::flowsheet::PageWindow;
    ///
    /// let mut window = PageWindow::new(50);
    /// assert_eq!(window.begin_load_more(), Some(1));
    /// assert_eq!(window.begin_load_more(), None); // already fetching
    /// window.complete(1);
    /// assert_eq!(window.max_page_loaded(), 1);
    /// ```
    pub fn begin_load_more(&mut self) -> Option<u32> {
        if self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(self.max_page_loaded + 1)
    }

    /// Record a successful fetch. The high-water mark only moves up, so a
    /// resync refetch of an older page never shrinks the window.
    pub fn complete(&mut self, page: u32) {
        self.in_flight = false;
        self.page = page;
        self.max_page_loaded = self.max_page_loaded.max(page);
    }

    /// Record a failed fetch. The window is unchanged so the page can be
    /// retried.
    pub fn abort(&mut self) {
        self.in_flight = false;
    }

    /// Pages a resync must refetch to rebuild everything the console had
    /// loaded before the channel dropped.
    pub fn resync_pages(&self) -> std::ops::RangeInclusive<u32> {
        0..=self.max_page_loaded
    }
}
