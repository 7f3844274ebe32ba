//! The page an extractor runs against.
//!
//! A page hands out its address and a DOM snapshot and can be scrolled.
//! Implementations use interior mutability so one page can be shared
//! between the agent that owns it and a running extraction.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{ExtractError, Result};

pub type PageId = u64;

/// What the pagination driver scrolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollTarget {
    /// The first table-like container on the page.
    Container,
    Body,
}

pub trait Page: Send + Sync {
    fn url(&self) -> String;

    /// Serialized DOM as currently rendered.
    fn html(&self) -> Result<String>;

    /// Scrollable height of `target`.
    fn scroll_extent(&self, target: ScrollTarget) -> u64;

    fn scroll_to(&self, target: ScrollTarget, offset: u64);
}

/// A DOM saved to disk. The file is re-read on every access so a capture
/// that keeps being rewritten behaves like a live page.
pub struct SnapshotPage {
    url: String,
    path: PathBuf,
}

impl SnapshotPage {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }
}

impl Page for SnapshotPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn html(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            ExtractError::Page(format!("cannot read snapshot {}: {}", self.path.display(), e))
        })
    }

    /// Snapshot size stands in for scroll height; it only grows when the
    /// capture gains content.
    fn scroll_extent(&self, _target: ScrollTarget) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn scroll_to(&self, _target: ScrollTarget, _offset: u64) {}
}

/// An in-memory page whose markup can be swapped out.
pub struct StaticPage {
    url: String,
    html: Mutex<String>,
}

impl StaticPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: Mutex::new(html.into()),
        }
    }

    pub fn set_html(&self, html: impl Into<String>) {
        *self.html.lock().unwrap_or_else(|e| e.into_inner()) = html.into();
    }
}

impl Page for StaticPage {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn html(&self) -> Result<String> {
        Ok(self.html.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn scroll_extent(&self, _target: ScrollTarget) -> u64 {
        self.html.lock().unwrap_or_else(|e| e.into_inner()).len() as u64
    }

    fn scroll_to(&self, _target: ScrollTarget, _offset: u64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn snapshot_page_rereads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<p>one</p>").unwrap();
        let page = SnapshotPage::new("https://app.close.com/leads/", file.path());
        assert_eq!(page.html().unwrap(), "<p>one</p>");
        let before = page.scroll_extent(ScrollTarget::Body);

        write!(file, "<p>two</p>").unwrap();
        file.flush().unwrap();
        assert!(page.html().unwrap().contains("two"));
        assert!(page.scroll_extent(ScrollTarget::Body) > before);
    }

    #[test]
    fn missing_snapshot_is_a_page_error() {
        let page = SnapshotPage::new("https://app.close.com/", "/nonexistent/dom.html");
        assert!(matches!(page.html(), Err(ExtractError::Page(_))));
        assert_eq!(page.scroll_extent(ScrollTarget::Body), 0);
    }
}
