//! Infinite-scroll driver.
//!
//! Scrolls the list to the bottom until its height stops growing or the
//! attempt ceiling is hit. It has no failure mode; the attempt count is
//! returned for logging.

use std::time::Duration;

use scraper::Html;
use tracing::debug;

use crate::page::{Page, ScrollTarget};
use crate::parser::matcher::SCROLL_CONTAINER;

/// Table-like container if the page has one, otherwise the body.
pub fn pick_target(page: &dyn Page) -> ScrollTarget {
    match page.html() {
        Ok(html) if Html::parse_document(&html).select(&SCROLL_CONTAINER).next().is_some() => {
            ScrollTarget::Container
        }
        _ => ScrollTarget::Body,
    }
}

pub async fn scroll_to_load_all(page: &dyn Page, delay: Duration, max_attempts: u32) -> u32 {
    let target = pick_target(page);
    let mut last_extent = 0;
    let mut attempts = 0;

    while attempts < max_attempts {
        let extent = page.scroll_extent(target);
        if extent == last_extent {
            break;
        }
        last_extent = extent;
        page.scroll_to(target, extent);
        tokio::time::sleep(delay).await;
        attempts += 1;
    }

    debug!(?target, "Pagination complete after {} scrolls", attempts);
    attempts
}
