pub mod extract;
pub mod matcher;

use scraper::Html;

use crate::model::Batch;
use extract::{contacts, opportunities, tasks};

/// Which list the page address says we're looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Leads,
    Opportunities,
    Tasks,
    /// Unknown page: contacts always, the others when their markup shows up.
    Any,
}

impl Route {
    pub fn for_url(url: &str) -> Self {
        if url.contains("/leads") || url.contains("search") {
            Route::Leads
        } else if url.contains("/opportunities") {
            Route::Opportunities
        } else if url.contains("/tasks") || url.contains("/inbox") {
            Route::Tasks
        } else {
            Route::Any
        }
    }
}

/// One scrape pass over a DOM snapshot.
pub fn scrape(route: Route, html: &str) -> Batch {
    let doc = Html::parse_document(html);
    scrape_document(route, &doc)
}

pub fn scrape_document(route: Route, doc: &Html) -> Batch {
    let mut batch = Batch::default();
    match route {
        Route::Leads => batch.contacts = contacts::extract(doc),
        Route::Opportunities => batch.opportunities = opportunities::extract(doc),
        Route::Tasks => batch.tasks = tasks::extract(doc),
        Route::Any => {
            batch.contacts = contacts::extract(doc);
            if matcher::has_match(doc, &matcher::OPPORTUNITY_MARKER) {
                batch.opportunities = opportunities::extract(doc);
            }
            if matcher::has_match(doc, &matcher::TASK_MARKER) {
                batch.tasks = tasks::extract(doc);
            }
        }
    }
    batch
}

// ── Tests ──

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn fixture_html(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    pub(crate) fn fixture(name: &str) -> Html {
        Html::parse_document(&fixture_html(name))
    }

    #[test]
    fn routes_from_address() {
        assert_eq!(Route::for_url("https://app.close.com/leads/"), Route::Leads);
        assert_eq!(Route::for_url("https://app.close.com/search/?q=acme"), Route::Leads);
        assert_eq!(Route::for_url("https://app.close.com/opportunities/"), Route::Opportunities);
        assert_eq!(Route::for_url("https://app.close.com/tasks/"), Route::Tasks);
        assert_eq!(Route::for_url("https://app.close.com/inbox/"), Route::Tasks);
        assert_eq!(Route::for_url("https://app.close.com/lead/lead_1/"), Route::Any);
    }

    #[test]
    fn routed_scrape_runs_one_extractor() {
        let batch = scrape(Route::Opportunities, &fixture_html("pipeline"));
        assert_eq!(batch.opportunities.len(), 4);
        assert!(batch.contacts.is_empty());
        assert!(batch.tasks.is_empty());
    }

    #[test]
    fn unknown_route_is_gated_by_markup() {
        let batch = scrape(Route::Any, &fixture_html("inbox"));
        assert!(batch.contacts.is_empty());
        assert!(batch.opportunities.is_empty());
        assert_eq!(batch.tasks.len(), 3);

        let batch = scrape(Route::Any, &fixture_html("leads"));
        assert_eq!(batch.contacts.len(), 3);
        assert!(batch.opportunities.is_empty());
        assert!(batch.tasks.is_empty());

        let batch = scrape(Route::Any, &fixture_html("pipeline"));
        assert!(batch.contacts.is_empty());
        assert_eq!(batch.opportunities.len(), 4);
        assert!(batch.tasks.is_empty());
    }

    #[test]
    fn wrong_route_finds_nothing() {
        assert!(scrape(Route::Tasks, &fixture_html("leads")).is_empty());
    }
}
