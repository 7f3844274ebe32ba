use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::ident;
use crate::model::Opportunity;
use crate::parser::matcher::{first_text, normalize_ws, raw_text, selector};

pub const DEFAULT_STATUS: &str = "Pipeline Stage";
pub const UNKNOWN_OPPORTUNITY: &str = "Unknown Opportunity";
pub const DEFAULT_VALUE: &str = "$0";

static COLUMNS: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class*="Table_Column_list_"]"#));
static COLUMN_HEADER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[class*="Table_ColumnHeader_header_"]"#));
static CARDS: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class*="OpportunityCard_card_"]"#));
static LEAD_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[class*="OpportunityCard_leadLink_"]"#));
static VALUE: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class*="OpportunityCard_valueText_"]"#));
static CLOSE: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class*="OpportunityCard_closeText_"]"#));

static COUNT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\d+ OPPORTUNITIES").unwrap());

pub fn extract(doc: &Html) -> Vec<Opportunity> {
    let mut opps = Vec::new();

    for column in doc.select(&COLUMNS) {
        let status = column_status(column);

        for card in column.select(&CARDS) {
            let name = first_text(card, &LEAD_LINK).unwrap_or_else(|| UNKNOWN_OPPORTUNITY.to_string());
            let value = first_text(card, &VALUE).unwrap_or_else(|| DEFAULT_VALUE.to_string());
            let close_text = first_text(card, &CLOSE).unwrap_or_default();
            let close_date = parse_close_date(&close_text);
            let id = ident::opportunity_id(&name, &value, &close_date);

            opps.push(Opportunity {
                id,
                name,
                value,
                status: status.clone(),
                close_date,
            });
        }
    }

    opps
}

/// Stage label from the header next to the card list, without the
/// "N OPPORTUNITIES" counter.
fn column_status(column: ElementRef) -> String {
    let header_text = column
        .parent()
        .and_then(ElementRef::wrap)
        .and_then(|parent| parent.select(&COLUMN_HEADER).next())
        .map(raw_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_STATUS.to_string());

    let first = header_text.split('\n').next().unwrap_or("");
    normalize_ws(&COUNT_SUFFIX.replace(first, ""))
}

/// "Estimated to close on Mar 14, 2025" → "Mar 14, 2025". Anything without
/// the separator is kept whole.
pub fn parse_close_date(text: &str) -> String {
    match text.split(" on ").nth(1) {
        Some(date) => date.trim().to_string(),
        None => text.to_string(),
    }
}
