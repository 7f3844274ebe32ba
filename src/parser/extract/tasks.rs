use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::ident;
use crate::model::Task;
use crate::parser::matcher::{first_line, first_text, selector, text};

pub const NO_DESCRIPTION: &str = "No Description";
pub const NO_DATE: &str = "No Date";
pub const PLACEHOLDER_ASSIGNEE: &str = "Me";

static ROWS: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"div[class*="CollapsedItemLayout_"][class*="afterCheckboxWrapper"]"#)
});
static TITLE: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"[class*="CollapsedItemLayout_compact_ellipsis"], [class*="_titleWrapper_"], [class*="_title_"]"#,
    )
});
static LEAD_LINK: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href*="/lead/"]"#));
static TIME: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class*="DateAndAssignee_dateWrapper"] time, time"#));

pub fn extract(doc: &Html) -> Vec<Task> {
    let rows: Vec<_> = doc.select(&ROWS).collect();
    tracing::debug!("Scanning compact task rows: found {}", rows.len());

    rows.into_iter().map(extract_row).collect()
}

fn extract_row(row: ElementRef) -> Task {
    let description = row
        .select(&TITLE)
        .next()
        .map(first_line)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());

    let description = match first_text(row, &LEAD_LINK) {
        Some(lead) => format!("{} ({})", description, lead),
        None => description,
    };

    let due_date = row
        .select(&TIME)
        .next()
        .and_then(due_date)
        .unwrap_or_else(|| NO_DATE.to_string());

    let id = ident::task_id(&description, &due_date);

    Task {
        id,
        description,
        due_date,
        assignee: PLACEHOLDER_ASSIGNEE.to_string(),
        is_complete: false,
    }
}

/// Date part of `datetime`, else the displayed text.
fn due_date(time: ElementRef) -> Option<String> {
    time.value()
        .attr("datetime")
        .and_then(|dt| dt.split('T').next())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| Some(text(time)).filter(|t| !t.is_empty()))
}
