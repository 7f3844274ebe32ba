use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::ident;
use crate::model::Contact;
use crate::parser::matcher::{first_text, hrefs_with_scheme, own_text, selector, text};

pub const UNKNOWN_LEAD: &str = "Unknown Lead";
pub const UNKNOWN_CONTACT: &str = "Unknown Contact";

static ROWS: LazyLock<Selector> = LazyLock::new(|| selector(r#"tbody tr[class*="DataTable_row_"]"#));
static HEADERS: LazyLock<Selector> = LazyLock::new(|| selector("thead th"));
static CELLS: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static MAILTO: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href^="mailto:"]"#));
static TEL: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href^="tel:"]"#));

/// Column positions in the leads table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub lead: usize,
    pub contact: usize,
    /// Only logged: contacts carry no status, but a missing status header
    /// is a sign the table layout changed.
    pub status: Option<usize>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            lead: 0,
            contact: 3,
            status: None,
        }
    }
}

/// Resolve columns from header text, keeping the fixed defaults for any
/// header that is missing or renamed. Later matches win.
pub fn resolve_columns(doc: &Html) -> Columns {
    let mut cols = Columns::default();
    for (i, th) in doc.select(&HEADERS).enumerate() {
        match text(th).to_lowercase().as_str() {
            "name" => cols.lead = i,
            "contacts" => cols.contact = i,
            "status" => cols.status = Some(i),
            _ => {}
        }
    }
    cols
}

pub fn extract(doc: &Html) -> Vec<Contact> {
    let cols = resolve_columns(doc);
    if cols.status.is_none() {
        tracing::debug!(?cols, "Leads table has no status header");
    }
    let mut contacts = Vec::new();

    for row in doc.select(&ROWS) {
        let cells: Vec<_> = row.select(&CELLS).collect();
        if cells.len() < 3 {
            continue;
        }

        let lead = cells
            .get(cols.lead)
            .and_then(|cell| first_text(*cell, &LINK).or_else(|| own_text(*cell)))
            .unwrap_or_else(|| UNKNOWN_LEAD.to_string());
        let name = cells
            .get(cols.contact)
            .and_then(|cell| own_text(*cell))
            .unwrap_or_else(|| UNKNOWN_CONTACT.to_string());

        if lead == UNKNOWN_LEAD && name == UNKNOWN_CONTACT {
            continue;
        }

        let emails = hrefs_with_scheme(row, &MAILTO, "mailto:");
        let phones = hrefs_with_scheme(row, &TEL, "tel:");
        let id = ident::contact_id(&emails, &lead, &name);

        contacts.push(Contact {
            id,
            name,
            lead,
            emails,
            phones,
        });
    }

    contacts
}
