//! CSV and JSON dumps of the store.

use crate::error::Result;
use crate::model::Store;
use crate::store::now_millis;

const CONTACTS_HEADER: &str = "ID,Name,Lead,Emails,Phones";
const OPPORTUNITIES_HEADER: &str = "ID,Name,Value,Status,Close Date";
const TASKS_HEADER: &str = "ID,Description,Due Date,Assignee,Complete";

/// `close-data-<millis>.<ext>`
pub fn default_filename(ext: &str) -> String {
    format!("close-data-{}.{}", now_millis(), ext)
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn sorted<'a, T>(map: &'a std::collections::HashMap<String, T>) -> Vec<&'a T> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.into_iter().filter_map(|k| map.get(k)).collect()
}

fn section(title: &str, header: &str, rows: Vec<String>) -> Option<String> {
    if rows.is_empty() {
        return None;
    }
    let mut out = format!("{}\n{}\n", title, header);
    for row in rows {
        out.push_str(&row);
        out.push('\n');
    }
    Some(out)
}

/// One section per non-empty entity kind, separated by two blank lines.
/// Every field is quoted except the Yes/No completion flag.
pub fn to_csv(store: &Store) -> String {
    let contacts = sorted(&store.contacts)
        .into_iter()
        .map(|c| {
            [&c.id, &c.name, &c.lead, &c.emails.join(";"), &c.phones.join(";")]
                .map(|f| quote(f))
                .join(",")
        })
        .collect();

    let opportunities = sorted(&store.opportunities)
        .into_iter()
        .map(|o| {
            [&o.id, &o.name, &o.value, &o.status, &o.close_date]
                .map(|f| quote(f))
                .join(",")
        })
        .collect();

    let tasks = sorted(&store.tasks)
        .into_iter()
        .map(|t| {
            let quoted = [&t.id, &t.description, &t.due_date, &t.assignee].map(|f| quote(f));
            let done = if t.is_complete { "Yes" } else { "No" };
            format!("{},{}", quoted.join(","), done)
        })
        .collect();

    [
        section("CONTACTS", CONTACTS_HEADER, contacts),
        section("OPPORTUNITIES", OPPORTUNITIES_HEADER, opportunities),
        section("TASKS", TASKS_HEADER, tasks),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("\n\n")
}

pub fn to_json(store: &Store) -> Result<String> {
    Ok(serde_json::to_string_pretty(store)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Contact, Task};

    fn store() -> Store {
        let mut s = Store::default();
        for (id, name) in [("b", "Bob \"B\" Stone"), ("a", "Ann")] {
            s.contacts.insert(
                id.into(),
                Contact {
                    id: id.into(),
                    name: name.into(),
                    lead: "Acme".into(),
                    emails: vec!["x@acme.com".into(), "y@acme.com".into()],
                    phones: vec![],
                },
            );
        }
        s.tasks.insert(
            "t".into(),
            Task {
                id: "t".into(),
                description: "Call".into(),
                due_date: "2025-03-14".into(),
                assignee: "Me".into(),
                is_complete: false,
            },
        );
        s.last_sync = 42;
        s
    }

    #[test]
    fn csv_sections_skip_empty_kinds() {
        let csv = to_csv(&store());
        let expected = "CONTACTS\n\
            ID,Name,Lead,Emails,Phones\n\
            \"a\",\"Ann\",\"Acme\",\"x@acme.com;y@acme.com\",\"\"\n\
            \"b\",\"Bob \"\"B\"\" Stone\",\"Acme\",\"x@acme.com;y@acme.com\",\"\"\n\
            \n\n\
            TASKS\n\
            ID,Description,Due Date,Assignee,Complete\n\
            \"t\",\"Call\",\"2025-03-14\",\"Me\",No\n";
        assert_eq!(csv, expected);
        assert!(!csv.contains("OPPORTUNITIES"));
    }

    #[test]
    fn empty_store_exports_nothing() {
        assert_eq!(to_csv(&Store::default()), "");
    }

    #[test]
    fn json_keeps_wire_field_names() {
        let json = to_json(&store()).unwrap();
        assert!(json.contains("\"lastSync\": 42"));
        assert!(json.contains("\"dueDate\": \"2025-03-14\""));
        let back: Store = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store());
    }

    #[test]
    fn filename_has_extension() {
        let name = default_filename("csv");
        assert!(name.starts_with("close-data-"));
        assert!(name.ends_with(".csv"));
    }
}
