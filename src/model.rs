use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub lead: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: String,
    pub name: String,
    pub value: String,
    pub status: String,
    pub close_date: String,
}

/// `assignee` and `is_complete` are placeholders: the task list does not
/// expose either at scrape time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub due_date: String,
    pub assignee: String,
    pub is_complete: bool,
}

/// Everything one scrape produced, before it is merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub contacts: Vec<Contact>,
    pub opportunities: Vec<Opportunity>,
    pub tasks: Vec<Task>,
}

impl Batch {
    pub fn total(&self) -> usize {
        self.contacts.len() + self.opportunities.len() + self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// The persisted record. `last_sync` is epoch milliseconds; 0 means never.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    #[serde(default)]
    pub contacts: HashMap<String, Contact>,
    #[serde(default)]
    pub opportunities: HashMap<String, Opportunity>,
    #[serde(default)]
    pub tasks: HashMap<String, Task>,
    #[serde(default)]
    pub last_sync: i64,
}

impl Store {
    pub fn len(&self) -> usize {
        self.contacts.len() + self.opportunities.len() + self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contacts,
    Opportunities,
    Tasks,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Contacts,
        EntityKind::Opportunities,
        EntityKind::Tasks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Contacts => "contacts",
            EntityKind::Opportunities => "opportunities",
            EntityKind::Tasks => "tasks",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contact" | "contacts" => Ok(EntityKind::Contacts),
            "opportunity" | "opportunities" | "opp" | "opps" => Ok(EntityKind::Opportunities),
            "task" | "tasks" => Ok(EntityKind::Tasks),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}
