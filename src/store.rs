//! Store merging and the shared handle every context uses to reach it.
//!
//! Writes follow read-full / upsert / write-full with no version check. Two
//! pages extracting at once can therefore lose one run's records; the
//! per-page single-flight guard does not cover that case.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::db;
use crate::error::Result;
use crate::model::{Batch, Contact, EntityKind, Opportunity, Store, Task};

/// Upsert every record of `batch` by id and stamp the sync time.
/// `last_sync` never moves backwards.
pub fn merge(mut current: Store, batch: &Batch, now: i64) -> Store {
    for c in &batch.contacts {
        current.contacts.insert(c.id.clone(), c.clone());
    }
    for o in &batch.opportunities {
        current.opportunities.insert(o.id.clone(), o.clone());
    }
    for t in &batch.tasks {
        current.tasks.insert(t.id.clone(), t.clone());
    }
    current.last_sync = current.last_sync.max(now);
    current
}

/// Remove one entity. Returns false if the id was not there.
pub fn delete(store: &mut Store, kind: EntityKind, id: &str) -> bool {
    match kind {
        EntityKind::Contacts => store.contacts.remove(id).is_some(),
        EntityKind::Opportunities => store.opportunities.remove(id).is_some(),
        EntityKind::Tasks => store.tasks.remove(id).is_some(),
    }
}

/// Matches of a case-insensitive search, each list sorted by id.
#[derive(Debug, Default)]
pub struct SearchHits<'a> {
    pub contacts: Vec<&'a Contact>,
    pub opportunities: Vec<&'a Opportunity>,
    pub tasks: Vec<&'a Task>,
}

/// Substring search over names, lead names and task descriptions. An empty
/// query matches everything.
pub fn search<'a>(store: &'a Store, query: &str) -> SearchHits<'a> {
    let q = query.to_lowercase();
    let hit = |s: &str| q.is_empty() || s.to_lowercase().contains(&q);

    let mut hits = SearchHits {
        contacts: store
            .contacts
            .values()
            .filter(|c| hit(&c.name) || hit(&c.lead))
            .collect(),
        opportunities: store.opportunities.values().filter(|o| hit(&o.name)).collect(),
        tasks: store.tasks.values().filter(|t| hit(&t.description)).collect(),
    };
    hits.contacts.sort_by(|a, b| a.id.cmp(&b.id));
    hits.opportunities.sort_by(|a, b| a.id.cmp(&b.id));
    hits.tasks.sort_by(|a, b| a.id.cmp(&b.id));
    hits
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Shared access to the persisted store.
#[derive(Clone)]
pub struct StoreHandle {
    conn: Arc<Mutex<Connection>>,
    key: Arc<str>,
}

impl StoreHandle {
    pub fn open(path: &Path, key: &str) -> Result<Self> {
        Ok(Self::from_connection(db::connect(path)?, key))
    }

    pub fn in_memory(key: &str) -> Result<Self> {
        Ok(Self::from_connection(db::open_in_memory()?, key))
    }

    pub fn from_connection(conn: Connection, key: &str) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            key: Arc::from(key),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current snapshot. Absent means empty.
    pub fn load(&self) -> Result<Store> {
        db::load_store(&self.conn(), &self.key)
    }

    pub fn save(&self, store: &Store) -> Result<()> {
        db::save_store(&self.conn(), &self.key, store)
    }

    /// Read, merge at the current time, write back.
    pub fn merge_batch(&self, batch: &Batch) -> Result<Store> {
        self.merge_batch_at(batch, now_millis())
    }

    pub fn merge_batch_at(&self, batch: &Batch, now: i64) -> Result<Store> {
        let current = self.load()?;
        let merged = merge(current, batch, now);
        self.save(&merged)?;
        debug!(
            contacts = merged.contacts.len(),
            opportunities = merged.opportunities.len(),
            tasks = merged.tasks.len(),
            "Store saved"
        );
        Ok(merged)
    }

    /// Delete one entity; a missing id leaves the store untouched.
    pub fn delete(&self, kind: EntityKind, id: &str) -> Result<bool> {
        let mut store = self.load()?;
        if !delete(&mut store, kind, id) {
            return Ok(false);
        }
        self.save(&store)?;
        info!("Deleted {} {}", kind, id);
        Ok(true)
    }

    /// Drop the whole record. The next load sees an empty store.
    pub fn clear(&self) -> Result<()> {
        db::remove_store(&self.conn(), &self.key)?;
        info!("Store cleared");
        Ok(())
    }
}
