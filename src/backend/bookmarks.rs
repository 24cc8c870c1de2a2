use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::{Error, Result};
use super::kv::KeyValueStore;
use super::model::{ContentUnit, UnitId};

const INDEX_KEY: &str = "bookmarks/index";
const RECORD_PREFIX: &str = "bookmarks/unit/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub section_id: u32,
    pub section_name: String,
    pub unit_id: UnitId,
    pub ordinal: u32,
    pub page: u32,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(unit: &ContentUnit, page: u32, created_at: DateTime<Utc>) -> Self {
        Bookmark {
            section_id: unit.section.id,
            section_name: unit.section.name.clone(),
            unit_id: unit.id,
            ordinal: unit.ordinal,
            page,
            created_at,
        }
    }
}

fn record_key(unit: UnitId) -> String {
    format!("{}{}", RECORD_PREFIX, unit)
}

/// User bookmarks, at most one per unit. Every mutation is written through
/// to the key-value store before it returns.
pub struct BookmarkStore {
    kv: Box<dyn KeyValueStore>,
    entries: HashMap<UnitId, Bookmark>,
}

impl BookmarkStore {
    pub fn open(kv: Box<dyn KeyValueStore>) -> Result<Self> {
        let ids: Vec<UnitId> = match kv.get(INDEX_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                log::warn!("bookmark index unreadable, starting empty: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let mut entries = HashMap::new();
        for id in ids {
            let Some(raw) = kv.get(&record_key(id))? else {
                log::warn!("bookmark index lists unit {} but its record is missing", id);
                continue;
            };
            match serde_json::from_str::<Bookmark>(&raw) {
                Ok(bookmark) if bookmark.unit_id == id => {
                    entries.insert(id, bookmark);
                }
                Ok(_) => log::warn!("bookmark record for unit {} belongs to another unit", id),
                Err(e) => log::warn!("skipping corrupt bookmark for unit {}: {}", id, e),
            }
        }

        log::info!("loaded {} bookmarks", entries.len());
        Ok(Self { kv, entries })
    }

    fn write_index(&mut self) -> Result<()> {
        let mut ids: Vec<UnitId> = self.entries.keys().copied().collect();
        ids.sort();
        let raw = serde_json::to_string(&ids).map_err(|e| Error::Storage(e.to_string()))?;
        self.kv.set(INDEX_KEY, &raw)
    }

    pub fn add(&mut self, unit: &ContentUnit, page: u32) -> Result<()> {
        self.add_at(unit, page, Utc::now())
    }

    /// Adds with an explicit creation time. No-op when `unit` is already
    /// bookmarked; the original timestamp is kept.
    pub fn add_at(&mut self, unit: &ContentUnit, page: u32, created_at: DateTime<Utc>) -> Result<()> {
        if self.entries.contains_key(&unit.id) {
            return Ok(());
        }

        let bookmark = Bookmark::new(unit, page, created_at);
        let raw = serde_json::to_string(&bookmark).map_err(|e| Error::Storage(e.to_string()))?;
        self.kv.set(&record_key(unit.id), &raw)?;

        self.entries.insert(unit.id, bookmark);
        if let Err(e) = self.write_index() {
            self.entries.remove(&unit.id);
            return Err(e);
        }
        log::debug!("bookmarked unit {}", unit.id);
        Ok(())
    }

    pub fn remove(&mut self, unit_id: UnitId) -> Result<()> {
        let Some(removed) = self.entries.remove(&unit_id) else {
            return Ok(());
        };
        if let Err(e) = self.write_index() {
            self.entries.insert(unit_id, removed);
            return Err(e);
        }
        // an orphaned record is harmless, the index no longer lists it
        if let Err(e) = self.kv.delete(&record_key(unit_id)) {
            log::warn!("could not delete bookmark record for unit {}: {}", unit_id, e);
        }
        log::debug!("removed bookmark for unit {}", unit_id);
        Ok(())
    }

    pub fn has(&self, unit_id: UnitId) -> bool {
        self.entries.contains_key(&unit_id)
    }

    /// Returns whether `unit` is bookmarked afterwards.
    pub fn toggle(&mut self, unit: &ContentUnit, page: u32) -> Result<bool> {
        if self.has(unit.id) {
            self.remove(unit.id)?;
            Ok(false)
        } else {
            self.add(unit, page)?;
            Ok(true)
        }
    }

    /// Newest first.
    pub fn list(&self) -> Vec<Bookmark> {
        let mut list: Vec<Bookmark> = self.entries.values().cloned().collect();
        list.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.unit_id.cmp(&a.unit_id))
        });
        list
    }

    /// Where "continue reading" resumes.
    pub fn latest(&self) -> Option<Bookmark> {
        self.list().into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
