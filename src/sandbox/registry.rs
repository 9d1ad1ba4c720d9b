//! Container registry
//!
//! In-memory record of live sandbox containers. Only the lifecycle manager
//! mutates it, always under its lock.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// A live sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Runtime-assigned container id
    pub id: String,
    /// Generated container name
    pub name: String,
    /// When the container entered the registry
    pub created_at: DateTime<Utc>,
}

impl ContainerRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        ContainerRecord {
            id: id.into(),
            name: name.into(),
            created_at,
        }
    }

    /// Whether the record has outlived `ttl` at `now`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        // A record created in the future (clock skew) is never expired
        match (now - self.created_at).to_std() {
            Ok(age) => age > ttl,
            Err(_) => false,
        }
    }
}

/// Mapping from container id to record
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    records: HashMap<String, ContainerRecord>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub fn put(&mut self, record: ContainerRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ContainerRecord> {
        self.records.remove(id)
    }

    /// Ids of every record with `now - created_at > ttl`
    pub fn list_expired(&self, ttl: Duration, now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<String> = self
            .records
            .values()
            .filter(|r| r.is_expired(ttl, now))
            .map(|r| r.id.clone())
            .collect();
        expired.sort();
        expired
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// The member to reuse: the most recently created record, ties broken by
    /// the greatest id.
    pub fn any_id(&self) -> Option<&str> {
        self.records
            .values()
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|r| r.id.as_str())
    }

    /// Remove and return every record
    pub fn drain(&mut self) -> Vec<ContainerRecord> {
        self.records.drain().map(|(_, r)| r).collect()
    }
}
