//! In-memory result store (for testing/development)

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::ResultStore;
use crate::{DispatchError, Result};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Expired keys read as absent, like the real store
pub struct MemoryResultStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    available: AtomicBool,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an unreachable store
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Current contents of a live list
    pub fn list(&self, key: &str) -> Vec<String> {
        let now = Instant::now();
        match self.entries.read().get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::List(items) => items.iter().cloned().collect(),
                Value::Hash(_) => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Remaining time to live. `None` for missing keys and keys without expiration.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.read().get(key).is_some_and(|e| e.is_live(now))
    }

    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DispatchError::Store("store unavailable".to_string()))
        }
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> DispatchError {
    DispatchError::Store(format!("WRONGTYPE operation against key {}", key))
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put_hash(&self, key: &str, fields: Vec<(String, String)>, ttl: Option<Duration>) -> Result<()> {
        self.check_available()?;
        if fields.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(hash) => hash.extend(fields),
            Value::List(_) => return Err(wrong_type(key)),
        }
        if let Some(ttl) = ttl {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn push_list(&self, key: &str, values: Vec<String>, ttl: Option<Duration>) -> Result<()> {
        self.check_available()?;
        if values.is_empty() {
            return Ok(());
        }

        let now = Instant::now();
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::List(list) => list.extend(values),
            Value::Hash(_) => return Err(wrong_type(key)),
        }
        if let Some(ttl) = ttl {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn pop_list(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;

        let now = Instant::now();
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        if !entry.is_live(now) {
            entries.remove(key);
            return Ok(None);
        }

        let popped = match &mut entry.value {
            Value::List(list) => list.pop_front(),
            Value::Hash(_) => return Err(wrong_type(key)),
        };
        // an emptied list disappears
        if matches!(&entry.value, Value::List(list) if list.is_empty()) {
            entries.remove(key);
        }
        Ok(popped)
    }

    async fn read_hash(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check_available()?;

        let now = Instant::now();
        match self.entries.read().get(key) {
            Some(entry) if entry.is_live(now) => match &entry.value {
                Value::Hash(hash) => Ok(hash.clone()),
                Value::List(_) => Err(wrong_type(key)),
            },
            _ => Ok(HashMap::new()),
        }
    }
}
