//! Process-local storage backend.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::StorageBackend;
use crate::error::StorageError;

/// In-memory backend. Every operation takes a single lock, so each call is
/// atomic on its own; state is lost when the process exits.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    hashes: HashMap<String, HashMap<String, String>>,
    sorted: HashMap<String, SortedSet>,
    sets: HashMap<String, HashSet<String>>,
    next_seq: u64,
}

/// Score ordered with `f64::total_cmp` so it can live in a `BTreeSet`.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Sorted set ordered by `(score, first insertion)`.
#[derive(Default)]
struct SortedSet {
    members: HashMap<String, (Score, u64)>,
    order: BTreeSet<(Score, u64, String)>,
}

impl SortedSet {
    fn upsert(&mut self, member: &str, score: f64, seq: u64) {
        let seq = match self.members.get(member) {
            Some(&(old_score, old_seq)) => {
                self.order.remove(&(old_score, old_seq, member.to_string()));
                old_seq
            }
            None => seq,
        };
        self.members.insert(member.to_string(), (Score(score), seq));
        self.order.insert((Score(score), seq, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.members.remove(member) {
            Some((score, seq)) => {
                self.order.remove(&(score, seq, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn first(&self) -> Option<&str> {
        self.order.first().map(|(_, _, m)| m.as_str())
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Connection("memory backend lock poisoned".into()))
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_set_many(&self, key: &str, fields: &[(String, String)]) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StorageError> {
        Ok(self.lock()?.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.hashes.remove(key).is_some())
    }

    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .sorted
            .entry(key.to_string())
            .or_default()
            .upsert(member, score, seq);
        Ok(())
    }

    async fn sorted_set_peek_min(&self, key: &str) -> Result<Option<String>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .sorted
            .get(key)
            .and_then(SortedSet::first)
            .map(str::to_string))
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        let Some(set) = state.sorted.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.members.is_empty() {
            state.sorted.remove(key);
        }
        Ok(removed)
    }

    async fn sorted_set_len(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self
            .lock()?
            .sorted
            .get(key)
            .map_or(0, |set| set.members.len()))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        Ok(state
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        let Some(set) = state.sets.get_mut(key) else {
            return Ok(false);
        };
        let removed = set.remove(member);
        if set.is_empty() {
            state.sets.remove(key);
        }
        Ok(removed)
    }

    async fn set_cardinality(&self, key: &str) -> Result<usize, StorageError> {
        Ok(self.lock()?.sets.get(key).map_or(0, HashSet::len))
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StorageError> {
        Ok(self
            .lock()?
            .sets
            .get(key)
            .is_some_and(|set| set.contains(member)))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .lock()?
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn flush_all(&self) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.hashes.clear();
        state.sorted.clear();
        state.sets.clear();
        Ok(())
    }
}
