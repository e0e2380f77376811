//! StateStore: redb-backed persistence for autoscaler objects.
//!
//! Provides typed CRUD over autoscaler specs and their status. All values
//! are JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use hpa_core::{AutoscalerSpec, AutoscalerStatus};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn encode<T: Serialize>(key: &str, value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StateError::Codec {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Codec {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Check that a key has the `{namespace}/{name}` shape.
fn check_key(key: &str) -> StateResult<()> {
    match key.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => Ok(()),
        _ => Err(StateError::InvalidKey(key.to_string())),
    }
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(AUTOSCALERS).map_err(map_err!(Table))?;
        txn.open_table(STATUSES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Autoscalers ────────────────────────────────────────────────

    /// Insert or update an autoscaler spec and return its generation.
    ///
    /// The generation starts at 1 and is bumped only when the stored spec
    /// actually changes; the caller's `generation` field is ignored.
    pub fn put_autoscaler(&self, spec: &AutoscalerSpec) -> StateResult<u64> {
        let key = spec.key();
        check_key(&key)?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let generation;
        {
            let mut table = txn.open_table(AUTOSCALERS).map_err(map_err!(Table))?;
            let existing: Option<AutoscalerSpec> = match table
                .get(key.as_str())
                .map_err(map_err!(Storage))?
            {
                Some(guard) => Some(decode(&key, guard.value())?),
                None => None,
            };

            generation = match existing {
                Some(old) => {
                    let unchanged = AutoscalerSpec {
                        generation: old.generation,
                        ..spec.clone()
                    } == old;
                    if unchanged {
                        old.generation
                    } else {
                        old.generation + 1
                    }
                }
                None => 1,
            };

            let stored = AutoscalerSpec {
                generation,
                ..spec.clone()
            };
            let value = encode(&key, &stored)?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, generation, "autoscaler stored");
        Ok(generation)
    }

    /// Get an autoscaler by `{namespace}/{name}` key.
    pub fn get_autoscaler(&self, key: &str) -> StateResult<Option<AutoscalerSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUTOSCALERS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Storage))? {
            Some(guard) => Ok(Some(decode(key, guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all autoscalers, ordered by key.
    pub fn list_autoscalers(&self) -> StateResult<Vec<AutoscalerSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUTOSCALERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            results.push(decode(key.value(), value.value())?);
        }
        Ok(results)
    }

    /// List all autoscaler keys, ordered.
    pub fn list_keys(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUTOSCALERS).map_err(map_err!(Table))?;
        table
            .iter()
            .map_err(map_err!(Storage))?
            .map(|entry| {
                entry
                    .map(|(key, _)| key.value().to_string())
                    .map_err(map_err!(Storage))
            })
            .collect()
    }

    /// Delete an autoscaler and its status. Returns true if it existed.
    pub fn delete_autoscaler(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(AUTOSCALERS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Storage))?.is_some();
            let mut statuses = txn.open_table(STATUSES).map_err(map_err!(Table))?;
            statuses.remove(key).map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "autoscaler deleted");
        Ok(existed)
    }

    // ── Status ─────────────────────────────────────────────────────

    /// Write the status of an existing autoscaler.
    ///
    /// Fails with `NotFound` if the autoscaler was deleted meanwhile, so a
    /// late reconciliation cannot resurrect its status.
    pub fn put_status(&self, key: &str, status: &AutoscalerStatus) -> StateResult<()> {
        let value = encode(key, status)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let autoscalers = txn.open_table(AUTOSCALERS).map_err(map_err!(Table))?;
            if autoscalers.get(key).map_err(map_err!(Storage))?.is_none() {
                return Err(StateError::NotFound(key.to_string()));
            }
            let mut table = txn.open_table(STATUSES).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the last written status of an autoscaler.
    pub fn get_status(&self, key: &str) -> StateResult<Option<AutoscalerStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUSES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Storage))? {
            Some(guard) => Ok(Some(decode(key, guard.value())?)),
            None => Ok(None),
        }
    }
}
