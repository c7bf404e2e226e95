//! In-memory store contents.
//!
//! A store keeps its records ordered by primary key and, per index, an
//! ordered map from index key to the primary keys carrying it. Every mutation
//! goes through [`StoreData::write`], which keeps both in step and is also
//! what rollback replays.

use crate::error::{EngineError, EngineResult};
use crate::range::KeyRange;
use crate::schema::{IndexSchema, StoreSchema};
use agilestore_codec::{Key, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// A database: its version and its stores.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseData {
    pub(crate) version: u32,
    pub(crate) stores: BTreeMap<String, StoreData>,
}

impl DatabaseData {
    pub(crate) fn record_count(&self) -> usize {
        self.stores.values().map(StoreData::len).sum()
    }

    /// Undoes logged mutations, newest first.
    pub(crate) fn rollback(&mut self, undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            match entry {
                Undo::Record {
                    store,
                    key,
                    previous,
                } => {
                    if let Some(data) = self.stores.get_mut(&store) {
                        data.write(key, previous);
                    }
                }
                Undo::Generator { store, next_key } => {
                    if let Some(data) = self.stores.get_mut(&store) {
                        data.next_key = next_key;
                    }
                }
                Undo::Store(snapshot) => {
                    self.stores.insert(snapshot.schema.name.clone(), *snapshot);
                }
            }
        }
    }
}

/// One reversible mutation.
#[derive(Debug)]
pub(crate) enum Undo {
    /// A record was written or removed; `previous` restores it.
    Record {
        store: String,
        key: Key,
        previous: Option<Value>,
    },
    /// The key generator advanced.
    Generator { store: String, next_key: i64 },
    /// The whole store was replaced (clear).
    Store(Box<StoreData>),
}

/// Records and index entries of one store.
#[derive(Debug, Clone)]
pub(crate) struct StoreData {
    pub(crate) schema: StoreSchema,
    records: BTreeMap<Key, Value>,
    indexes: BTreeMap<String, BTreeMap<Key, BTreeSet<Key>>>,
    next_key: i64,
}

/// A position reached by a cursor: the cursor key and the primary key.
pub(crate) type Position = (Key, Key);

impl StoreData {
    pub(crate) fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Adds or replaces a record, enforcing key and uniqueness rules.
    pub(crate) fn insert(
        &mut self,
        mut value: Value,
        overwrite: bool,
        undo: &mut Vec<Undo>,
    ) -> EngineResult<Key> {
        let key = self.assign_key(&mut value, undo)?;
        if !overwrite && self.records.contains_key(&key) {
            return Err(EngineError::constraint(format!(
                "key {key} already exists in store `{}`",
                self.schema.name
            )));
        }
        self.check_unique(&value, &key)?;
        let previous = self.write(key.clone(), Some(value));
        undo.push(Undo::Record {
            store: self.schema.name.clone(),
            key: key.clone(),
            previous,
        });
        Ok(key)
    }

    /// Removes every record in `range`.
    pub(crate) fn delete_range(&mut self, range: &KeyRange, undo: &mut Vec<Undo>) {
        let keys: Vec<Key> = self.records.range(range.bounds()).map(|(k, _)| k.clone()).collect();
        for key in keys {
            self.delete(key, undo);
        }
    }

    pub(crate) fn delete(&mut self, key: Key, undo: &mut Vec<Undo>) {
        if let Some(previous) = self.write(key.clone(), None) {
            undo.push(Undo::Record {
                store: self.schema.name.clone(),
                key,
                previous: Some(previous),
            });
        }
    }

    pub(crate) fn clear(&mut self, undo: &mut Vec<Undo>) {
        undo.push(Undo::Store(Box::new(self.clone())));
        self.records.clear();
        for entries in self.indexes.values_mut() {
            entries.clear();
        }
    }

    pub(crate) fn get(&self, range: &KeyRange) -> Option<&Value> {
        self.records.range(range.bounds()).next().map(|(_, v)| v)
    }

    pub(crate) fn get_all(&self, range: &KeyRange) -> Vec<Value> {
        self.records.range(range.bounds()).map(|(_, v)| v.clone()).collect()
    }

    pub(crate) fn count(&self, range: &KeyRange) -> u64 {
        self.records.range(range.bounds()).count() as u64
    }

    pub(crate) fn index_get(&self, index: &str, range: &KeyRange) -> EngineResult<Option<&Value>> {
        let entries = self.index_entries(index)?;
        let first = entries
            .range(range.bounds())
            .flat_map(|(_, pks)| pks.iter())
            .next();
        Ok(first.and_then(|pk| self.records.get(pk)))
    }

    pub(crate) fn index_get_all(&self, index: &str, range: &KeyRange) -> EngineResult<Vec<Value>> {
        let entries = self.index_entries(index)?;
        Ok(entries
            .range(range.bounds())
            .flat_map(|(_, pks)| pks.iter())
            .filter_map(|pk| self.records.get(pk).cloned())
            .collect())
    }

    pub(crate) fn index_count(&self, index: &str, range: &KeyRange) -> EngineResult<u64> {
        let entries = self.index_entries(index)?;
        Ok(entries
            .range(range.bounds())
            .map(|(_, pks)| pks.len() as u64)
            .sum())
    }

    /// Finds the entry a cursor lands on after `after` (or the first one).
    pub(crate) fn cursor_next(
        &self,
        index: Option<&str>,
        range: &KeyRange,
        after: Option<&Position>,
    ) -> EngineResult<Option<(Position, Value)>> {
        let position = match index {
            None => self.store_next(range, after),
            Some(name) => self.index_next(self.index_entries(name)?, range, after),
        };
        let Some((key, pk)) = position else {
            return Ok(None);
        };
        let value = self.records.get(&pk).cloned().ok_or_else(|| {
            EngineError::invalid_state(format!("index entry for {pk} has no record"))
        })?;
        Ok(Some(((key, pk), value)))
    }

    fn store_next(&self, range: &KeyRange, after: Option<&Position>) -> Option<Position> {
        let next = match after {
            None => self.records.range(range.bounds()).next(),
            Some((_, pk)) => self
                .records
                .range((Bound::Excluded(pk), Bound::Unbounded))
                .next(),
        };
        next.filter(|(k, _)| range.contains(k))
            .map(|(k, _)| (k.clone(), k.clone()))
    }

    fn index_next(
        &self,
        entries: &BTreeMap<Key, BTreeSet<Key>>,
        range: &KeyRange,
        after: Option<&Position>,
    ) -> Option<Position> {
        let next = match after {
            None => entries
                .range(range.bounds())
                .find_map(|(ik, pks)| pks.first().map(|pk| (ik, pk))),
            Some((ik, pk)) => entries
                .get(ik)
                .and_then(|pks| pks.range((Bound::Excluded(pk), Bound::Unbounded)).next())
                .map(|next_pk| (ik, next_pk))
                .or_else(|| {
                    entries
                        .range((Bound::Excluded(ik), Bound::Unbounded))
                        .find_map(|(ik, pks)| pks.first().map(|pk| (ik, pk)))
                }),
        };
        next.filter(|(ik, _)| range.contains(ik))
            .map(|(ik, pk)| (ik.clone(), pk.clone()))
    }

    /// Adds an index over the existing records.
    pub(crate) fn create_index(&mut self, index: IndexSchema) -> EngineResult<()> {
        let mut entries: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
        for (pk, value) in &self.records {
            if let Some(ik) = index_key(value, &index.key_path) {
                let pks = entries.entry(ik).or_default();
                if index.unique && !pks.is_empty() {
                    return Err(EngineError::constraint(format!(
                        "existing records violate unique index `{}`",
                        index.name
                    )));
                }
                pks.insert(pk.clone());
            }
        }
        self.indexes.insert(index.name.clone(), entries);
        self.schema.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    pub(crate) fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        if self.schema.indexes.remove(name).is_none() {
            return Err(EngineError::not_found(format!("no index named `{name}`")));
        }
        self.indexes.remove(name);
        Ok(())
    }

    /// Writes `value` at `key` (None removes) and returns the previous value.
    fn write(&mut self, key: Key, value: Option<Value>) -> Option<Value> {
        let previous = match value {
            Some(value) => self.records.insert(key.clone(), value),
            None => self.records.remove(&key),
        };
        if let Some(old) = &previous {
            self.unindex(old, &key);
        }
        if let Some(new) = self.records.get(&key) {
            for (name, index) in &self.schema.indexes {
                if let Some(ik) = index_key(new, &index.key_path) {
                    self.indexes
                        .entry(name.clone())
                        .or_default()
                        .entry(ik)
                        .or_default()
                        .insert(key.clone());
                }
            }
        }
        previous
    }

    fn unindex(&mut self, value: &Value, pk: &Key) {
        for (name, index) in &self.schema.indexes {
            let Some(ik) = index_key(value, &index.key_path) else {
                continue;
            };
            if let Some(entries) = self.indexes.get_mut(name) {
                if let Some(pks) = entries.get_mut(&ik) {
                    pks.remove(pk);
                    if pks.is_empty() {
                        entries.remove(&ik);
                    }
                }
            }
        }
    }

    fn assign_key(&mut self, value: &mut Value, undo: &mut Vec<Undo>) -> EngineResult<Key> {
        let explicit = match &self.schema.key_path {
            Some(path) => value.get(path).cloned(),
            None => None,
        };
        let key = match explicit {
            Some(field) => Key::new(field)?,
            None if self.schema.auto_increment => {
                let key = Key::from(self.next_key);
                if let Some(path) = &self.schema.key_path {
                    value.set(path, key.as_value().clone())?;
                }
                key
            }
            None => {
                return Err(EngineError::data(match &self.schema.key_path {
                    Some(path) => format!("record has no `{path}` field"),
                    None => "store has no key path and no key generator".to_string(),
                }))
            }
        };
        if self.schema.auto_increment {
            if let Some(n) = key.as_value().as_integer() {
                if n >= self.next_key {
                    undo.push(Undo::Generator {
                        store: self.schema.name.clone(),
                        next_key: self.next_key,
                    });
                    self.next_key = n.saturating_add(1);
                }
            }
        }
        Ok(key)
    }

    fn check_unique(&self, value: &Value, pk: &Key) -> EngineResult<()> {
        for (name, index) in self.schema.indexes.iter().filter(|(_, i)| i.unique) {
            let Some(ik) = index_key(value, &index.key_path) else {
                continue;
            };
            let taken = self
                .indexes
                .get(name)
                .and_then(|entries| entries.get(&ik))
                .is_some_and(|pks| pks.iter().any(|other| other != pk));
            if taken {
                return Err(EngineError::constraint(format!(
                    "unique index `{name}` already contains {ik}"
                )));
            }
        }
        Ok(())
    }

    fn index_entries(&self, name: &str) -> EngineResult<&BTreeMap<Key, BTreeSet<Key>>> {
        if !self.schema.indexes.contains_key(name) {
            return Err(EngineError::not_found(format!(
                "store `{}` has no index named `{name}`",
                self.schema.name
            )));
        }
        static EMPTY: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
        Ok(self.indexes.get(name).unwrap_or(&EMPTY))
    }
}

/// Extracts the index key of `value`; records without a valid key are skipped.
fn index_key(value: &Value, path: &str) -> Option<Key> {
    value.get(path).cloned().and_then(|v| Key::new(v).ok())
}
