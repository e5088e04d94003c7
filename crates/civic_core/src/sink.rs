//! Persistence sink interface.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::error::PersistError;
use crate::schema::{NaturalKey, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    /// Inserted, or replaced a differing record with the same natural key.
    Stored,
    /// An identical record was already stored under this natural key.
    Unchanged,
}

/// Accepts one validated record at a time. Must be idempotent on identical
/// records with the same natural key.
pub trait Sink {
    fn persist(&mut self, record: &Record) -> Result<Ack, PersistError>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn persist(&mut self, record: &Record) -> Result<Ack, PersistError> {
        (**self).persist(record)
    }
}

/// Shared sink for concurrent passes; the lock serializes writes.
impl<S: Sink> Sink for &Mutex<S> {
    fn persist(&mut self, record: &Record) -> Result<Ack, PersistError> {
        let mut guard = self
            .lock()
            .map_err(|_| PersistError::new("sink lock poisoned"))?;
        guard.persist(record)
    }
}

/// Keeps records in memory, in the order they were first stored.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<Record>,
    index: HashMap<NaturalKey, usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &NaturalKey) -> Option<&Record> {
        self.index.get(key).map(|&i| &self.records[i])
    }
}

impl Sink for MemorySink {
    fn persist(&mut self, record: &Record) -> Result<Ack, PersistError> {
        let key = record.natural_key();
        match self.index.get(&key) {
            Some(&i) if self.records[i] == *record => Ok(Ack::Unchanged),
            Some(&i) => {
                self.records[i] = record.clone();
                Ok(Ack::Stored)
            }
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record.clone());
                Ok(Ack::Stored)
            }
        }
    }
}
