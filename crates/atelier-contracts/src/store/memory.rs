use std::collections::BTreeMap;

use anyhow::bail;
use serde_json::Value;

use super::KeyValueStore;

/// In-process store. Can be told to fail reads or writes so callers' error
/// swallowing can be exercised.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
    fail_reads: bool,
    fail_writes: bool,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, value: Value) -> Self {
        self.entries.insert(key.to_string(), value);
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&mut self, key: &str) -> anyhow::Result<Option<Value>> {
        if self.fail_reads {
            bail!("memory store read of '{key}' refused");
        }
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        if self.fail_writes {
            bail!("memory store write of '{key}' refused");
        }
        self.entries.insert(key.to_string(), value);
        self.writes += 1;
        Ok(())
    }
}
