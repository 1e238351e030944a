//! Key-value persistence port.
//!
//! The gallery and the theme controller never touch the filesystem
//! directly; they read and write whole values through [`KeyValueStore`].
//! [`FileStore`] is the durable implementation, [`MemoryStore`] backs
//! tests and ephemeral sessions.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde_json::Value;

pub trait KeyValueStore {
    /// Returns the value stored under `key`, or `None` when nothing was
    /// ever written there.
    fn read(&mut self, key: &str) -> anyhow::Result<Option<Value>>;

    /// Replaces the value stored under `key`.
    fn write(&mut self, key: &str, value: Value) -> anyhow::Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn read(&mut self, key: &str) -> anyhow::Result<Option<Value>> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        (**self).write(key, value)
    }
}
