use std::sync::Arc;

use anyhow::Result;
use im::OrdMap;
use parking_lot::{Mutex, MutexGuard};

// Keys and values are stored as `Arc<[u8]>` because various methods of `OrdMap`
// clone the elements of the map, so they should be cheaply cloneable.
type InMemoryMap = OrdMap<Arc<[u8]>, Arc<[u8]>>;

/// Implemented by typed keys that serialize to strings with a fixed prefix.
///
/// Prefixes keep the archives disjoint within one ordered keyspace.
pub trait PrefixableKey {
    const PREFIX: &'static str;

    #[must_use]
    fn has_prefix(bytes: &[u8]) -> bool {
        bytes.starts_with(Self::PREFIX.as_bytes())
    }
}

/// Ordered key-value store backing the typed archives in the `storage` crate.
///
/// The persistent storage engine is an external collaborator and its internal
/// representation is out of scope here, so the only backend is an in-memory
/// ordered map. The API mirrors what a persistent backend would provide:
/// point reads and writes, atomic batches, and ordered neighbor lookups.
pub struct Database {
    map: Mutex<InMemoryMap>,
}

impl Database {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            map: Mutex::default(),
        }
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.lock_map().contains_key(key.as_ref()))
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        Ok(self.lock_map().get(key.as_ref()).map(|value| value.to_vec()))
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_batch(core::iter::once((key, value)))
    }

    /// Inserts all pairs atomically.
    /// Concurrent readers observe either none or all of the writes.
    pub fn put_batch(
        &self,
        pairs: impl IntoIterator<Item = (impl AsRef<[u8]>, impl AsRef<[u8]>)>,
    ) -> Result<()> {
        let mut map = self.lock_map();
        let mut new_map = map.clone();

        for (key, value) in pairs {
            new_map.insert(key.as_ref().into(), value.as_ref().into());
        }

        *map = new_map;

        Ok(())
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        self.lock_map().remove(key.as_ref());
        Ok(())
    }

    /// Returns the last key-value pair whose key is less than or equal to `key`.
    ///
    /// Behaves like [`im::OrdMap::get_prev`].
    ///
    /// [`im::OrdMap::get_prev`]: https://docs.rs/im/15.1.0/im/ordmap/struct.OrdMap.html#method.get_prev
    pub fn prev(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .lock_map()
            .get_prev(key.as_ref())
            .map(|(key, value)| (key.to_vec(), value.to_vec())))
    }

    /// Returns the first key-value pair whose key is greater than or equal to `key`.
    ///
    /// Behaves like [`im::OrdMap::get_next`].
    ///
    /// [`im::OrdMap::get_next`]: https://docs.rs/im/15.1.0/im/ordmap/struct.OrdMap.html#method.get_next
    pub fn next(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .lock_map()
            .get_next(key.as_ref())
            .map(|(key, value)| (key.to_vec(), value.to_vec())))
    }

    fn lock_map(&self) -> MutexGuard<InMemoryMap> {
        self.map.lock()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_value_put_under_key() -> Result<()> {
        let database = Database::in_memory();

        database.put("abc", [1, 2, 3])?;

        assert_eq!(database.get("abc")?, Some(vec![1, 2, 3]));
        assert_eq!(database.get("abd")?, None);

        Ok(())
    }

    #[test]
    fn put_overwrites_existing_value() -> Result<()> {
        let database = Database::in_memory();

        database.put("abc", [1])?;
        database.put("abc", [2])?;

        assert_eq!(database.get("abc")?, Some(vec![2]));

        Ok(())
    }

    #[test]
    fn prev_and_next_find_ordered_neighbors() -> Result<()> {
        let database = Database::in_memory();

        database.put_batch([("a10", [10]), ("a20", [20]), ("a30", [30])])?;

        assert_eq!(
            database.prev("a25")?,
            Some((b"a20".to_vec(), vec![20])),
        );
        assert_eq!(
            database.next("a25")?,
            Some((b"a30".to_vec(), vec![30])),
        );
        assert_eq!(database.prev("a05")?, None);
        assert_eq!(database.next("a35")?, None);

        Ok(())
    }

    #[test]
    fn delete_removes_key() -> Result<()> {
        let database = Database::in_memory();

        database.put("abc", [1])?;
        database.delete("abc")?;

        assert!(!database.contains_key("abc")?);

        Ok(())
    }
}
