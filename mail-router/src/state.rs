//! FSM state storage: the pluggable backing for `(module-key, sender)` ->
//! state-string. Grounded on `original_source/salmon/routing.py`'s
//! `StateStorage`/`MemoryStorage`/`ShelveStorage`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::RouterError;

/// The state every `(module-key, sender)` pair starts in. Setting a key
/// back to this value deletes its entry rather than storing it, so normal
/// conversations don't grow the store unbounded.
pub const ROUTE_FIRST_STATE: &str = "START";

/// The error state a handler's conversation is moved to when it raises.
pub const ERROR_STATE: &str = "ERROR";

/// The pluggable backing store for FSM state. Implementors must be safe to
/// call from any thread -- the router assumes this the same way
/// `RoutingBase` assumes `STATE_STORE` and handlers are thread-safe.
pub trait StateStorage: Send + Sync {
    fn get(&self, key: &str, sender: &str) -> Result<String, RouterError>;
    fn set(&self, key: &str, sender: &str, state: &str) -> Result<(), RouterError>;
    /// Clears every stored state. Used only by tests.
    fn clear(&self) -> Result<(), RouterError>;
}

/// The default storage: lost on restart, as `salmon.routing.MemoryStorage`
/// warns its users. `std::sync::Mutex` is not reentrant, so unlike
/// Python's `threading.RLock`-guarded dict, nothing in this module may call
/// back into the router while holding the lock.
#[derive(Default)]
pub struct MemoryStorage {
    states: Mutex<HashMap<(String, String), String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

impl StateStorage for MemoryStorage {
    fn get(&self, key: &str, sender: &str) -> Result<String, RouterError> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        Ok(states
            .get(&(key.to_owned(), sender.to_owned()))
            .cloned()
            .unwrap_or_else(|| ROUTE_FIRST_STATE.to_owned()))
    }

    fn set(&self, key: &str, sender: &str, state: &str) -> Result<(), RouterError> {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let map_key = (key.to_owned(), sender.to_owned());
        if state == ROUTE_FIRST_STATE {
            states.remove(&map_key);
        } else {
            states.insert(map_key, state.to_owned());
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), RouterError> {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }
}

/// Durable state storage backed by `sled`, the idiomatic-Rust analogue to
/// Python's `shelve` used by `ShelveStorage`. Keyed by a single
/// null-byte-joined `key\x00sender` string -- the Rust equivalent of
/// `repr([key, sender])`, chosen so a key or sender containing the
/// separator can never collide with a key boundary the way naive string
/// concatenation could.
pub struct PersistentStorage {
    tree: sled::Db,
}

impl PersistentStorage {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, RouterError> {
        let tree = sled::open(path).map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(PersistentStorage { tree })
    }

    fn composite_key(key: &str, sender: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(key.len() + sender.len() + 1);
        buf.extend_from_slice(key.as_bytes());
        buf.push(0);
        buf.extend_from_slice(sender.as_bytes());
        buf
    }
}

impl StateStorage for PersistentStorage {
    fn get(&self, key: &str, sender: &str) -> Result<String, RouterError> {
        let composite = Self::composite_key(key, sender);
        match self.tree.get(composite).map_err(|e| RouterError::Storage(e.to_string()))? {
            Some(value) => String::from_utf8(value.to_vec()).map_err(|e| RouterError::Storage(e.to_string())),
            None => Ok(ROUTE_FIRST_STATE.to_owned()),
        }
    }

    fn set(&self, key: &str, sender: &str, state: &str) -> Result<(), RouterError> {
        let composite = Self::composite_key(key, sender);
        if state == ROUTE_FIRST_STATE {
            self.tree.remove(composite).map_err(|e| RouterError::Storage(e.to_string()))?;
        } else {
            self.tree
                .insert(composite, state.as_bytes())
                .map_err(|e| RouterError::Storage(e.to_string()))?;
        }
        self.tree.flush().map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), RouterError> {
        self.tree.clear().map_err(|e| RouterError::Storage(e.to_string()))?;
        self.tree.flush().map_err(|e| RouterError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_defaults_to_start() {
        let store = MemoryStorage::new();
        assert_eq!(store.get("mod", "a@x").unwrap(), ROUTE_FIRST_STATE);
    }

    #[test]
    fn memory_storage_set_then_get_round_trips() {
        let store = MemoryStorage::new();
        store.set("mod", "a@x", "CONFIRM").unwrap();
        assert_eq!(store.get("mod", "a@x").unwrap(), "CONFIRM");
    }

    #[test]
    fn memory_storage_resetting_to_start_deletes_the_entry() {
        let store = MemoryStorage::new();
        store.set("mod", "a@x", "CONFIRM").unwrap();
        store.set("mod", "a@x", ROUTE_FIRST_STATE).unwrap();
        assert_eq!(store.states.lock().unwrap().len(), 0);
    }

    #[test]
    fn persistent_storage_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PersistentStorage::open(dir.path()).unwrap();
            store.set("mod", "a@x", "CONFIRM").unwrap();
        }
        let store = PersistentStorage::open(dir.path()).unwrap();
        assert_eq!(store.get("mod", "a@x").unwrap(), "CONFIRM");
    }

    #[test]
    fn composite_key_distinguishes_separator_ambiguity() {
        let a = PersistentStorage::composite_key("k", "ey");
        let b = PersistentStorage::composite_key("k\0e", "y");
        assert_ne!(a, b);
    }
}
