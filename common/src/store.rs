use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvValue {
    U8(u8),
    Str(String),
}

impl KvValue {
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Self::U8(value) => Some(*value),
            Self::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::U8(_) => None,
            Self::Str(value) => Some(value),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read `{namespace}` from the durable store: {detail}")]
    Read { namespace: String, detail: String },
    #[error("failed to commit `{namespace}` to the durable store: {detail}")]
    Write { namespace: String, detail: String },
}

/// Namespaced durable key/value map. Backends are expected to survive
/// restarts; the node ships a file-backed one and tests use [`MemoryStore`].
pub trait KvStore {
    fn read(&self, namespace: &str, key: &str) -> Result<Option<KvValue>, StoreError>;

    /// Commits every entry or none of them. A failed batch must not leave a
    /// subset of the entries visible to a later `read`.
    fn write_batch(&mut self, namespace: &str, entries: &[(&str, KvValue)])
        -> Result<(), StoreError>;

    fn read_u8(&self, namespace: &str, key: &str) -> Result<Option<u8>, StoreError> {
        Ok(self.read(namespace, key)?.and_then(|value| value.as_u8()))
    }

    fn read_string(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .read(namespace, key)?
            .and_then(|value| value.as_str().map(str::to_string)))
    }
}

/// In-memory backend with optional write-failure injection.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<(String, String), KvValue>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl KvStore for MemoryStore {
    fn read(&self, namespace: &str, key: &str) -> Result<Option<KvValue>, StoreError> {
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn write_batch(
        &mut self,
        namespace: &str,
        entries: &[(&str, KvValue)],
    ) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Write {
                namespace: namespace.to_string(),
                detail: "injected write failure".to_string(),
            });
        }

        for (key, value) in entries {
            self.entries
                .insert((namespace.to_string(), (*key).to_string()), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_back_written_values() {
        let mut store = MemoryStore::new();
        store
            .write_batch(
                "ns",
                &[
                    ("flag", KvValue::U8(1)),
                    ("name", KvValue::Str("node".to_string())),
                ],
            )
            .unwrap();

        assert_eq!(store.read_u8("ns", "flag").unwrap(), Some(1));
        assert_eq!(
            store.read_string("ns", "name").unwrap(),
            Some("node".to_string())
        );
        assert_eq!(store.read("ns", "missing").unwrap(), None);
        assert_eq!(store.read("other", "flag").unwrap(), None);
    }

    #[test]
    fn injected_failure_leaves_previous_values_visible() {
        let mut store = MemoryStore::new();
        store
            .write_batch("ns", &[("flag", KvValue::U8(1))])
            .unwrap();

        store.fail_writes(true);
        assert!(store
            .write_batch("ns", &[("flag", KvValue::U8(0))])
            .is_err());

        store.fail_writes(false);
        assert_eq!(store.read_u8("ns", "flag").unwrap(), Some(1));
    }
}
