use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::PathBuf,
};

use anyhow::Context;
use purifier_common::store::{KvStore, KvValue, StoreError};

/// File-backed [`KvStore`]: one JSON document per namespace, committed with a
/// write-then-rename so a later load never observes half a batch.
#[derive(Debug, Clone)]
pub struct FsKvStore {
    root: PathBuf,
}

impl FsKvStore {
    pub fn open(root: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create store directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn open_from_env() -> anyhow::Result<Self> {
        let root = std::env::var("PURIFIER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.purifier"));
        Self::open(root)
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.root.join(format!("{namespace}.json"))
    }

    fn load_namespace(
        &self,
        namespace: &str,
    ) -> Result<BTreeMap<String, serde_json::Value>, StoreError> {
        match fs::read(self.namespace_path(namespace)) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|err| StoreError::Read {
                namespace: namespace.to_string(),
                detail: err.to_string(),
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(StoreError::Read {
                namespace: namespace.to_string(),
                detail: err.to_string(),
            }),
        }
    }
}

impl KvStore for FsKvStore {
    fn read(&self, namespace: &str, key: &str) -> Result<Option<KvValue>, StoreError> {
        let entries = self.load_namespace(namespace)?;
        Ok(entries.get(key).and_then(from_json))
    }

    fn write_batch(
        &mut self,
        namespace: &str,
        entries: &[(&str, KvValue)],
    ) -> Result<(), StoreError> {
        let write_error = |detail: String| StoreError::Write {
            namespace: namespace.to_string(),
            detail,
        };

        let mut current = self.load_namespace(namespace)?;
        for (key, value) in entries {
            current.insert((*key).to_string(), to_json(value));
        }

        let payload =
            serde_json::to_vec_pretty(&current).map_err(|err| write_error(err.to_string()))?;
        let path = self.namespace_path(namespace);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload).map_err(|err| write_error(err.to_string()))?;
        fs::rename(&tmp, &path).map_err(|err| write_error(err.to_string()))?;
        Ok(())
    }
}

fn to_json(value: &KvValue) -> serde_json::Value {
    match value {
        KvValue::U8(value) => serde_json::Value::from(*value),
        KvValue::Str(value) => serde_json::Value::from(value.as_str()),
    }
}

fn from_json(value: &serde_json::Value) -> Option<KvValue> {
    match value {
        serde_json::Value::Number(number) => number
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .map(KvValue::U8),
        serde_json::Value::String(text) => Some(KvValue::Str(text.clone())),
        _ => None,
    }
}
