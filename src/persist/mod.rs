use crate::error::KvError;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Minimal durable key-value record for small cross-restart state.
///
/// The checkpoint subsystem stores exactly one value here today (the last
/// autosave slot used); the interface stays narrow on purpose. Values live
/// outside the checkpoint directories, so they survive checkpoint loads.
pub trait DurableKv: Send + Sync {
    fn get_i64(&self, key: &str, default: i64) -> Result<i64, KvError>;
    fn put_i64(&self, key: &str, value: i64) -> Result<(), KvError>;
}

/// TOML-file-backed record. Each operation is a read-modify-write of a small
/// table; callers are the single-threaded command path, so no cross-process
/// locking is attempted.
pub struct TomlKv {
    path: PathBuf,
}

impl TomlKv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_table(&self) -> Result<toml::Table, KvError> {
        if !self.path.exists() {
            return Ok(toml::Table::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        toml::from_str(&contents).map_err(|e| KvError::Parse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl DurableKv for TomlKv {
    fn get_i64(&self, key: &str, default: i64) -> Result<i64, KvError> {
        match self.load_table()?.get(key) {
            None => Ok(default),
            Some(toml::Value::Integer(v)) => Ok(*v),
            Some(_) => Err(KvError::WrongType { key: key.into() }),
        }
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<(), KvError> {
        let mut table = self.load_table()?;
        table.insert(key.into(), toml::Value::Integer(value));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string(&table).map_err(|e| KvError::Parse {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// In-memory record for tests and embedded use. Nothing survives the
/// process.
#[derive(Default)]
pub struct MemoryKv {
    map: Mutex<BTreeMap<String, i64>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableKv for MemoryKv {
    fn get_i64(&self, key: &str, default: i64) -> Result<i64, KvError> {
        let map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(key).copied().unwrap_or(default))
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<(), KvError> {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key.into(), value);
        Ok(())
    }
}
