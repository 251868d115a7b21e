use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::anyhow;
use directories::ProjectDirs;

use crate::Result;

/// Injected key-value store, the only durable state this crate touches.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Durable storage backed by a JSON map on disk. The file is created on
/// first use.
pub struct FileStorage {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: &Path) -> Result<Self> {
        let map = if path.exists() {
            let mut file = File::open(path)?;
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            serde_json::from_str(&contents)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            HashMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            map: Mutex::new(map),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "roulette-client")
            .ok_or_else(|| anyhow!("no home directory"))?;
        Ok(dirs.data_dir().join("storage.json"))
    }

    fn persist(&self, map: &HashMap<String, String>) -> Result<()> {
        let mut file = File::create(&self.path)?;
        file.write_all(serde_json::to_string_pretty(map)?.as_bytes())?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().map_err(|_| anyhow!("storage poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| anyhow!("storage poisoned"))?;
        map.insert(key.to_string(), value.to_string());
        self.persist(&map)
    }
}

/// In-memory storage. Stands in for session-lifetime browser storage and
/// for durable storage in tests.
#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().map_err(|_| anyhow!("storage poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| anyhow!("storage poisoned"))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trips() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").unwrap(), None);
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("roulette-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("storage.json");
        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set("visitor_count", "7").unwrap();
        }
        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(
            storage.get("visitor_count").unwrap(),
            Some("7".to_string())
        );
        std::fs::remove_dir_all(dir).unwrap();
    }
}
