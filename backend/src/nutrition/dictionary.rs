use shared::NutritionRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Process-wide food name -> nutrition map, keyed case-insensitively.
///
/// Loaded once at startup from the base data file overlaid with previously
/// learned records; flushed back to `persist_path` whenever a record is added.
pub struct NutritionDictionary {
    entries: RwLock<HashMap<String, NutritionRecord>>,
    persist_path: Option<PathBuf>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl NutritionDictionary {
    pub fn new(entries: HashMap<String, NutritionRecord>, persist_path: Option<PathBuf>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(name, record)| (normalize_key(&name), record))
            .collect();
        Self {
            entries: RwLock::new(entries),
            persist_path,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(HashMap::new(), None)
    }

    /// Missing or unreadable files are logged and contribute nothing.
    pub fn load(base_path: &Path, cache_path: &Path) -> Self {
        let mut entries = HashMap::new();
        match read_records(base_path) {
            Ok(Some(base)) => entries.extend(base),
            Ok(None) => log::warn!("Nutrition data file {} not found", base_path.display()),
            Err(e) => log::error!("Error loading nutrition database: {}", e),
        }
        match read_records(cache_path) {
            Ok(Some(learned)) => entries.extend(learned),
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring unreadable nutrition cache: {}", e),
        }
        log::info!("Nutrition dictionary loaded with {} foods", entries.len());
        Self::new(entries, Some(cache_path.to_path_buf()))
    }

    pub fn get(&self, food_name: &str) -> Option<NutritionRecord> {
        let key = normalize_key(food_name);
        match self.entries.read() {
            Ok(entries) => entries.get(&key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&key).cloned(),
        }
    }

    pub fn insert(&self, food_name: &str, record: NutritionRecord) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(normalize_key(food_name), record);
    }

    /// Foods whose name contains `query`, ignoring case, ordered by name.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, NutritionRecord)> {
        let needle = normalize_key(query);
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut hits: Vec<(String, NutritionRecord)> = entries
            .iter()
            .filter(|(name, _)| name.contains(&needle))
            .map(|(name, record)| (name.clone(), record.clone()))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0));
        hits.truncate(limit);
        hits
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes a snapshot of the dictionary; flushes never interleave.
    pub async fn flush(&self) -> Result<(), DictionaryError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        let snapshot = {
            let entries = match self.entries.read() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            serde_json::to_vec_pretty(&*entries)?
        };

        let io_err = |source| DictionaryError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, snapshot).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
        Ok(())
    }
}

fn normalize_key(food_name: &str) -> String {
    food_name.trim().to_lowercase()
}

fn read_records(path: &Path) -> Result<Option<HashMap<String, NutritionRecord>>, DictionaryError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(DictionaryError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Ok(Some(serde_json::from_str(&contents)?))
}
