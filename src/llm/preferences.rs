use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MODEL_KEY: &str = "OLLAMA_MODEL";
pub const API_URL_KEY: &str = "OLLAMA_API_URL";

/// Key-value store for settings that outlive one process
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;
}

/// `KEY=VALUE` file, one entry per line
#[derive(Debug, Clone)]
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Vec<(String, String)> {
        std::fs::read_to_string(&self.path)
            .map(|content| parse_env(&content))
            .unwrap_or_default()
    }
}

impl PreferenceStore for EnvFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_entries()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let mut entries = self.read_entries();
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content: String = entries
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect();
        std::fs::write(&self.path, content)
    }
}

fn parse_env(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// In-process store, for tests and callers that opt out of persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| std::io::Error::other("preference store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
