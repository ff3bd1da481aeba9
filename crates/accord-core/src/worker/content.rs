use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::models::{CoreError, CoreErrorKind};

pub type ContentResult<T> = Result<T, CoreError>;

/// Content-addressed blob storage, keyed by lowercase hex sha-256.
pub trait ContentStore: Send + Sync {
    fn get(&self, hash: &str) -> ContentResult<String>;

    fn put(&self, content: &str) -> ContentResult<String>;
}

pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

pub fn is_content_hash(value: &str) -> bool {
    value.len() == 64
        && value
            .bytes()
            .all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
}

#[derive(Default)]
pub struct MemoryContentStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContentStore for MemoryContentStore {
    fn get(&self, hash: &str) -> ContentResult<String> {
        let entries = self.entries.lock().map_err(|_| store_poisoned())?;
        entries
            .get(hash)
            .cloned()
            .ok_or_else(|| missing_content(hash))
    }

    fn put(&self, content: &str) -> ContentResult<String> {
        let hash = content_hash(content);
        let mut entries = self.entries.lock().map_err(|_| store_poisoned())?;
        entries.insert(hash.clone(), content.to_string());
        Ok(hash)
    }
}

fn missing_content(hash: &str) -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::NotFound,
        message: format!("no content stored under hash '{hash}'"),
    }
}

fn store_poisoned() -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Internal,
        message: "content store mutex poisoned".to_string(),
    }
}
