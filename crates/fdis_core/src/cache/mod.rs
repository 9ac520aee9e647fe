// Memo of generator outputs keyed by prompt digest.
//
// Entries never expire. The key covers the full rendered prompt (question and
// evidence), the model and the sampling parameters, so a changed prompt
// template or evidence set is a new key. Racing writers of one key each
// publish a complete entry; the last one wins.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::domain::GeneratedAnswer;
use crate::error::AppError;

pub mod key;
pub mod sqlite;

pub use key::{GenerationParams, PromptCacheKey};
pub use sqlite::SqliteAnswerCache;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedAnswer {
    pub key: PromptCacheKey,
    pub model: String,
    pub result: GeneratedAnswer,
    pub created_at: String, // RFC3339
}

impl CachedAnswer {
    pub fn new(key: PromptCacheKey, model: &str, result: GeneratedAnswer) -> Self {
        Self {
            key,
            model: model.to_string(),
            result,
            created_at: now_rfc3339_utc(),
        }
    }
}

fn now_rfc3339_utc() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub trait AnswerCache: Send + Sync {
    fn get(&self, key: &PromptCacheKey) -> Result<Option<CachedAnswer>, AppError>;
    fn put(&self, entry: &CachedAnswer) -> Result<(), AppError>;
}

/// Process-local cache. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryAnswerCache {
    entries: RwLock<HashMap<PromptCacheKey, CachedAnswer>>,
}

impl MemoryAnswerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AnswerCache for MemoryAnswerCache {
    fn get(&self, key: &PromptCacheKey) -> Result<Option<CachedAnswer>, AppError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, entry: &CachedAnswer) -> Result<(), AppError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }
}

/// One JSON file per digest under `root`.
#[derive(Debug, Clone)]
pub struct FileAnswerCache {
    root: PathBuf,
}

impl FileAnswerCache {
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn entry_path(&self, key: &PromptCacheKey) -> PathBuf {
        self.root.join(format!("{}.json", key.as_str()))
    }

    fn ensure_dirs(&self) -> Result<(), AppError> {
        fs::create_dir_all(self.root.as_path()).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to create answer cache directory")
                .with_details(format!("path={}; err={}", self.root.display(), e))
        })
    }
}

impl AnswerCache for FileAnswerCache {
    fn get(&self, key: &PromptCacheKey) -> Result<Option<CachedAnswer>, AppError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to read answer cache entry")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let entry: CachedAnswer = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to decode answer cache entry")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Ok(Some(entry))
    }

    fn put(&self, entry: &CachedAnswer) -> Result<(), AppError> {
        self.ensure_dirs()?;
        let path = self.entry_path(&entry.key);
        let json = serde_json::to_vec_pretty(entry).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to encode answer cache entry")
                .with_details(e.to_string())
        })?;
        // Each writer fills its own temp file; the rename publishes a complete entry.
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to create answer cache temp file")
                .with_details(format!("dir={}; err={}", self.root.display(), e))
        })?;
        tmp.write_all(&json).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to write answer cache entry")
                .with_details(format!("path={}; err={}", tmp.path().display(), e))
        })?;
        tmp.persist(&path).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to finalize answer cache entry write")
                .with_details(format!("dest={}; err={}", path.display(), e.error))
        })?;
        Ok(())
    }
}
