use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{AnswerCache, CachedAnswer, PromptCacheKey};
use crate::db;
use crate::domain::GeneratedAnswer;
use crate::error::AppError;

/// Answer cache backed by the `answer_cache` table.
pub struct SqliteAnswerCache {
    conn: Mutex<Connection>,
}

impl SqliteAnswerCache {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut conn = db::open(path)?;
        db::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut conn = db::open_in_memory()?;
        db::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn count(&self) -> Result<u64, AppError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row("SELECT COUNT(*) FROM answer_cache", [], |r| r.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| {
                AppError::new("CACHE_IO_FAILED", "Failed to count answer cache rows")
                    .with_details(e.to_string())
            })
    }
}

impl AnswerCache for SqliteAnswerCache {
    fn get(&self, key: &PromptCacheKey) -> Result<Option<CachedAnswer>, AppError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT model, payload_json, created_at FROM answer_cache WHERE cache_key = ?1",
                [key.as_str()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .map_err(|e| {
                AppError::new("CACHE_IO_FAILED", "Failed to read answer cache row")
                    .with_details(format!("key={key}; err={e}"))
            })?;

        let Some((model, payload, created_at)) = row else {
            return Ok(None);
        };
        let result: GeneratedAnswer = serde_json::from_str(&payload).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to decode answer cache row")
                .with_details(format!("key={key}; err={e}"))
        })?;
        Ok(Some(CachedAnswer {
            key: key.clone(),
            model,
            result,
            created_at,
        }))
    }

    fn put(&self, entry: &CachedAnswer) -> Result<(), AppError> {
        let payload = serde_json::to_string(&entry.result).map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to encode answer cache row")
                .with_details(e.to_string())
        })?;
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR REPLACE INTO answer_cache(cache_key, model, payload_json, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![entry.key.as_str(), entry.model, payload, entry.created_at],
        )
        .map_err(|e| {
            AppError::new("CACHE_IO_FAILED", "Failed to write answer cache row")
                .with_details(format!("key={}; err={}", entry.key, e))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GenerationParams;
    use crate::domain::AnswerOutcome;
    use pretty_assertions::assert_eq;

    #[test]
    fn stores_and_replaces_by_key() {
        let cache = SqliteAnswerCache::open_in_memory().expect("open");
        let key = PromptCacheKey::compute("prompt", "m", &GenerationParams::default());
        let refused = CachedAnswer::new(key.clone(), "m", GeneratedAnswer::refusal(AnswerOutcome::Refused));
        cache.put(&refused).expect("put");
        assert_eq!(cache.get(&key).expect("get"), Some(refused));

        let answered = CachedAnswer::new(
            key.clone(),
            "m",
            GeneratedAnswer {
                answer: "HSBC flagged interest rate risk.".to_string(),
                sources: None,
                outcome: AnswerOutcome::Answered,
            },
        );
        cache.put(&answered).expect("replace");
        assert_eq!(cache.get(&key).expect("get"), Some(answered));
        assert_eq!(cache.count().expect("count"), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("answers.db");
        let key = PromptCacheKey::compute("prompt", "m", &GenerationParams::default());
        let entry = CachedAnswer::new(key.clone(), "m", GeneratedAnswer::refusal(AnswerOutcome::Refused));
        SqliteAnswerCache::open(&path).expect("open").put(&entry).expect("put");
        let reopened = SqliteAnswerCache::open(&path).expect("reopen");
        assert_eq!(reopened.get(&key).expect("get"), Some(entry));
    }
}
