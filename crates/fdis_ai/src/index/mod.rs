// Nearest-neighbour search over indexed chunks.
//
// `VectorIndex` is the seam; `FlatIndex` is an exact inner-product index
// loaded once at startup and shared read-only (wrap it in an `Arc`).

use std::fs;
use std::path::Path;

use fdis_core::domain::ChunkRecord;
use fdis_core::error::AppError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;

pub mod similarity;

pub trait VectorIndex: Send + Sync {
    /// Vector dimension, when known.
    fn dims(&self) -> Option<usize>;

    /// Up to `k` records by descending similarity, each with `score` set.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ChunkRecord>, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStatus {
    pub model: String,
    pub dims: u32,
    pub chunk_count: u32,
    pub updated_at: Option<String>,
}

/// Exact inner-product index over a parallel (metadata, vector) table.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    status: IndexStatus,
    records: Vec<ChunkRecord>,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn from_parts(
        model: &str,
        records: Vec<ChunkRecord>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, AppError> {
        if records.len() != vectors.len() {
            return Err(AppError::new(
                "INDEX_LOAD_FAILED",
                "Index metadata and vectors are not parallel",
            )
            .with_details(format!("records={}; vectors={}", records.len(), vectors.len())));
        }
        let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
        for (record, v) in records.iter().zip(vectors.iter()) {
            if v.len() != dims {
                return Err(AppError::new("INDEX_LOAD_FAILED", "Index vector dims mismatch")
                    .with_details(format!("chunk_id={}; expected={dims}; got={}", record.id, v.len())));
            }
        }
        let status = IndexStatus {
            model: model.to_string(),
            dims: dims as u32,
            chunk_count: records.len() as u32,
            updated_at: None,
        };
        Ok(Self {
            status,
            records,
            vectors,
        })
    }

    /// Load `index_status.json`, `metadata.json` and `vectors.json` from `dir`.
    pub fn open(dir: &Path) -> Result<Self, AppError> {
        let status: IndexStatus = read_json(&dir.join(STATUS_FILE))?;
        let records: Vec<ChunkRecord> = read_json(&dir.join(METADATA_FILE))?;
        let vectors: Vec<Vec<f32>> = read_json(&dir.join(VECTORS_FILE))?;

        let mut index = Self::from_parts(&status.model, records, vectors)?;
        if !index.records.is_empty() && index.status.dims != status.dims {
            return Err(AppError::new(
                "INDEX_LOAD_FAILED",
                "Index status dims do not match stored vectors",
            )
            .with_details(format!("status_dims={}; vector_dims={}", status.dims, index.status.dims)));
        }
        index.status.dims = status.dims;
        index.status.updated_at = status.updated_at;
        info!(
            path = %dir.display(),
            chunks = index.records.len(),
            dims = index.status.dims,
            model = %index.status.model,
            "vector index loaded"
        );
        Ok(index)
    }

    /// Write the index to `dir`; each file is written to a tmp name then renamed.
    pub fn save(&self, dir: &Path) -> Result<(), AppError> {
        fs::create_dir_all(dir).map_err(|e| {
            AppError::new("INDEX_WRITE_FAILED", "Failed to create index directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        })?;
        write_json(&dir.join(METADATA_FILE), &self.records)?;
        write_json(&dir.join(VECTORS_FILE), &self.vectors)?;
        // Status last: a readable status implies complete tables.
        write_json(&dir.join(STATUS_FILE), &self.status)?;
        Ok(())
    }

    pub fn with_updated_at(mut self, updated_at: impl Into<String>) -> Self {
        self.status.updated_at = Some(updated_at.into());
        self
    }

    pub fn status(&self) -> &IndexStatus {
        &self.status
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl VectorIndex for FlatIndex {
    fn dims(&self) -> Option<usize> {
        (!self.records.is_empty()).then_some(self.status.dims as usize)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ChunkRecord>, AppError> {
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.status.dims as usize {
            return Err(AppError::new(
                "INDEX_SEARCH_FAILED",
                "Query embedding dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", self.status.dims, query.len())));
        }

        let mut hits: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, similarity::dot(query, v)))
            .collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.records[a.0].id.cmp(&self.records[b.0].id))
        });
        hits.truncate(k);

        Ok(hits
            .into_iter()
            .map(|(i, score)| self.records[i].clone().with_score(score))
            .collect())
    }
}

const STATUS_FILE: &str = "index_status.json";
const METADATA_FILE: &str = "metadata.json";
const VECTORS_FILE: &str = "vectors.json";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::new("INDEX_LOAD_FAILED", "Failed to read index file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::new("INDEX_LOAD_FAILED", "Failed to decode index file")
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec(value).map_err(|e| {
        AppError::new("INDEX_WRITE_FAILED", "Failed to encode index file")
            .with_details(e.to_string())
    })?;
    fs::write(&tmp, json).map_err(|e| {
        AppError::new("INDEX_WRITE_FAILED", "Failed to write index file")
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new("INDEX_WRITE_FAILED", "Failed to finalize index file write")
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}
