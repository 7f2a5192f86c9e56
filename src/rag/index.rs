use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::core::errors::ApiError;
use crate::rag::chunker::Passage;

const INDEX_MAGIC: [u8; 4] = *b"PDIX";
const INDEX_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

pub const VECTORS_FILE: &str = "index.bin";
pub const PASSAGES_FILE: &str = "passages.json";

#[derive(Debug, Clone, Serialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

/// Brute-force inner-product index. Callers insert L2-normalized vectors, so
/// inner product equals cosine similarity. The metric is fixed for the life
/// of the handle.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;
    async fn count(&self) -> usize;
    async fn add(&self, items: Vec<(Passage, Vec<f32>)>) -> Result<usize, ApiError>;
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, ApiError>;
    async fn clear(&self) -> Result<(), ApiError>;
}

#[derive(Default)]
struct IndexState {
    // row-major, `dimension` floats per passage
    vectors: Vec<f32>,
    passages: Vec<Passage>,
}

struct IndexFiles {
    vectors: PathBuf,
    passages: PathBuf,
}

pub struct FlatIndex {
    dimension: usize,
    model: String,
    files: Option<IndexFiles>,
    state: RwLock<IndexState>,
}

#[derive(Serialize)]
struct SidecarOut<'a> {
    model: &'a str,
    dimension: usize,
    passages: &'a [Passage],
}

#[derive(Deserialize)]
struct SidecarIn {
    model: String,
    dimension: usize,
    passages: Vec<Passage>,
}

impl FlatIndex {
    pub fn in_memory(dimension: usize, model: &str) -> Self {
        FlatIndex {
            dimension,
            model: model.to_string(),
            files: None,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Opens a disk-backed index under `dir`, loading any previously saved
    /// state. The vector file and its sidecar must load together and agree;
    /// anything else starts empty with a warning.
    pub fn persistent(dir: &Path, dimension: usize, model: &str) -> Self {
        let files = IndexFiles {
            vectors: dir.join(VECTORS_FILE),
            passages: dir.join(PASSAGES_FILE),
        };
        let state = match load_state(&files, dimension, model) {
            Ok(Some(state)) => {
                info!(
                    "loaded vector index: {} passages from {}",
                    state.passages.len(),
                    dir.display()
                );
                state
            }
            Ok(None) => IndexState::default(),
            Err(err) => {
                warn!("could not load vector index ({}), starting empty", err);
                IndexState::default()
            }
        };
        FlatIndex {
            dimension,
            model: model.to_string(),
            files: Some(files),
            state: RwLock::new(state),
        }
    }

    fn persist(&self, state: &IndexState) -> anyhow::Result<()> {
        let Some(files) = &self.files else {
            return Ok(());
        };

        let mut buf = Vec::with_capacity(HEADER_LEN + state.vectors.len() * 4);
        buf.extend_from_slice(&INDEX_MAGIC);
        buf.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buf.extend_from_slice(&(state.passages.len() as u64).to_le_bytes());
        for value in &state.vectors {
            buf.extend_from_slice(&value.to_le_bytes());
        }

        let sidecar = serde_json::to_vec(&SidecarOut {
            model: &self.model,
            dimension: self.dimension,
            passages: &state.passages,
        })?;

        // temp-then-rename keeps the live pair readable if a write dies
        let vectors_tmp = files.vectors.with_extension("bin.tmp");
        fs::write(&vectors_tmp, &buf)?;
        fs::rename(&vectors_tmp, &files.vectors)?;

        let passages_tmp = files.passages.with_extension("json.tmp");
        fs::write(&passages_tmp, &sidecar)?;
        fs::rename(&passages_tmp, &files.passages)?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn count(&self) -> usize {
        self.state.read().await.passages.len()
    }

    async fn add(&self, items: Vec<(Passage, Vec<f32>)>) -> Result<usize, ApiError> {
        for (_, vector) in &items {
            if vector.len() != self.dimension {
                return Err(ApiError::BadRequest(format!(
                    "Embedding dimension mismatch: {} vs {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }

        let mut state = self.state.write().await;
        let added = items.len();
        for (passage, vector) in items {
            state.vectors.extend_from_slice(&vector);
            state.passages.push(passage);
        }

        // in-memory state stays authoritative when the save fails
        if let Err(err) = self.persist(&state) {
            warn!("failed to persist vector index: {}", err);
        }
        Ok(added)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, ApiError> {
        if query.len() != self.dimension {
            return Err(ApiError::BadRequest(format!(
                "Embedding dimension mismatch: {} vs {}",
                query.len(),
                self.dimension
            )));
        }

        let state = self.state.read().await;
        if state.passages.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredPassage> = state
            .vectors
            .chunks_exact(self.dimension)
            .zip(state.passages.iter())
            .map(|(vector, passage)| ScoredPassage {
                passage: passage.clone(),
                score: dot(vector, query),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn clear(&self) -> Result<(), ApiError> {
        let mut state = self.state.write().await;
        *state = IndexState::default();
        if let Some(files) = &self.files {
            let _ = fs::remove_file(&files.vectors);
            let _ = fs::remove_file(&files.passages);
        }
        Ok(())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn load_state(
    files: &IndexFiles,
    dimension: usize,
    model: &str,
) -> anyhow::Result<Option<IndexState>> {
    let have_vectors = files.vectors.exists();
    let have_passages = files.passages.exists();
    if !have_vectors && !have_passages {
        return Ok(None);
    }
    if have_vectors != have_passages {
        bail!("vector file and sidecar are out of sync");
    }

    let bytes = fs::read(&files.vectors).context("reading vector file")?;
    if bytes.len() < HEADER_LEN {
        bail!("vector file truncated");
    }
    if bytes[0..4] != INDEX_MAGIC {
        bail!("vector file has wrong magic");
    }
    let version = u32::from_le_bytes(bytes[4..8].try_into()?);
    if version != INDEX_VERSION {
        bail!("unsupported index version {}", version);
    }
    let file_dim = u32::from_le_bytes(bytes[8..12].try_into()?) as usize;
    if file_dim != dimension {
        bail!("index dimension {} does not match configured {}", file_dim, dimension);
    }
    let count = u64::from_le_bytes(bytes[12..HEADER_LEN].try_into()?) as usize;
    let expected = HEADER_LEN + count * dimension * 4;
    if bytes.len() != expected {
        bail!("vector file length {} does not match header", bytes.len());
    }

    let sidecar: SidecarIn =
        serde_json::from_slice(&fs::read(&files.passages).context("reading sidecar")?)
            .context("parsing sidecar")?;
    if sidecar.dimension != dimension {
        bail!("sidecar dimension {} does not match configured {}", sidecar.dimension, dimension);
    }
    if sidecar.model != model {
        bail!("index was built with embedding model {}, configured {}", sidecar.model, model);
    }
    if sidecar.passages.len() != count {
        bail!("sidecar holds {} passages, vector file {}", sidecar.passages.len(), count);
    }

    let vectors = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(Some(IndexState {
        vectors,
        passages: sidecar.passages,
    }))
}
