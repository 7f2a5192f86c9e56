//! Retrieval-augmented answering.
//!
//! This module provides:
//! - `Chunker`: two-stage document splitting with overlap
//! - `FlatIndex` + `Retriever`: embedding search over indexed passages
//! - `RagPipeline`: the full safety-gated question-answering flow

pub mod chunker;
pub mod context;
pub mod documents;
pub mod index;
pub mod pipeline;
pub mod retriever;

pub use chunker::{Chunker, Passage};
pub use index::{FlatIndex, ScoredPassage, VectorIndex};
pub use pipeline::{AnswerOutcome, RagPipeline};
pub use retriever::Retriever;
