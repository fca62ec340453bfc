//! Text preparation: document extraction and sentence-aware chunking.

pub mod chunker;
pub mod extract;

pub use chunker::{chunk_text, normalize_whitespace, Chunk, ChunkPlan, ChunkingAnomaly};
pub use extract::{apply_start_offset, extract_text, ExtractionError};
