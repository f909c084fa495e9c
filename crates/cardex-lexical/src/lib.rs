//! cardex-lexical
//!
//! Tantivy-backed in-memory BM25 ranking over record text. See [`index`]
//! for the build/refresh lifecycle and the determinism guarantees.

pub mod index;
pub mod tantivy_utils;

pub use index::LexicalIndex;
