//! docchat-text
//!
//! Lexical side of retrieval: a tantivy text analyzer shared by indexing and
//! querying, and per-document keyword scoring over a chunk set.

pub mod analyzer;
pub mod keyword;

pub use analyzer::{build_analyzer, query_terms, tokenize};
pub use keyword::{KeywordHit, KeywordIndex};
