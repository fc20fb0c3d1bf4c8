//! docchat-hybrid
//!
//! Retrieval side of the chat pipeline: the hybrid combiner (semantic,
//! advanced and keyword sources, weighted merge, fallback ladder, optional
//! reranking), the multimodal ranking extension, and the context assembler.

pub mod combiner;
pub mod context;
pub mod ladder;
pub mod merge;
pub mod multimodal;
pub mod query;
pub mod rerank;

pub use combiner::{DocumentView, HybridRetriever, Retrieval, RetrievalRequest};
pub use context::{assemble, assemble_multimodal, AssembledContext};
pub use ladder::LadderRung;
pub use multimodal::{collect_links, MultimodalRetrieval, MultimodalRetriever};
pub use query::{analyze, QueryAnalysis};
