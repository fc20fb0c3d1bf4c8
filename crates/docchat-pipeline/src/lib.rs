//! docchat-pipeline
//!
//! Wires the collaborators into the per-message chat flow and the ingestion
//! path, and provides a JSON-file document/chat store.

pub mod chat;
pub mod collaborators;
pub mod expand;
pub mod ingest;
pub mod input;
pub mod store;

pub use chat::{AnswerStatus, ChatAnswer, ChatPipeline};
pub use collaborators::Collaborators;
pub use ingest::{IngestReport, Ingestor};
pub use input::MessageInput;
pub use store::JsonFileStore;
