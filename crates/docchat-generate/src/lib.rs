//! docchat-generate
//!
//! Answer generation: HTTP backends, the streaming parse state machine, the
//! primary/secondary failover orchestrator, prompt construction and decoding
//! of JSON embedded in free-text replies.

pub mod backend;
pub mod decode;
pub mod orchestrator;
pub mod prompt;
pub mod stream;

pub use backend::HttpBackend;
pub use decode::{decode_reply, DecodeStep, Decoded};
pub use orchestrator::Orchestrator;
pub use prompt::PromptContext;
pub use stream::{consume, StreamEvent, StreamParser, StreamState, StreamedReply};
