pub mod buffer_utils;
pub mod error;
pub mod openrouter;
pub mod streaming;
pub mod traits;
pub mod types;

pub use buffer_utils::{decode_lines, FrameReassembler, LineBuffer, DONE_SENTINEL, MAX_PARTIAL_BYTES};
pub use error::TransportError;
pub use openrouter::{OpenRouterClient, OpenRouterClientBuilder};
pub use streaming::{classify, extract, Extraction, LogicalEvent};
pub use traits::{ChatOptions, ChunkStream, RawChunk, StreamRequest, UpstreamTransport};
pub use types::Message;
