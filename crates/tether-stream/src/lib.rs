//! Turns a live upstream chunk feed into a bounded, terminated sequence of
//! [`StreamMessage`]s for one consumer.
//!
//! Each call to [`StreamPipeline::spawn`] starts one session task that owns the
//! upstream connection and the frame reassembler, plus a heartbeat task. Both
//! write into a bounded channel read by the returned [`MessageStream`].

mod heartbeat;
pub mod output;
pub mod pipeline;
pub mod session;

pub use output::MessageStream;
pub use pipeline::StreamPipeline;
pub use session::SessionHandle;

pub use tether_types::{SessionState, StreamConfig, StreamMessage};
