pub mod config;
pub mod events;
pub mod state;

pub use config::{ConfigError, StreamConfig};
pub use events::StreamMessage;
pub use state::{SessionState, StreamSession};
