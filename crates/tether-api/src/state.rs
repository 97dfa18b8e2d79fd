use crate::config::Config;
use std::sync::Arc;
use tether_stream::StreamPipeline;

/// Shared application state passed to all handlers
///
/// The pipeline holds no per-session state and is created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<StreamPipeline>,
}

impl AppState {
    pub fn new(config: Config, pipeline: StreamPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}
