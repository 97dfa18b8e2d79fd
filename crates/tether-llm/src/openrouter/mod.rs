pub mod client;

pub use client::{describe_error_body, OpenRouterClient, OpenRouterClientBuilder, OPENROUTER_API_BASE};
