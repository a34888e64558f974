mod client;
mod error;
mod http;
mod sanitize;
mod schema;
mod tokens;

pub use client::{LlmClient, RetryConfig, RetryingClient};
pub use error::Error;
pub use http::HttpClient;
pub use sanitize::extract_json;
pub use schema::{correction_prompt, validate_pois, RawPoi};
pub use tokens::{Tokenizer, TRUNCATION_MARKER};
