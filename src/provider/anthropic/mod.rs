//! Anthropic Messages API adapter: request building, response normalization,
//! error mapping, and SSE stream reconstruction.

mod error;
mod provider;
mod request;
mod response;
mod stream;
pub(crate) mod types;

pub use provider::AnthropicProvider;
