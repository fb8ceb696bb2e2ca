//! # Anthropic Claude API Client
//!
//! Minimal Rust client for the Anthropic Messages API, used by the
//! Claude-backed collaborators of the optimization loop.
//!
//! ## Example
//!
//! ```no_run
//! use hydro_agents_anthropic::{AnthropicClient, MessagesRequest};
//! use hydro_agents_anthropic::types::Message;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create client from ANTHROPIC_API_KEY environment variable
//!     let client = AnthropicClient::from_env()?;
//!
//!     let request = MessagesRequest::new(vec![
//!         Message::user("Hello, Claude!")
//!     ]);
//!
//!     let response = client.messages(request).await?;
//!     println!("Response: {}", response.text());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - Non-streaming messages API with optional request timeout
//! - Forced tool use for structured output
//! - Transient error classification for retry policies

pub mod client;
pub mod error;
pub mod messages;
pub mod types;

// Re-export main types for convenience
pub use client::AnthropicClient;
pub use error::ClaudeError;
pub use messages::{MessagesRequest, MessagesResponse, DEFAULT_MODEL};
pub use types::{ContentBlock, Message, Role, StopReason, Tool, ToolChoice, Usage};
