//! Generative-text provider for wayfinder.
//!
//! Wayfinder only needs one thing from an LLM: given a system instruction,
//! a user instruction and a JSON schema, return records matching that
//! schema. This crate provides that over any OpenAI-compatible
//! chat-completion endpoint.
//!
//! # Architecture
//!
//! - [`Provider`] trait defines the chat completion interface
//! - [`OpenAiCompatProvider`] implements it over HTTP
//! - [`complete_structured`] sends a request with a JSON-schema
//!   `response_format` and parses the first choice
//! - [`LlmProviderConfig`] describes how to connect to the endpoint
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use wayfinder_llm::{complete_structured, ChatMessage, ChatRequest, ResponseFormat};
//!
//! let request = ChatRequest::new("gpt-4o-mini", vec![
//!     ChatMessage::system("You are a UX data synthesis specialist."),
//!     ChatMessage::user("Generate 5 routes for a flight booking admin panel."),
//! ])
//! .with_response_format(ResponseFormat::json_schema("route_list", schema));
//!
//! let parsed: Option<RouteList> = complete_structured(&provider, &request).await?;
//! ```

pub mod config;
pub mod error;
pub mod openai_compat;
pub mod provider;
pub mod structured;
pub mod types;

pub use config::LlmProviderConfig;
pub use error::{ProviderError, Result};
pub use openai_compat::OpenAiCompatProvider;
pub use provider::Provider;
pub use structured::complete_structured;
pub use types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat, Usage};
