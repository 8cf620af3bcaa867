//! Parley is the streaming core of a chat client for OpenAI, Groq and local
//! Ollama servers.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns provider settings, the wire decoders, the transports and
//!   the stream orchestrator that adds timeouts, retries and fallbacks on top
//!   of them. [`core::service::ApiService`] is the entry point for embedders.
//! - [`api`] defines the chat and model-listing payloads exchanged with
//!   providers.
//! - [`utils`] holds URL and logging helpers.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
