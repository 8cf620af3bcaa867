pub mod builtin_providers;
pub mod chat_stream;
pub mod client;
pub mod config;
pub mod errors;
pub mod message;
pub mod orchestrator;
pub mod providers;
pub mod proxy;
pub mod service;
pub mod timeout;
pub mod transport;
