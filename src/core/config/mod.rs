pub mod data;
pub mod io;

pub use data::{Config, ProviderSettings, StreamSettings};
pub use io::ConfigError;

#[cfg(test)]
mod tests;
