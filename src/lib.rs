//! Real-time telephony voice agent.
//!
//! Bridges an inbound phone call to a streaming speech-to-text upstream,
//! a streaming LLM, and a streaming text-to-speech upstream, with
//! barge-in support so the caller can interrupt a reply mid-sentence.
//!
//! # Example
//!
//! ```ignore
//! use voice_agent::config::Config;
//! use voice_agent::server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     server::start(config).await
//! }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod providers;
pub mod server;
pub mod session;
pub mod telephony;
pub mod tools;
pub mod types;

pub use config::Config;
pub use server::start as start_server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

pub fn info() -> String {
    format!("{NAME} v{VERSION} - real-time telephony voice agent")
}
