//! mediagrab: acquire yt-dlp and ffmpeg, then run media jobs through them
//!
//! ## Module Organization
//!
//! - `tools` - Tool registry, platform detection, binary resolution, versions
//! - `download` - Streaming downloader and archive installer
//! - `acquire` - Tool acquisition with weighted progress and cancellation
//! - `job` - Argument builder, output parser and process runner
//! - `engine` - Collaborator-facing command surface
//! - `config` - TOML configuration

pub mod acquire;
pub mod config;
pub mod download;
pub mod engine;
mod error;
pub mod job;
mod process;
pub mod tools;

pub use engine::Engine;
pub use error::{MediaError, Result};
