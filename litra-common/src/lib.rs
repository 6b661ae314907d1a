//! # litra Common Library
//!
//! Shared code for the litra translation session tooling:
//! - Domain models (paragraphs, glossary terms, translation request/response)
//! - Session notice types and the `EventBus` that carries them to the UI
//! - Configuration loading (CLI > environment > TOML > compiled defaults)
//! - Error type shared by every crate in the workspace

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{Error, Result};
