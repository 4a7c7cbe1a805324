//! # hfspace: Hugging Face Spaces toolkit
//!
//! Library side of the `hfspace` command line tool. Three components:
//!
//! ### 1. Space Finder
//! - Hub directory search ([`hub`])
//! - Favorite Spaces persisted as JSON ([`favorites`])
//!
//! ### 2. Space Runner
//! Calls a Space's Gradio API synchronously or as a background job
//! ([`runner`]). The transport sits behind the
//! [`SpaceConnector`](runner::SpaceConnector) trait, with the HTTP
//! implementation in [`runner::gradio`].
//!
//! ### 3. Results Manager
//! Local SQLite library of generated outputs ([`results`]).
//!
//! Shared client settings live in [`config`]; per-component errors fold into
//! [`Error`].

pub mod config;
pub mod error;
pub mod favorites;
pub mod hub;
pub mod results;
pub mod runner;

// Re-exports
pub use error::*;
