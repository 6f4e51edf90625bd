//! Lightning Issues library crate
//!
//! Turns a GitHub repository URL into issue suggestions researched by a
//! search-grounded model, and keeps a local history of past runs. The
//! `lightning` binary is a thin CLI over these modules.

pub mod config;
pub mod error;
pub mod github;
pub mod history;
pub mod keyring;
pub mod pipeline;
pub mod suggest;
pub mod util;

pub use error::{GenerationError, ParseError, UpstreamError};
pub use pipeline::{Generator, Stage};
