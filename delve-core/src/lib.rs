//! Delve Core - shared data model, error taxonomy and async plumbing
//!
//! Everything the research layer and its collaborators agree on lives here:
//! the learning/budget types, the collaborator traits, configuration,
//! logging, and the retry/throttling primitives.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
