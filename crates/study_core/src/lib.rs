//! study_core - Core types shared by the study chat crates
//!
//! - `config` - process-wide settings read once at startup
//! - `document` - handles for documents uploaded to the assistant service
//! - `turn` - transcript entries
//! - `paths` - default on-disk locations

pub mod config;
pub mod document;
pub mod paths;
pub mod turn;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use document::DocumentHandle;
pub use turn::{ChatRole, ChatTurn};
