//! # Storage Layer
//!
//! Persistence for stack projects using git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Manifest | TOML, YAML or JSON | `stack.toml` (configurable) |
//! | Applied state | JSONL (one JSON per line) | `.stack/state.jsonl` |
//! | Config | TOML | `.stack/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`StateStore`] uses file locking (`fs2`) for concurrent access
//! - State writes are atomic (temp file + rename)
//!
//! ## Project Structure
//!
//! ```text
//! stack.toml                # Declared resources and outputs
//! .stack/
//! ├── config.toml           # Project configuration
//! ├── state.jsonl           # Last applied state (ignored by git)
//! └── .gitignore
//! ```
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a stack project
//! - [`Manifest`] - Declared stack as stored on disk
//! - [`StateStore`] - Read/write applied state as JSONL
//! - [`Config`] - Project and global configuration

mod config;
mod manifest;
mod project;
mod state;

pub use config::{Config, ConfigError, EngineConfig, GlobalConfig, OutputFormat, ProjectConfig};
pub use manifest::{Manifest, ManifestError, ManifestFormat};
pub use project::{Project, ProjectError};
pub use state::{ResourceState, State, StateEntry, StateStore};
