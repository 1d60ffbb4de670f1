//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project setup | `init` |
//! | Inspect | Read-only checks on the manifest | `validate`, `order`, `graph` |
//! | Resolve | Reference substitution | `plan`, `apply`, `outputs` |
//! | Maintenance | Manifest and state housekeeping | `fmt`, `state show`, `state clear` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output:
//! ```bash
//! stack --verbose plan
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod inspect;
mod resolve_cmd;
mod manifest_cmd;
mod state_cmd;

pub use app::{Cli, Commands, run};
pub use output::{Output, OutputFormat};
