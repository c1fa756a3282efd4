//! # Repowhisper
//!
//! Generate a README for any repository.
//!
//! Repowhisper materializes a repository (local path or git URL), extracts
//! its structure, manifests and a few representative source files, asks a
//! language model for an analysis and then for a README. A small workflow
//! engine validates every step's output and retries it when needed.
//!
//! ## Features
//!
//! - **Workflow engine**: analyze/draft steps with validation, bounded redo,
//!   checkpoints, resume and cancellation by run id
//! - **Multiple backends**: Gemini, Claude and Ollama with automatic fallthrough
//! - **Always an answer**: every step degrades to a deterministic fallback
//!
//! ## Quick Start
//!
//! ```bash
//! # Generate a README for a local checkout
//! repowhisper generate .
//!
//! # Or clone and analyze a remote repository
//! repowhisper generate https://github.com/owner/project -o README.md
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::or_fun_call)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::future_not_send)]

pub mod ai;
pub mod core;
pub mod repo;
pub mod service;
pub mod workflow;

// Re-export commonly used types
pub use ai::{AIManager, TextGenerator};
pub use core::Config;
pub use service::{build_orchestrator, GenerateOptions, ReadmeService, RunReport, ServiceError};
pub use workflow::{Orchestrator, RunId, RunOptions, RunState, StepName, WorkflowError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "repowhisper";
