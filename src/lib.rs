#![allow(clippy::format_push_string)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

//! # Stepwise
//!
//! Terminal front end for multi-step, tool-using coding agents.
//!
//! Stepwise asks a planning backend for a plan, lets you refine and confirm
//! it, then follows the agent's event stream live: step progress, tool
//! actions and their outcomes, and the final answer. File writes and reads
//! the agent requests are mediated against your project tree and never
//! leave it; a remote mirror of the tree is kept in sync for the agent.
//!
//! ## Quick Start
//!
//! ```bash
//! export STEPWISE_BACKEND_URL=localhost:8000
//!
//! # Plan, confirm and run a task
//! stepwise run "write a hello-world TA and build it"
//!
//! # Ask a question
//! stepwise ask "what does TEE_OpenSession return?"
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::future_not_send)]

pub mod backend;
pub mod bridge;
pub mod core;
pub mod protocol;
pub mod render;
pub mod run;
pub mod session;
pub mod workflow;

// Re-export commonly used types
pub use backend::{Backend, BackendError, HttpBackend};
pub use bridge::{BridgeError, FileBridge};
pub use core::Config;
pub use protocol::{AgentEvent, OutboundMessage};
pub use run::{cancel_channel, CancelHandle, EventDispatcher, RunReport, RunSink, RunStatus};
pub use session::{Session, SessionError};
pub use workflow::{Step, StepStatus, Workflow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "stepwise";
