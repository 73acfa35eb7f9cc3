//! muaddib-sandbox — sandboxed command execution for the `execute_code` tool.
//!
//! One execution mode: fire-and-forget command via `exec` (async, with
//! timeout + safety checking).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use muaddib_sandbox::manager::TerminalManager;
//! use muaddib_sandbox::types::ExecOptions;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mgr = TerminalManager::new();
//!
//!     // Safe one-shot exec with a 30-second timeout.
//!     let result = mgr.exec("echo hello", ExecOptions::default()).await.unwrap();
//!     println!("{}", result.stdout);
//! }
//! ```

pub mod error;
pub mod manager;
pub mod safety;
pub mod truncate;
pub mod types;

pub use error::{Result, TerminalError};
pub use manager::TerminalManager;
pub use types::{ExecOptions, ExecResult};
