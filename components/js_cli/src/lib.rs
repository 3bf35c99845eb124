//! Ejs module runner
//!
//! Loads modules from a search path, runs their initializers and optionally
//! calls one exported function with arguments from the command line.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod error;
pub mod runtime;

pub use cli::Cli;
pub use error::{CliError, CliResult};
pub use runtime::{parse_argument, Runtime};
