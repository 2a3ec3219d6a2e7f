//! CLI utilities for shelf.
//!
//! Config contexts, app directories and result output shared by the
//! command-line tools.

pub mod config;
pub mod output;
pub mod paths;

pub use config::{Config, Context, load_config};
pub use output::{Output, OutputFormat};
pub use paths::Paths;
