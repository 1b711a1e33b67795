//! Command-line configuration.

mod args;
mod duration;

pub use args::{LoadArgs, PostgresOpts};
pub use duration::parse_duration;
