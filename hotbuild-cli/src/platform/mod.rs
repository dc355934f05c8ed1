//! Terminal presentation

mod cli;

pub use cli::{print_failure, print_report};
