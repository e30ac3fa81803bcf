//! goalpath CLI library
//!
//! Command implementations behind the `goalpath` binary, usable from tests.

pub mod commands;

pub use commands::{AssignmentArgs, Session};
