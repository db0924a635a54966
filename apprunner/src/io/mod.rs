//! I/O helpers for building and running projects.

pub mod artifact;
pub mod build;
pub mod config;
pub mod pom;
pub mod process;
pub mod runtime;
pub mod sink;
pub mod waiter;
