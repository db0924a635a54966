//! Build-then-run supervision for checked-out projects.
//!
//! Given a project directory, a [`factory::RunnerFactory`] decides whether it
//! knows the project's build tool and hands back a [`runner::Runner`]. The
//! runner builds the project, finds the produced artifact, launches it as a
//! supervised background process and can shut it down again. The crate keeps
//! the same split as the rest of the codebase:
//!
//! - **[`core`]**: Pure, deterministic logic (artifact naming, launch commands).
//! - **[`io`]**: Side-effecting operations (build and app processes, manifests,
//!   log sinks, configuration).
//!
//! [`runner`] and [`factory`] coordinate the two into the `start`/`shutdown`
//! lifecycle callers drive.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod factory;
pub mod io;
pub mod logging;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::ProjectCannotStart;
pub use factory::{MavenRunnerFactory, RunnerFactory, probe_all};
pub use runner::Runner;
