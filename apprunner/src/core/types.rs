//! Plain values passed between the build and launch phases.

use std::ffi::OsString;
use std::fmt;
use std::process::Command;

/// An executable plus its ordered arguments. Built fresh for every start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from a `[program, args...]` list as written in config files.
    /// Returns `None` for an empty list.
    pub fn from_argv<S: Into<OsString> + Clone>(argv: &[S]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        let mut command = Self::new(program.clone());
        command.args = rest.iter().cloned().map(Into::into).collect();
        Some(command)
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Convert into a `std::process::Command` with no I/O configuration applied.
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
