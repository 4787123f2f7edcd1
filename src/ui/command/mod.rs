//! Shell commands.
//!
//! A command is a request to configure or drive a debugging session, parsed from one input line.

pub mod parser;

use crate::debugger::Error;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Parsing(String),
    #[error(transparent)]
    Handle(#[from] Error),
}

pub type CommandResult<T> = Result<T, CommandError>;

/// External commands that can be processed by the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetVmlinux(PathBuf),
    SetGdb(String),
    SetQemu { exec: String, args: Vec<String> },
    SetReplayFile(PathBuf),
    SetImage(PathBuf),
    SetRemote(String),
    SetStripPrefix(String),
    SetUserExec(PathBuf),
    Start,
    Watch(String),
    WatchUser(String),
    Run,
    Trace,
    Help { command: Option<String> },
    SkipInput,
}
