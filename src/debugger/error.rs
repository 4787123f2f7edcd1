use crate::debugger::address::Address;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("no debugger session, use `start` first")]
    NoSession,

    // --------------------------------- command channel errors ------------------------------------
    #[error("no debugger prompt after `{command}` within {timeout:?}")]
    ChannelTimeout { command: String, timeout: Duration },
    #[error("debugger channel closed: {0}")]
    ChannelClosed(String),
    #[error("spawn {0}")]
    Spawn(String),

    // --------------------------------- parsing errors --------------------------------------------
    #[error("unexpected debugger response (expect {expected}): {response:?}")]
    ProtocolParse {
        expected: &'static str,
        response: String,
    },

    // --------------------------------- remote memory errors --------------------------------------
    #[error("cannot access memory at address {0}")]
    MemoryAccess(Address),

    // --------------------------------- event store errors ----------------------------------------
    #[error("event store {0:?} already exists")]
    StoreAlreadyExists(PathBuf),
    #[error("event store {0:?} not found, create it with --create-store")]
    StoreMissing(PathBuf),
    #[error("duplicate write event at {instruction_pointer} (memory {memory_address})")]
    DuplicateEvent {
        instruction_pointer: Address,
        memory_address: Address,
    },
    #[error("event store: {0}")]
    Store(#[from] rusqlite::Error),

    // --------------------------------- third party errors ----------------------------------------
    #[error("hook: {0}")]
    Hook(anyhow::Error),
}

impl Error {
    pub(crate) fn parse(expected: &'static str, response: impl Into<String>) -> Self {
        Error::ProtocolParse {
            expected,
            response: response.into(),
        }
    }

    /// Errors after which a trace or watch goes on with the next instruction or stop.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::ProtocolParse { .. } | Error::MemoryAccess(_))
    }

    /// Return a hint to an interface - continue debugging after error or stop whole process.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::IO(_) => false,
            Error::NotConfigured(_) => false,
            Error::NoSession => false,
            Error::ChannelTimeout { .. } => false,
            Error::ProtocolParse { .. } => false,
            Error::MemoryAccess(_) => false,
            Error::DuplicateEvent { .. } => false,
            Error::Store(_) => false,
            Error::Hook(_) => false,

            // currently fatal errors
            Error::ChannelClosed(_) => true,
            Error::Spawn(_) => true,
            Error::StoreAlreadyExists(_) => true,
            Error::StoreMissing(_) => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
