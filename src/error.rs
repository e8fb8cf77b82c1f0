use crate::queue::QueueState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit status for operating system failures, as in `sysexits.h`.
pub const EX_OSERR: u8 = 71;

/// Errors that end a monitoring session.
///
/// Everything here is fatal for the session; recoverable conditions (a malformed element, a
/// failed slide command, dropped kernel events) are logged where they happen instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to obtain exclusive access to the device: {0}")]
    Grab(#[source] io::Error),
    #[error("failed to copy cookies: {0}")]
    Elements(#[source] io::Error),
    #[error("failed to allocate event queue: {0}")]
    Queue(#[source] io::Error),
    #[error("failed to add the event queue to the run loop: {0}")]
    Bind(#[source] io::Error),
    #[error("cannot {op} an event queue that is {state:?}")]
    QueueState { op: &'static str, state: QueueState },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// The process exit status this error maps to.
    ///
    /// Missing devices and failed allocations exit with 1; failures reported by the operating
    /// system while setting up or running exit with [`EX_OSERR`].
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::NotFound(_)
            | Error::Open { .. }
            | Error::Elements(_)
            | Error::Queue(_)
            | Error::QueueState { .. } => 1,
            Error::Grab(_) | Error::Bind(_) | Error::Io(_) => EX_OSERR,
        }
    }
}
