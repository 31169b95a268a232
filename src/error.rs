//! Error taxonomy for the server core (spec §7).
//!
//! `WouldBlock` never leaves `async_io` — it is swallowed into a retry loop.
//! Every other variant is something a connection can recover from by
//! closing itself; nothing here kills a worker.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// `recv_async` hit its deadline before data arrived.
    TimedOut,
    /// Peer closed the connection (`recv` returned 0, or `EPOLLRDHUP`).
    PeerClosed,
    /// The request line or headers did not parse.
    Protocol,
    /// Coroutine or stack allocation failed.
    ResourceExhausted,
    /// Anything else the OS handed back.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::TimedOut => write!(f, "operation timed out"),
            Error::PeerClosed => write!(f, "peer closed the connection"),
            Error::Protocol => write!(f, "protocol error"),
            Error::ResourceExhausted => write!(f, "resource exhausted"),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

/// A startup failure that should abort the process (spec §7, `Fatal`).
#[derive(Debug)]
pub struct Fatal(pub String);

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "fatal startup error: {}", self.0)
    }
}

impl std::error::Error for Fatal {}

pub type Result<T> = std::result::Result<T, Error>;
