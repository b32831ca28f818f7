mod archive;
mod prune;
mod scan;

use thiserror::Error;

use crate::session::ProtocolError;

pub use archive::{ArchiveOptions, Moved, archive};
pub use prune::prune;
pub use scan::{Counts, MailboxStats, Scanner};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("moving {count} messages to {destination} failed: {source}")]
    Move {
        destination: String,
        count: usize,
        source: ProtocolError,
    },
    #[error(
        "copy to {destination} could not be confirmed: expected at least {expected} messages there, found {found}"
    )]
    CopyUnconfirmed {
        destination: String,
        expected: u32,
        found: u32,
    },
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(source) | Self::Move { source, .. } => source.is_fatal(),
            Self::CopyUnconfirmed { .. } => false,
        }
    }
}

/// One mailbox level operation that did not go through.
#[derive(Debug)]
pub struct Failure {
    pub path: String,
    pub error: EngineError,
}

impl Failure {
    fn new(path: &str, error: impl Into<EngineError>) -> Self {
        Self {
            path: path.to_string(),
            error: error.into(),
        }
    }
}
