mod dry_run;
#[cfg(test)]
pub mod fake;
mod uid;

use std::io;

use jiff::{Timestamp, Zoned};
use thiserror::Error;

pub use dry_run::DryRun;
pub use uid::Uid;

/// Flat result of listing a mailbox and everything below it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MailboxListing {
    /// Hierarchy delimiter of the server, `None` for flat namespaces.
    pub delimiter: Option<String>,
    pub mailboxes: Vec<ListedMailbox>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListedMailbox {
    pub path: String,
    /// `false` for placeholders the server marks `\Noselect`.
    pub selectable: bool,
}

#[cfg(test)]
impl ListedMailbox {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            selectable: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessageCount {
    pub total: u32,
    pub seen: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub uid: Uid,
    /// Internal date, in the offset the server reported it with.
    pub received: Zoned,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("server refused {command}: {information}")]
    No {
        command: String,
        information: String,
    },
    #[error("server rejected {command}: {information}")]
    Bad {
        command: String,
        information: String,
    },
    #[error("mailbox {0} does not exist or cannot be selected")]
    NotFound(String),
    #[error("unexpected response to {0}")]
    UnexpectedResponse(String),
    #[error("connection to server closed")]
    Closed,
    #[error("connection failure: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Whether the session is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed | Self::Io(_))
    }
}

/// Capabilities the engines need from a logged in mail server session.
///
/// Every call is one (or a short fixed series of) protocol round trip and
/// must complete before the next one is issued.
pub trait Session {
    /// Lists `root` and all mailboxes nested below it. An empty `root`
    /// lists every mailbox on the server.
    async fn list_mailboxes(&mut self, root: &str) -> Result<MailboxListing, ProtocolError>;

    /// Selects `path` and returns the number of messages in it.
    async fn select_mailbox(&mut self, path: &str) -> Result<u32, ProtocolError>;

    async fn message_count(&mut self, path: &str) -> Result<MessageCount, ProtocolError>;

    /// Uids of undeleted messages in `path` received strictly before `cutoff`.
    async fn search_older_than(
        &mut self,
        path: &str,
        cutoff: Timestamp,
    ) -> Result<Vec<Uid>, ProtocolError>;

    async fn internal_dates(
        &mut self,
        path: &str,
        uids: &[Uid],
    ) -> Result<Vec<Message>, ProtocolError>;

    async fn copy_messages(
        &mut self,
        source: &str,
        uids: &[Uid],
        destination: &str,
    ) -> Result<(), ProtocolError>;

    /// Marks messages for removal. They stay until [`Session::expunge`].
    async fn delete_messages(&mut self, source: &str, uids: &[Uid]) -> Result<(), ProtocolError>;

    async fn expunge(&mut self, path: &str, uids: &[Uid]) -> Result<(), ProtocolError>;

    /// Creates `path`. Creating an existing mailbox is not an error.
    async fn create_mailbox(&mut self, path: &str) -> Result<(), ProtocolError>;

    async fn delete_mailbox(&mut self, path: &str) -> Result<(), ProtocolError>;
}
