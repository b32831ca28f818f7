use std::vec;

use jiff::Timestamp;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::Failure,
    session::{MessageCount, ProtocolError, Session},
    tree::{DiscoveryError, MailboxTree},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub total: u32,
    pub seen: u32,
    /// Messages received before the cutoff.
    pub old: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailboxStats {
    pub path: String,
    pub depth: usize,
    /// `None` when only listing, or when the mailbox cannot hold messages.
    pub counts: Option<Counts>,
}

/// Read-only walk over every mailbox below a root, parents first.
///
/// Statistics are fetched one mailbox at a time as [`Scanner::next`] is
/// called, so huge trees start reporting immediately.
#[derive(Debug)]
pub struct Scanner<'s, S> {
    session: &'s mut S,
    tree: MailboxTree,
    order: vec::IntoIter<String>,
    list_only: bool,
    cutoff: Timestamp,
    cancel: CancellationToken,
    cancelled: bool,
}

impl<'s, S: Session> Scanner<'s, S> {
    pub async fn start(
        session: &'s mut S,
        root: &str,
        list_only: bool,
        cutoff: Timestamp,
        cancel: CancellationToken,
    ) -> Result<Self, DiscoveryError> {
        let tree = MailboxTree::build(session, root).await?;
        info!("scanning {} mailboxes below {root:?}", tree.mailbox_count());
        let order = tree.pre_order().into_iter();
        Ok(Self {
            session,
            tree,
            order,
            list_only,
            cutoff,
            cancel,
            cancelled: false,
        })
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub async fn next(&mut self) -> Option<Result<MailboxStats, Failure>> {
        if self.cancel.is_cancelled() {
            self.cancelled = true;
            return None;
        }
        let path = self.order.next()?;
        let depth = self.tree.depth(&path);
        let selectable = self.tree.get(&path).is_some_and(|node| node.selectable());

        if self.list_only || !selectable {
            return Some(Ok(MailboxStats {
                path,
                depth,
                counts: None,
            }));
        }

        match self.count(&path).await {
            Ok(counts) => {
                debug!("{path}: {counts:?}");
                Some(Ok(MailboxStats {
                    path,
                    depth,
                    counts: Some(counts),
                }))
            }
            Err(error) => Some(Err(Failure::new(&path, error))),
        }
    }

    async fn count(&mut self, path: &str) -> Result<Counts, ProtocolError> {
        let MessageCount { total, seen } = self.session.message_count(path).await?;
        let candidates = self.session.search_older_than(path, self.cutoff).await?;
        let old = if candidates.is_empty() {
            0
        } else {
            self.session
                .internal_dates(path, &candidates)
                .await?
                .iter()
                .filter(|message| message.received.timestamp() < self.cutoff)
                .count()
                .try_into()
                .unwrap_or(u32::MAX)
        };
        Ok(Counts { total, seen, old })
    }
}
