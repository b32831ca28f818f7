use std::collections::{HashMap, HashSet};

use jiff::Timestamp;
use log::info;

use super::{MailboxListing, Message, MessageCount, ProtocolError, Session, Uid};

/// Forwards reads to the wrapped session and only logs mutations.
///
/// Copies and created mailboxes are remembered so later reads see the
/// state a real run would have produced and the archive engine can still
/// confirm its copies.
pub struct DryRun<S> {
    inner: S,
    created: HashSet<String>,
    copied: HashMap<String, u32>,
}

impl<S: Session> DryRun<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            created: HashSet::new(),
            copied: HashMap::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Session> Session for DryRun<S> {
    async fn list_mailboxes(&mut self, root: &str) -> Result<MailboxListing, ProtocolError> {
        self.inner.list_mailboxes(root).await
    }

    async fn select_mailbox(&mut self, path: &str) -> Result<u32, ProtocolError> {
        self.inner.select_mailbox(path).await
    }

    async fn message_count(&mut self, path: &str) -> Result<MessageCount, ProtocolError> {
        let mut count = match self.inner.message_count(path).await {
            Ok(count) => count,
            Err(e) if !e.is_fatal() && self.created.contains(path) => MessageCount::default(),
            Err(e) => return Err(e),
        };
        count.total += self.copied.get(path).copied().unwrap_or_default();
        Ok(count)
    }

    async fn search_older_than(
        &mut self,
        path: &str,
        cutoff: Timestamp,
    ) -> Result<Vec<Uid>, ProtocolError> {
        self.inner.search_older_than(path, cutoff).await
    }

    async fn internal_dates(
        &mut self,
        path: &str,
        uids: &[Uid],
    ) -> Result<Vec<Message>, ProtocolError> {
        self.inner.internal_dates(path, uids).await
    }

    async fn copy_messages(
        &mut self,
        source: &str,
        uids: &[Uid],
        destination: &str,
    ) -> Result<(), ProtocolError> {
        info!(
            "dry run: would copy {} messages from {source} to {destination}",
            uids.len()
        );
        let count = u32::try_from(uids.len()).unwrap_or(u32::MAX);
        *self.copied.entry(destination.to_string()).or_default() += count;
        Ok(())
    }

    async fn delete_messages(&mut self, source: &str, uids: &[Uid]) -> Result<(), ProtocolError> {
        info!(
            "dry run: would flag {} messages in {source} as deleted",
            uids.len()
        );
        Ok(())
    }

    async fn expunge(&mut self, path: &str, uids: &[Uid]) -> Result<(), ProtocolError> {
        info!("dry run: would expunge {} messages from {path}", uids.len());
        Ok(())
    }

    async fn create_mailbox(&mut self, path: &str) -> Result<(), ProtocolError> {
        info!("dry run: would create mailbox {path}");
        self.created.insert(path.to_string());
        Ok(())
    }

    async fn delete_mailbox(&mut self, path: &str) -> Result<(), ProtocolError> {
        info!("dry run: would delete mailbox {path}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assertables::*;
    use rstest::*;

    use super::*;
    use crate::session::fake::{FakeSession, day, instant};

    #[fixture]
    fn dry_run() -> DryRun<FakeSession> {
        DryRun::new(
            FakeSession::new()
                .with_mailbox("INBOX")
                .with_message("INBOX", day("2013-11-01")),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn test_mutations_are_not_forwarded(mut dry_run: DryRun<FakeSession>) {
        let uids = assert_ok!(dry_run.search_older_than("INBOX", instant("2014-01-01")).await);
        assert_ok!(dry_run.create_mailbox("ARCHIVE").await);
        assert_ok!(dry_run.copy_messages("INBOX", &uids, "ARCHIVE").await);
        assert_ok!(dry_run.delete_messages("INBOX", &uids).await);
        assert_ok!(dry_run.expunge("INBOX", &uids).await);
        assert_ok!(dry_run.delete_mailbox("INBOX").await);

        let fake = dry_run.into_inner();
        assert!(!fake.calls().iter().any(|call| call.is_mutation()));
        assert!(!fake.exists("ARCHIVE"));
        assert_eq!(fake.received("INBOX").len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_counts_include_simulated_copies(mut dry_run: DryRun<FakeSession>) {
        let uids = assert_ok!(dry_run.search_older_than("INBOX", instant("2014-01-01")).await);
        assert_ok!(dry_run.create_mailbox("ARCHIVE").await);
        assert_ok!(dry_run.copy_messages("INBOX", &uids, "ARCHIVE").await);

        let count = assert_ok!(dry_run.message_count("ARCHIVE").await);
        assert_eq!(count.total, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_unknown_mailbox_still_fails(mut dry_run: DryRun<FakeSession>) {
        assert_err!(dry_run.message_count("NOWHERE").await);
    }
}
