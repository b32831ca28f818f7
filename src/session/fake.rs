//! In-memory [`Session`] with switchable failures, used by engine tests.

use std::collections::{BTreeMap, HashSet};

use jiff::{Timestamp, Zoned, civil::Date, tz::TimeZone};

use super::{ListedMailbox, MailboxListing, Message, MessageCount, ProtocolError, Session, Uid};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(String),
    Select(String),
    Count(String),
    Search(String),
    Dates(String),
    Copy {
        source: String,
        destination: String,
        count: usize,
    },
    DeleteMessages(String),
    Expunge(String),
    Create(String),
    DeleteMailbox(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Copy { .. }
                | Self::DeleteMessages(_)
                | Self::Expunge(_)
                | Self::Create(_)
                | Self::DeleteMailbox(_)
        )
    }
}

#[derive(Debug, Clone)]
struct FakeMessage {
    uid: Uid,
    received: Zoned,
    seen: bool,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct FakeMailbox {
    selectable: bool,
    messages: Vec<FakeMessage>,
    last_uid: u32,
}

impl FakeMailbox {
    fn new(selectable: bool) -> Self {
        Self {
            selectable,
            messages: Vec::new(),
            last_uid: 0,
        }
    }

    fn append(&mut self, received: Zoned, seen: bool) {
        self.last_uid += 1;
        self.messages.push(FakeMessage {
            uid: Uid::try_from(self.last_uid).expect("fake uids start at 1"),
            received,
            seen,
            deleted: false,
        });
    }
}

#[derive(Debug, Default)]
pub struct FakeSession {
    mailboxes: BTreeMap<String, FakeMailbox>,
    fail_copy_to: HashSet<String>,
    lose_copies_to: HashSet<String>,
    fail_delete_messages_in: HashSet<String>,
    fail_create: HashSet<String>,
    fail_count: HashSet<String>,
    close_on_count: HashSet<String>,
    fail_delete_mailbox: HashSet<String>,
    drop_orphaned_placeholders: bool,
    calls: Vec<Call>,
}

/// Midnight UTC of an ISO date like `2013-11-01`.
pub fn day(date: &str) -> Zoned {
    date.parse::<Date>()
        .expect("test dates should be valid")
        .to_zoned(TimeZone::UTC)
        .expect("test dates should be representable")
}

pub fn instant(date: &str) -> Timestamp {
    day(date).timestamp()
}

fn no(command: &str, information: &str) -> ProtocolError {
    ProtocolError::No {
        command: command.to_string(),
        information: information.to_string(),
    }
}

impl FakeSession {
    const DELIMITER: &str = ".";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mailbox(mut self, path: &str) -> Self {
        self.mailboxes
            .entry(path.to_string())
            .or_insert_with(|| FakeMailbox::new(true));
        self
    }

    pub fn with_placeholder(mut self, path: &str) -> Self {
        self.mailboxes
            .insert(path.to_string(), FakeMailbox::new(false));
        self
    }

    pub fn with_message(self, path: &str, received: Zoned) -> Self {
        self.with_flagged_message(path, received, false)
    }

    pub fn with_seen_message(self, path: &str, received: Zoned) -> Self {
        self.with_flagged_message(path, received, true)
    }

    fn with_flagged_message(mut self, path: &str, received: Zoned, seen: bool) -> Self {
        self.mailboxes
            .entry(path.to_string())
            .or_insert_with(|| FakeMailbox::new(true))
            .append(received, seen);
        self
    }

    pub fn failing_copy_to(mut self, destination: &str) -> Self {
        self.fail_copy_to.insert(destination.to_string());
        self
    }

    /// Copies to `destination` report success but never arrive.
    pub fn losing_copies_to(mut self, destination: &str) -> Self {
        self.lose_copies_to.insert(destination.to_string());
        self
    }

    pub fn failing_delete_messages_in(mut self, source: &str) -> Self {
        self.fail_delete_messages_in.insert(source.to_string());
        self
    }

    pub fn failing_create(mut self, path: &str) -> Self {
        self.fail_create.insert(path.to_string());
        self
    }

    pub fn failing_count(mut self, path: &str) -> Self {
        self.fail_count.insert(path.to_string());
        self
    }

    /// Counting `path` drops the connection.
    pub fn closing_on_count(mut self, path: &str) -> Self {
        self.close_on_count.insert(path.to_string());
        self
    }

    pub fn failing_delete_mailbox(mut self, path: &str) -> Self {
        self.fail_delete_mailbox.insert(path.to_string());
        self
    }

    /// Placeholders disappear once their last child is deleted, like
    /// servers that only keep them as implied parents.
    pub fn dropping_orphaned_placeholders(mut self) -> Self {
        self.drop_orphaned_placeholders = true;
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn exists(&self, path: &str) -> bool {
        self.mailboxes.contains_key(path)
    }

    /// Internal dates of the messages still present in `path`.
    pub fn received(&self, path: &str) -> Vec<Zoned> {
        self.mailboxes
            .get(path)
            .map(|mailbox| {
                mailbox
                    .messages
                    .iter()
                    .map(|message| message.received.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn has_children(&self, path: &str) -> bool {
        let prefix = format!("{path}{}", Self::DELIMITER);
        self.mailboxes.keys().any(|other| other.starts_with(&prefix))
    }

    fn drop_orphaned_parent(&mut self, path: &str) {
        let Some((parent, _)) = path.rsplit_once(Self::DELIMITER) else {
            return;
        };
        let orphaned = self
            .mailboxes
            .get(parent)
            .is_some_and(|mailbox| !mailbox.selectable)
            && !self.has_children(parent);
        if orphaned {
            self.mailboxes.remove(parent);
        }
    }

    fn selectable(&mut self, path: &str, command: &str) -> Result<&mut FakeMailbox, ProtocolError> {
        match self.mailboxes.get_mut(path) {
            Some(mailbox) if mailbox.selectable => Ok(mailbox),
            Some(_) => Err(no(command, "mailbox is not selectable")),
            None => Err(no(command, "no such mailbox")),
        }
    }
}

impl Session for FakeSession {
    async fn list_mailboxes(&mut self, root: &str) -> Result<MailboxListing, ProtocolError> {
        self.calls.push(Call::List(root.to_string()));
        let prefix = format!("{root}{}", Self::DELIMITER);
        let mailboxes = self
            .mailboxes
            .iter()
            .filter(|(path, _)| root.is_empty() || *path == root || path.starts_with(&prefix))
            .map(|(path, mailbox)| ListedMailbox {
                path: path.clone(),
                selectable: mailbox.selectable,
            })
            .collect();
        Ok(MailboxListing {
            delimiter: Some(Self::DELIMITER.to_string()),
            mailboxes,
        })
    }

    async fn select_mailbox(&mut self, path: &str) -> Result<u32, ProtocolError> {
        self.calls.push(Call::Select(path.to_string()));
        match self.mailboxes.get(path) {
            Some(mailbox) if mailbox.selectable => Ok(u32::try_from(mailbox.messages.len())
                .expect("fake mailboxes stay small")),
            _ => Err(ProtocolError::NotFound(path.to_string())),
        }
    }

    async fn message_count(&mut self, path: &str) -> Result<MessageCount, ProtocolError> {
        self.calls.push(Call::Count(path.to_string()));
        if self.fail_count.contains(path) {
            return Err(no("STATUS", "status unavailable"));
        }
        if self.close_on_count.contains(path) {
            return Err(ProtocolError::Closed);
        }
        let mailbox = self.selectable(path, "STATUS")?;
        let count = |seen_only: bool| -> u32 {
            mailbox
                .messages
                .iter()
                .filter(|message| !seen_only || message.seen)
                .count()
                .try_into()
                .expect("fake mailboxes stay small")
        };
        Ok(MessageCount {
            total: count(false),
            seen: count(true),
        })
    }

    async fn search_older_than(
        &mut self,
        path: &str,
        cutoff: Timestamp,
    ) -> Result<Vec<Uid>, ProtocolError> {
        self.calls.push(Call::Search(path.to_string()));
        let mailbox = self.selectable(path, "UID SEARCH")?;
        Ok(mailbox
            .messages
            .iter()
            .filter(|message| !message.deleted && message.received.timestamp() < cutoff)
            .map(|message| message.uid)
            .collect())
    }

    async fn internal_dates(
        &mut self,
        path: &str,
        uids: &[Uid],
    ) -> Result<Vec<Message>, ProtocolError> {
        self.calls.push(Call::Dates(path.to_string()));
        let mailbox = self.selectable(path, "UID FETCH")?;
        Ok(mailbox
            .messages
            .iter()
            .filter(|message| uids.contains(&message.uid))
            .map(|message| Message {
                uid: message.uid,
                received: message.received.clone(),
            })
            .collect())
    }

    async fn copy_messages(
        &mut self,
        source: &str,
        uids: &[Uid],
        destination: &str,
    ) -> Result<(), ProtocolError> {
        self.calls.push(Call::Copy {
            source: source.to_string(),
            destination: destination.to_string(),
            count: uids.len(),
        });
        if self.fail_copy_to.contains(destination) {
            return Err(no("UID COPY", "over quota"));
        }
        let copies: Vec<FakeMessage> = self
            .selectable(source, "UID COPY")?
            .messages
            .iter()
            .filter(|message| uids.contains(&message.uid))
            .cloned()
            .collect();
        let lose = self.lose_copies_to.contains(destination);
        let target = self.selectable(destination, "UID COPY")?;
        if !lose {
            for copy in copies {
                target.append(copy.received, copy.seen);
            }
        }
        Ok(())
    }

    async fn delete_messages(&mut self, source: &str, uids: &[Uid]) -> Result<(), ProtocolError> {
        self.calls.push(Call::DeleteMessages(source.to_string()));
        if self.fail_delete_messages_in.contains(source) {
            return Err(no("UID STORE", "mailbox is read-only"));
        }
        for message in &mut self.selectable(source, "UID STORE")?.messages {
            if uids.contains(&message.uid) {
                message.deleted = true;
            }
        }
        Ok(())
    }

    async fn expunge(&mut self, path: &str, uids: &[Uid]) -> Result<(), ProtocolError> {
        self.calls.push(Call::Expunge(path.to_string()));
        self.selectable(path, "UID EXPUNGE")?
            .messages
            .retain(|message| !(message.deleted && uids.contains(&message.uid)));
        Ok(())
    }

    async fn create_mailbox(&mut self, path: &str) -> Result<(), ProtocolError> {
        self.calls.push(Call::Create(path.to_string()));
        if self.fail_create.contains(path) {
            return Err(no("CREATE", "permission denied"));
        }
        self.mailboxes
            .entry(path.to_string())
            .or_insert_with(|| FakeMailbox::new(true));
        Ok(())
    }

    async fn delete_mailbox(&mut self, path: &str) -> Result<(), ProtocolError> {
        self.calls.push(Call::DeleteMailbox(path.to_string()));
        if self.fail_delete_mailbox.contains(path) {
            return Err(no("DELETE", "mailbox in use"));
        }
        if self.has_children(path) {
            return Err(no("DELETE", "mailbox has inferior hierarchical names"));
        }
        match self.mailboxes.get(path) {
            None => Err(ProtocolError::NotFound(path.to_string())),
            Some(mailbox) if !mailbox.messages.is_empty() => {
                Err(no("DELETE", "mailbox is not empty"))
            }
            Some(_) => {
                self.mailboxes.remove(path);
                if self.drop_orphaned_placeholders {
                    self.drop_orphaned_parent(path);
                }
                Ok(())
            }
        }
    }
}
