use imap_proto::{
    AttributeValue, MailboxDatum, NameAttribute, Response, StatusAttribute,
};
use jiff::{Timestamp, ToSpan, Zoned, tz::TimeZone};
use log::{debug, info, trace, warn};

use crate::{
    imap::{
        client::{Capabilities, Capability},
        codec::ResponseData,
        connection::Connection,
        sequence_set::SequenceSet,
    },
    session::{ListedMailbox, MailboxListing, Message, MessageCount, ProtocolError, Session, Uid},
};

/// Quotes `value` as an IMAP string.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Parses an `INTERNALDATE` like `01-Nov-2013 10:00:00 +0100`.
fn parse_internal_date(date: &str) -> Option<Zoned> {
    let date = date.trim();
    // Servers may pad single digit days with a space instead of a zero.
    let padded;
    let date = if date.find('-') == Some(1) {
        padded = format!("0{date}");
        padded.as_str()
    } else {
        date
    };
    Zoned::strptime("%d-%b-%Y %H:%M:%S %z", date).ok()
}

/// How the currently selected mailbox was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// `EXAMINE`, enough for searching, fetching and copying out.
    ReadOnly,
    /// `SELECT`, needed to flag and expunge.
    ReadWrite,
}

/// A logged in session on a real server.
#[derive(Debug)]
pub struct ImapSession {
    connection: Connection,
    capabilities: Capabilities,
    selected: Option<(String, Access)>,
}

impl ImapSession {
    pub(super) fn new(connection: Connection, capabilities: Capabilities) -> Self {
        Self {
            connection,
            capabilities,
            selected: None,
        }
    }

    /// Ends the session. Failures only get logged.
    pub async fn logout(mut self) {
        if self.connection.is_closed() {
            debug!("connection already closed, not logging out");
            return;
        }
        match self.connection.send("LOGOUT").await {
            Ok(_) => debug!("logged out"),
            Err(e) => debug!("logout failed: {e}"),
        }
    }

    async fn open(&mut self, path: &str, access: Access) -> Result<Vec<ResponseData>, ProtocolError> {
        let command = match access {
            Access::ReadOnly => "EXAMINE",
            Access::ReadWrite => "SELECT",
        };
        match self.connection.send(&format!("{command} {}", quote(path))).await {
            Ok(responses) => {
                self.selected = Some((path.to_string(), access));
                Ok(responses)
            }
            Err(ProtocolError::No { information, .. }) => {
                self.selected = None;
                debug!("cannot select {path}: {information}");
                Err(ProtocolError::NotFound(path.to_string()))
            }
            Err(e) => {
                self.selected = None;
                Err(e)
            }
        }
    }

    /// Opens `path` unless it already is open with at least `access`.
    async fn ensure_open(&mut self, path: &str, access: Access) -> Result<(), ProtocolError> {
        let open = matches!(
            &self.selected,
            Some((selected, current))
                if selected == path && (access == Access::ReadOnly || *current == Access::ReadWrite)
        );
        if !open {
            self.open(path, access).await?;
        }
        Ok(())
    }

    fn is_selected(&self, path: &str) -> bool {
        self.selected.as_ref().is_some_and(|(selected, _)| selected == path)
    }

    /// Sends the command built by `command` once per chunk of `uids`.
    async fn send_chunked(
        &mut self,
        uids: &[Uid],
        command: impl Fn(&SequenceSet) -> String,
    ) -> Result<Vec<ResponseData>, ProtocolError> {
        let mut responses = Vec::new();
        for set in SequenceSet::chunked(uids) {
            responses.extend(self.connection.send(&command(&set)).await?);
        }
        Ok(responses)
    }
}

impl Session for ImapSession {
    async fn list_mailboxes(&mut self, root: &str) -> Result<MailboxListing, ProtocolError> {
        let responses = self
            .connection
            .send(&format!("LIST \"\" {}", quote(&format!("{root}*"))))
            .await?;

        let mut listing = MailboxListing::default();
        for response in &responses {
            if let Response::MailboxData(MailboxDatum::List {
                name_attributes,
                delimiter,
                name,
            }) = response.parsed()
            {
                if listing.delimiter.is_none() {
                    listing.delimiter = delimiter.map(|delimiter| delimiter.into_owned());
                }
                listing.mailboxes.push(ListedMailbox {
                    path: name.into_owned(),
                    selectable: !name_attributes
                        .iter()
                        .any(|attribute| matches!(attribute, NameAttribute::NoSelect)),
                });
            }
        }
        trace!("listed {} mailboxes", listing.mailboxes.len());
        Ok(listing)
    }

    async fn select_mailbox(&mut self, path: &str) -> Result<u32, ProtocolError> {
        let responses = self.open(path, Access::ReadWrite).await?;
        Ok(responses
            .iter()
            .find_map(|response| match response.parsed() {
                Response::MailboxData(MailboxDatum::Exists(exists)) => Some(exists),
                _ => None,
            })
            .unwrap_or_default())
    }

    async fn message_count(&mut self, path: &str) -> Result<MessageCount, ProtocolError> {
        let responses = self
            .connection
            .send(&format!("STATUS {} (MESSAGES UNSEEN)", quote(path)))
            .await?;

        let mut total = None;
        let mut unseen = 0;
        for response in &responses {
            if let Response::MailboxData(MailboxDatum::Status { status, .. }) = response.parsed() {
                for attribute in status {
                    match attribute {
                        StatusAttribute::Messages(messages) => total = Some(messages),
                        StatusAttribute::Unseen(count) => unseen = count,
                        _ => {}
                    }
                }
            }
        }
        let total = total.ok_or_else(|| ProtocolError::UnexpectedResponse("STATUS".to_string()))?;
        Ok(MessageCount {
            total,
            seen: total.saturating_sub(unseen),
        })
    }

    async fn search_older_than(
        &mut self,
        path: &str,
        cutoff: Timestamp,
    ) -> Result<Vec<Uid>, ProtocolError> {
        self.ensure_open(path, Access::ReadOnly).await?;
        // SEARCH compares dates in each message's own offset, which can be a
        // day ahead of UTC.
        let cutoff_date = cutoff.to_zoned(TimeZone::UTC).date();
        let before = cutoff_date.checked_add(2.days()).unwrap_or(cutoff_date);
        let responses = self
            .connection
            .send(&format!(
                "UID SEARCH UNDELETED BEFORE {}",
                before.strftime("%d-%b-%Y")
            ))
            .await?;

        let mut uids = Vec::new();
        for response in &responses {
            if let Response::MailboxData(MailboxDatum::Search(found)) = response.parsed() {
                uids.extend(found.iter().filter_map(|uid| Uid::try_from(uid).ok()));
            }
        }
        Ok(uids)
    }

    async fn internal_dates(
        &mut self,
        path: &str,
        uids: &[Uid],
    ) -> Result<Vec<Message>, ProtocolError> {
        self.ensure_open(path, Access::ReadOnly).await?;
        let responses = self
            .send_chunked(uids, |set| format!("UID FETCH {set} (UID INTERNALDATE)"))
            .await?;

        let mut messages = Vec::with_capacity(uids.len());
        for response in &responses {
            let Response::Fetch(_, attributes) = response.parsed() else {
                continue;
            };
            let mut uid = None;
            let mut received = None;
            for attribute in attributes {
                match attribute {
                    AttributeValue::Uid(value) => uid = Uid::try_from(value).ok(),
                    AttributeValue::InternalDate(date) => {
                        received = parse_internal_date(&date);
                        if received.is_none() {
                            warn!("{path}: cannot read internal date {date:?}");
                        }
                    }
                    _ => {}
                }
            }
            if let (Some(uid), Some(received)) = (uid, received) {
                messages.push(Message { uid, received });
            }
        }
        Ok(messages)
    }

    async fn copy_messages(
        &mut self,
        source: &str,
        uids: &[Uid],
        destination: &str,
    ) -> Result<(), ProtocolError> {
        self.ensure_open(source, Access::ReadOnly).await?;
        let destination = quote(destination);
        self.send_chunked(uids, |set| format!("UID COPY {set} {destination}"))
            .await?;
        Ok(())
    }

    async fn delete_messages(&mut self, source: &str, uids: &[Uid]) -> Result<(), ProtocolError> {
        self.ensure_open(source, Access::ReadWrite).await?;
        self.send_chunked(uids, |set| format!("UID STORE {set} +FLAGS.SILENT (\\Deleted)"))
            .await?;
        Ok(())
    }

    async fn expunge(&mut self, path: &str, uids: &[Uid]) -> Result<(), ProtocolError> {
        self.ensure_open(path, Access::ReadWrite).await?;
        if self.capabilities.contains(Capability::UidPlus) {
            self.send_chunked(uids, |set| format!("UID EXPUNGE {set}"))
                .await?;
        } else {
            self.connection.send("EXPUNGE").await?;
        }
        Ok(())
    }

    async fn create_mailbox(&mut self, path: &str) -> Result<(), ProtocolError> {
        let quoted = quote(path);
        match self.connection.send(&format!("CREATE {quoted}")).await {
            Ok(_) => info!("created mailbox {path}"),
            Err(ProtocolError::No { information, .. }) => {
                let existing = self.connection.send(&format!("LIST \"\" {quoted}")).await?;
                if existing.is_empty() {
                    return Err(ProtocolError::No {
                        command: "CREATE".to_string(),
                        information,
                    });
                }
                trace!("{path} already exists");
            }
            Err(e) => return Err(e),
        }
        if let Err(e) = self.connection.send(&format!("SUBSCRIBE {quoted}")).await {
            if e.is_fatal() {
                return Err(e);
            }
            debug!("cannot subscribe to {path}: {e}");
        }
        Ok(())
    }

    async fn delete_mailbox(&mut self, path: &str) -> Result<(), ProtocolError> {
        if self.is_selected(path) {
            self.connection.send("CLOSE").await?;
            self.selected = None;
        }
        let quoted = quote(path);
        match self.connection.send(&format!("DELETE {quoted}")).await {
            Ok(_) => {}
            Err(ProtocolError::No { information, .. }) if information.starts_with("[NONEXISTENT]") => {
                debug!("{path} is already gone: {information}");
                return Err(ProtocolError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e),
        }
        if let Err(e) = self.connection.send(&format!("UNSUBSCRIBE {quoted}")).await {
            if e.is_fatal() {
                return Err(e);
            }
            debug!("cannot unsubscribe from {path}: {e}");
        }
        Ok(())
    }
}
