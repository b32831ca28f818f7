use std::collections::{BTreeMap, HashSet};

use jiff::Timestamp;
use log::{debug, info, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::{EngineError, Failure},
    session::{Message, ProtocolError, Session, Uid},
    tree::{DiscoveryError, MailboxTree, is_within, join},
};

#[derive(Debug)]
pub struct ArchiveOptions {
    archive_root: String,
    cutoff: Timestamp,
    /// Mailboxes whose own messages stay where they are.
    omit: Vec<String>,
}

impl ArchiveOptions {
    pub fn new(archive_root: impl Into<String>, cutoff: Timestamp) -> Self {
        Self {
            archive_root: archive_root.into(),
            cutoff,
            omit: Vec::new(),
        }
    }

    pub fn omitting(mut self, omit: Vec<String>) -> Self {
        self.omit = omit;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Moved {
    pub source: String,
    pub year: i16,
    pub destination: String,
    pub count: usize,
}

#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub moved: Vec<Moved>,
    pub failures: Vec<Failure>,
    pub cancelled: bool,
}

/// Destination of messages from year `year` found in the mailbox at
/// `relative_path` below the archived root.
pub fn archive_target(archive_root: &str, year: i16, relative_path: &str, delimiter: &str) -> String {
    join(&[archive_root, &year.to_string(), relative_path], delimiter)
}

/// Moves messages older than the cutoff out of every mailbox below
/// `source_root` into `<archive root>/<year>/<relative path>`.
///
/// Mailboxes are visited parents first. The archive tree itself is never
/// archived, even when it lives below `source_root`. A failing year group
/// is recorded and the walk goes on.
pub async fn archive<S: Session>(
    session: &mut S,
    source_root: &str,
    options: &ArchiveOptions,
    cancel: &CancellationToken,
) -> Result<ArchiveReport, DiscoveryError> {
    let tree = MailboxTree::build(session, source_root).await?;
    let mut report = ArchiveReport::default();
    let Some(delimiter) = tree.delimiter() else {
        warn!("server has a flat namespace, nothing below {source_root:?} to archive");
        return Ok(report);
    };
    info!(
        "archiving messages before {} from {} mailboxes below {source_root:?} to {}",
        options.cutoff,
        tree.mailbox_count(),
        options.archive_root
    );

    let mut archiver = Archiver {
        session,
        options,
        delimiter,
        ensured: HashSet::new(),
    };
    for path in tree.pre_order() {
        if cancel.is_cancelled() {
            info!("cancelled before {path}");
            report.cancelled = true;
            break;
        }
        if is_within(&path, &options.archive_root, Some(delimiter)) {
            debug!("skipping {path}, it is part of the archive");
            continue;
        }
        if options.omit.contains(&path) {
            info!("omitting {path}");
            continue;
        }
        if !tree.get(&path).is_some_and(|node| node.selectable()) {
            trace!("{path} cannot hold messages");
            continue;
        }
        archiver
            .archive_mailbox(&path, tree.relative_path(&path), &mut report)
            .await;
        if report.failures.last().is_some_and(|failure| failure.error.is_fatal()) {
            warn!("lost the connection, stopping at {path}");
            break;
        }
    }

    Ok(report)
}

struct Archiver<'a, S> {
    session: &'a mut S,
    options: &'a ArchiveOptions,
    delimiter: &'a str,
    /// Destination mailboxes known to exist during this run.
    ensured: HashSet<String>,
}

impl<S: Session> Archiver<'_, S> {
    async fn archive_mailbox(&mut self, path: &str, relative_path: &str, report: &mut ArchiveReport) {
        let old = match self.old_messages(path).await {
            Ok(old) => old,
            Err(error) => {
                warn!("cannot search {path}: {error}");
                report.failures.push(Failure::new(path, error));
                return;
            }
        };
        if old.is_empty() {
            trace!("{path} has no old messages");
            return;
        }

        let mut by_year: BTreeMap<i16, Vec<Uid>> = BTreeMap::new();
        for message in old {
            by_year
                .entry(message.received.year())
                .or_default()
                .push(message.uid);
        }

        for (year, uids) in by_year {
            let destination =
                archive_target(&self.options.archive_root, year, relative_path, self.delimiter);
            match self.move_group(path, &uids, &destination).await {
                Ok(()) => {
                    info!("moved {} messages from {path} to {destination}", uids.len());
                    report.moved.push(Moved {
                        source: path.to_string(),
                        year,
                        destination,
                        count: uids.len(),
                    });
                }
                Err(error) => {
                    warn!("{path}: {error}");
                    report.failures.push(Failure::new(path, error));
                }
            }
        }
    }

    async fn old_messages(&mut self, path: &str) -> Result<Vec<Message>, ProtocolError> {
        let cutoff = self.options.cutoff;
        if self.session.select_mailbox(path).await? == 0 {
            return Ok(Vec::new());
        }
        let uids = self.session.search_older_than(path, cutoff).await?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let mut messages = self.session.internal_dates(path, &uids).await?;
        messages.retain(|message| message.received.timestamp() < cutoff);
        Ok(messages)
    }

    /// Copies `uids` to `destination` and removes them from `source` only
    /// once the destination holds the additional messages.
    async fn move_group(
        &mut self,
        source: &str,
        uids: &[Uid],
        destination: &str,
    ) -> Result<(), EngineError> {
        let failed = |error| EngineError::Move {
            destination: destination.to_string(),
            count: uids.len(),
            source: error,
        };

        self.ensure_mailbox(destination).await.map_err(failed)?;
        let before = self
            .session
            .message_count(destination)
            .await
            .map_err(failed)?
            .total;
        self.session
            .copy_messages(source, uids, destination)
            .await
            .map_err(failed)?;

        let expected = before.saturating_add(u32::try_from(uids.len()).unwrap_or(u32::MAX));
        let found = self
            .session
            .message_count(destination)
            .await
            .map_err(failed)?
            .total;
        if found < expected {
            return Err(EngineError::CopyUnconfirmed {
                destination: destination.to_string(),
                expected,
                found,
            });
        }

        self.session
            .delete_messages(source, uids)
            .await
            .map_err(failed)?;
        self.session.expunge(source, uids).await.map_err(failed)
    }

    /// Creates `path` and every missing ancestor of it.
    async fn ensure_mailbox(&mut self, path: &str) -> Result<(), ProtocolError> {
        let mut prefix = String::with_capacity(path.len());
        for segment in path.split(self.delimiter) {
            if !prefix.is_empty() {
                prefix.push_str(self.delimiter);
            }
            prefix.push_str(segment);
            if self.ensured.contains(&prefix) {
                continue;
            }
            debug!("ensuring mailbox {prefix} exists");
            self.session.create_mailbox(&prefix).await?;
            self.ensured.insert(prefix.clone());
        }
        Ok(())
    }
}
