use log::{debug, info, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::Failure,
    session::{ProtocolError, Session},
    tree::{DiscoveryError, MailboxTree},
};

#[derive(Debug, Default)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub failures: Vec<Failure>,
    pub cancelled: bool,
}

/// Deletes every mailbox below `root` that holds no messages and has no
/// remaining children.
///
/// Children are handled before their parents, so a parent whose children
/// all went away becomes a candidate itself within the same run. `root` is
/// never deleted.
pub async fn prune<S: Session>(
    session: &mut S,
    root: &str,
    cancel: &CancellationToken,
) -> Result<PruneReport, DiscoveryError> {
    let mut tree = MailboxTree::build(session, root).await?;
    let mut report = PruneReport::default();
    info!(
        "looking for empty mailboxes among {} below {root:?}",
        tree.mailbox_count()
    );

    for path in tree.post_order() {
        if cancel.is_cancelled() {
            info!("cancelled before {path}");
            report.cancelled = true;
            break;
        }
        let Some(node) = tree.get(&path) else {
            continue;
        };
        if node.has_children() {
            trace!("keeping {path}, it still has children");
            continue;
        }
        if !node.listed() {
            debug!("{path} only existed as part of a longer name");
            tree.remove_leaf(&path);
            continue;
        }

        if node.selectable() {
            match session.message_count(&path).await {
                Ok(count) if count.total > 0 => {
                    trace!("keeping {path}, it holds {} messages", count.total);
                    continue;
                }
                Ok(_) => {}
                Err(error) => {
                    warn!("cannot count messages in {path}: {error}");
                    let fatal = error.is_fatal();
                    report.failures.push(Failure::new(&path, error));
                    if fatal {
                        break;
                    }
                    continue;
                }
            }
        }

        let selectable = node.selectable();
        match session.delete_mailbox(&path).await {
            Ok(()) => {
                info!("deleted empty mailbox {path}");
                tree.remove_leaf(&path);
                report.deleted.push(path);
            }
            Err(ProtocolError::NotFound(_)) if !selectable => {
                debug!("{path} went away with its last child");
                tree.remove_leaf(&path);
            }
            Err(error) => {
                warn!("cannot delete {path}: {error}");
                let fatal = error.is_fatal();
                report.failures.push(Failure::new(&path, error));
                if fatal {
                    break;
                }
            }
        }
    }

    Ok(report)
}
