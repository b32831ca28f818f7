use std::collections::{BTreeMap, BTreeSet};

use derive_getters::Getters;
use log::{debug, trace};
use thiserror::Error;

use crate::session::{MailboxListing, ProtocolError, Session};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cannot list mailboxes under {root:?}: {source}")]
    Listing {
        root: String,
        source: ProtocolError,
    },
    #[error("mailbox {0} does not exist on the server")]
    RootNotFound(String),
}

#[derive(Debug, Getters)]
pub struct MailboxNode {
    #[getter(skip)]
    children: BTreeSet<String>,
    /// `false` for intermediate levels the server did not report.
    listed: bool,
    selectable: bool,
}

impl MailboxNode {
    fn new(listed: bool, selectable: bool) -> Self {
        Self {
            children: BTreeSet::new(),
            listed,
            selectable,
        }
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Mailbox hierarchy below one root, keyed by full path.
///
/// Every node's path is its parent's path plus one segment. Children are
/// kept sorted, so traversals visit mailboxes in the same order on every
/// run against the same server state.
#[derive(Debug)]
pub struct MailboxTree {
    root: String,
    delimiter: Option<String>,
    nodes: BTreeMap<String, MailboxNode>,
}

impl MailboxTree {
    pub async fn build<S: Session>(session: &mut S, root: &str) -> Result<Self, DiscoveryError> {
        debug!("listing mailboxes under {root:?}");
        let listing =
            session
                .list_mailboxes(root)
                .await
                .map_err(|source| DiscoveryError::Listing {
                    root: root.to_string(),
                    source,
                })?;
        Self::from_listing(root, listing)
    }

    pub fn from_listing(root: &str, listing: MailboxListing) -> Result<Self, DiscoveryError> {
        let mut tree = Self {
            root: root.to_string(),
            delimiter: listing.delimiter,
            nodes: BTreeMap::new(),
        };
        tree.nodes.insert(
            root.to_string(),
            MailboxNode::new(root.is_empty(), false),
        );

        let mut root_found = root.is_empty();
        for mailbox in listing.mailboxes {
            if mailbox.path == root {
                root_found = true;
                let node = tree.node_mut(root);
                node.listed = true;
                node.selectable = mailbox.selectable;
            } else if tree.is_below_root(&mailbox.path) {
                root_found = true;
                tree.insert(mailbox.path, mailbox.selectable);
            } else {
                trace!("ignoring {} outside of {root:?}", mailbox.path);
            }
        }

        if root_found {
            Ok(tree)
        } else {
            Err(DiscoveryError::RootNotFound(root.to_string()))
        }
    }

    fn insert(&mut self, path: String, selectable: bool) {
        if let Some(node) = self.nodes.get_mut(&path) {
            node.listed = true;
            node.selectable = selectable;
            return;
        }
        let parent = self.parent_of(&path);
        if !self.nodes.contains_key(&parent) {
            self.insert_intermediate(parent.clone());
        }
        self.node_mut(&parent).children.insert(path.clone());
        self.nodes.insert(path, MailboxNode::new(true, selectable));
    }

    fn insert_intermediate(&mut self, path: String) {
        trace!("adding unlisted intermediate mailbox {path}");
        let parent = self.parent_of(&path);
        if !self.nodes.contains_key(&parent) {
            self.insert_intermediate(parent.clone());
        }
        self.node_mut(&parent).children.insert(path.clone());
        self.nodes.insert(path, MailboxNode::new(false, false));
    }

    fn parent_of(&self, path: &str) -> String {
        self.delimiter
            .as_deref()
            .and_then(|delimiter| path.rsplit_once(delimiter))
            .map_or_else(String::new, |(parent, _)| parent.to_string())
    }

    fn node_mut(&mut self, path: &str) -> &mut MailboxNode {
        self.nodes
            .get_mut(path)
            .expect("nodes are inserted before they are referenced")
    }

    pub fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    pub fn get(&self, path: &str) -> Option<&MailboxNode> {
        self.nodes.get(path)
    }

    /// Number of mailboxes strictly below the root.
    pub fn mailbox_count(&self) -> usize {
        self.nodes.len() - 1
    }

    fn is_below_root(&self, path: &str) -> bool {
        path != self.root && is_within(path, &self.root, self.delimiter())
    }

    /// Number of segments between the root and `path`, starting at 1 for
    /// the root's children.
    pub fn depth(&self, path: &str) -> usize {
        let mut depth = 0;
        let mut current = path.to_string();
        while current != self.root && !current.is_empty() {
            depth += 1;
            current = self.parent_of(&current);
        }
        depth
    }

    /// `path` with the root and its delimiter stripped off.
    pub fn relative_path<'a>(&self, path: &'a str) -> &'a str {
        if self.root.is_empty() {
            return path;
        }
        self.delimiter
            .as_deref()
            .and_then(|delimiter| {
                path.strip_prefix(self.root.as_str())?
                    .strip_prefix(delimiter)
            })
            .unwrap_or(path)
    }

    /// Mailboxes below the root, every parent before its children.
    pub fn pre_order(&self) -> Vec<String> {
        let mut order = Vec::with_capacity(self.mailbox_count());
        let mut stack: Vec<&str> = self.nodes[&self.root].children().rev().collect();
        while let Some(path) = stack.pop() {
            order.push(path.to_string());
            stack.extend(self.nodes[path].children().rev());
        }
        order
    }

    /// Mailboxes below the root, every parent after all of its children.
    pub fn post_order(&self) -> Vec<String> {
        let mut order = Vec::with_capacity(self.mailbox_count());
        let mut stack: Vec<(&str, bool)> = self.nodes[&self.root]
            .children()
            .rev()
            .map(|child| (child, false))
            .collect();
        while let Some((path, expanded)) = stack.pop() {
            if expanded {
                order.push(path.to_string());
            } else {
                stack.push((path, true));
                stack.extend(self.nodes[path].children().rev().map(|child| (child, false)));
            }
        }
        order
    }

    /// Drops a childless mailbox from the tree. The root always stays.
    pub fn remove_leaf(&mut self, path: &str) -> bool {
        if path == self.root || self.nodes.get(path).is_none_or(MailboxNode::has_children) {
            return false;
        }
        self.nodes.remove(path);
        let parent = self.parent_of(path);
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.remove(path);
        }
        true
    }
}

/// Whether `path` is `ancestor` itself or nested somewhere below it.
pub fn is_within(path: &str, ancestor: &str, delimiter: Option<&str>) -> bool {
    if ancestor.is_empty() || path == ancestor {
        return true;
    }
    delimiter.is_some_and(|delimiter| {
        path.strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with(delimiter))
    })
}

/// Joins non-empty segments with the hierarchy delimiter.
pub fn join(segments: &[&str], delimiter: &str) -> String {
    segments
        .iter()
        .filter(|segment| !segment.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(delimiter)
}
