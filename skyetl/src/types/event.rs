use bytes::Bytes;
use cid::Cid;
use std::fmt;

use crate::types::Seq;

/// Collection NSID under which posts are stored in a repository.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Kind of change carried by a repository [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    /// Parses the wire name of an action.
    ///
    /// Returns `None` for actions this crate does not know about, so that new upstream
    /// actions are skipped instead of failing the whole commit.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Action::Create),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single record change inside a [`CommitEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub action: Action,
    /// Repository path in the form `<collection>/<record key>`.
    pub path: String,
    /// Block holding the new record, absent for deletes.
    pub cid: Option<Cid>,
}

impl Operation {
    /// Returns the collection segment of the path.
    pub fn collection(&self) -> &str {
        self.path
            .split_once('/')
            .map(|(collection, _)| collection)
            .unwrap_or(&self.path)
    }

    /// Returns the record key segment of the path, if the path has one.
    pub fn rkey(&self) -> Option<&str> {
        self.path.split_once('/').map(|(_, rkey)| rkey)
    }

    /// Returns `true` when the operation targets the post collection.
    pub fn is_post(&self) -> bool {
        self.collection() == POST_COLLECTION
    }
}

/// One repository commit notification from the upstream stream.
///
/// Commits are transient: they are consumed once by the ingest worker and never stored.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    pub seq: Seq,
    /// DID of the repository that produced the commit.
    pub repo: String,
    pub ops: Vec<Operation>,
    /// CAR archive with the blocks referenced by `ops`.
    ///
    /// Absent when upstream decided not to inline the data.
    pub blocks: Option<Bytes>,
    /// Set by upstream when the commit was too large to be delivered inline.
    pub too_big: bool,
    pub time: Option<String>,
}

impl CommitEvent {
    /// Returns the archive payload when the commit carries usable blocks.
    pub fn archive(&self) -> Option<&Bytes> {
        if self.too_big {
            return None;
        }

        self.blocks.as_ref().filter(|blocks| !blocks.is_empty())
    }
}

/// Decoded upstream frame.
#[derive(Debug, Clone)]
pub enum FirehoseMessage {
    /// A repository commit.
    Commit(CommitEvent),
    /// Informational frame such as `OutdatedCursor`.
    Info {
        name: String,
        message: Option<String>,
    },
    /// Error frame; upstream closes the connection after sending it.
    Error {
        error: String,
        message: Option<String>,
    },
    /// Any other frame type (identity, account, sync, ...), ignored by the pipeline.
    Other { kind: String },
}
