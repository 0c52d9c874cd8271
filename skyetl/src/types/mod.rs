//! Core data types flowing through the ingestion pipeline.

mod event;
mod record;
mod row;
mod search;

pub use cid::Cid;
pub use event::{Action, CommitEvent, FirehoseMessage, Operation, POST_COLLECTION};
pub use record::{CandidateRecord, PostKey};
pub use row::{BatchFile, PostRow};
pub use search::{SearchPage, SearchPost};

/// Sequence number assigned by the upstream firehose to each event.
pub type Seq = i64;
