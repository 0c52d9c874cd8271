use std::path::PathBuf;

use crate::types::record::join_langs;
use crate::types::{CandidateRecord, Cid, PostKey, SearchPost};

/// Persisted shape of a matched post.
///
/// One row is produced per (post, matching hashtag) pair, so a post matching two configured
/// hashtags yields two rows that differ only in [`PostRow::hashtag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRow {
    pub uri: String,
    pub cid: String,
    /// Author of the post: the handle for backfilled posts, the repository DID for live ones.
    pub author: String,
    pub text: String,
    pub created_at: Option<String>,
    pub hashtag: String,
    /// Comma-joined language tags.
    pub langs: Option<String>,
}

impl PostRow {
    /// Builds a row for a post observed on the live stream.
    pub fn from_record(
        key: &PostKey,
        cid: &Cid,
        repo: &str,
        record: &CandidateRecord,
        hashtag: &str,
    ) -> Self {
        Self {
            uri: key.as_str().to_string(),
            cid: cid.to_string(),
            author: repo.to_string(),
            text: record.text.clone(),
            created_at: record.created_at.clone(),
            hashtag: hashtag.to_string(),
            langs: record.joined_langs(),
        }
    }

    /// Builds a row for a post returned by the historical search.
    pub fn from_search(post: &SearchPost, hashtag: &str) -> Self {
        Self {
            uri: post.uri.clone(),
            cid: post.cid.clone(),
            author: post.author_handle.clone(),
            text: post.text.clone(),
            created_at: post.created_at.clone(),
            hashtag: hashtag.to_string(),
            langs: join_langs(post.langs.as_deref()),
        }
    }
}

/// A batch file written by a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    pub path: PathBuf,
    pub rows: usize,
}
