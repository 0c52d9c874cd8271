//! Event path: turns one commit into buffered rows.

use metrics::{counter, gauge};
use tracing::{debug, info, warn};

use crate::conversions::{BlockMap, decode_archive, decode_record};
use crate::filter::HashtagFilter;
use crate::metrics::{
    SKYETL_COMMITS_RECEIVED_TOTAL, SKYETL_COMMITS_TOO_BIG_TOTAL, SKYETL_POSTS_DUPLICATE_TOTAL,
    SKYETL_POSTS_MATCHED_TOTAL, SKYETL_RECORDS_DECODED_TOTAL, SKYETL_ROWS_BUFFERED_TOTAL,
    SKYETL_SEEN_POSTS,
};
use crate::state::{Admission, SharedIngestState};
use crate::types::{Action, CandidateRecord, CommitEvent, Operation, PostKey, PostRow};

/// What happened to a single operation of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    /// A new post matched; one row per hashtag was buffered.
    Matched { key: PostKey, hashtags: Vec<String> },
    /// The post matched but was already processed.
    Duplicate { key: PostKey },
    /// The post did not mention any configured hashtag.
    NoMatch,
    /// The operation does not create a post, or its record was unusable.
    Skipped,
    /// The operation could not be processed.
    Failed,
}

/// Outcome of processing one commit.
#[derive(Debug, Default)]
pub struct CommitResult {
    /// Per-operation outcomes, in operation order.
    pub outcomes: Vec<OpOutcome>,
    /// Batches drained because the buffer reached its threshold. They must be persisted
    /// before the next commit is processed.
    pub ready: Vec<Vec<PostRow>>,
}

impl CommitResult {
    pub fn matched(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, OpOutcome::Matched { .. }))
            .count()
    }
}

/// Runs decode, filter, dedup and append for every operation of a commit.
#[derive(Debug, Clone)]
pub struct CommitProcessor {
    filter: HashtagFilter,
    state: SharedIngestState,
}

impl CommitProcessor {
    pub fn new(filter: HashtagFilter, state: SharedIngestState) -> Self {
        Self { filter, state }
    }

    pub fn filter(&self) -> &HashtagFilter {
        &self.filter
    }

    /// Processes `commit`'s operations in order.
    ///
    /// Never fails: unusable operations are reported through [`OpOutcome`] and the remaining
    /// operations still run.
    pub fn process(&self, commit: &CommitEvent) -> CommitResult {
        counter!(SKYETL_COMMITS_RECEIVED_TOTAL).increment(1);

        if commit.too_big {
            counter!(SKYETL_COMMITS_TOO_BIG_TOTAL).increment(1);
            debug!(seq = commit.seq, repo = %commit.repo, "skipping too big commit");
            return CommitResult::default();
        }

        let Some(archive) = commit.archive() else {
            return CommitResult::default();
        };

        // Commits without a post creation are the vast majority; skip decoding their archive.
        if !commit.ops.iter().any(is_post_creation) {
            return CommitResult {
                outcomes: vec![OpOutcome::Skipped; commit.ops.len()],
                ready: vec![],
            };
        }

        let blocks = match decode_archive(archive) {
            Ok(blocks) => blocks,
            Err(err) => {
                warn!(seq = commit.seq, repo = %commit.repo, error = %err, "failed to decode commit blocks");
                return CommitResult {
                    outcomes: vec![OpOutcome::Failed; commit.ops.len()],
                    ready: vec![],
                };
            }
        };

        let mut result = CommitResult::default();
        for op in &commit.ops {
            let outcome = self.process_operation(commit, op, &blocks, &mut result.ready);
            result.outcomes.push(outcome);
        }

        result
    }

    fn process_operation(
        &self,
        commit: &CommitEvent,
        op: &Operation,
        blocks: &BlockMap,
        ready: &mut Vec<Vec<PostRow>>,
    ) -> OpOutcome {
        let raw_block = op.cid.as_ref().and_then(|cid| blocks.get(cid));
        let Some(record) = decode_record(op, raw_block) else {
            return OpOutcome::Skipped;
        };
        counter!(SKYETL_RECORDS_DECODED_TOTAL).increment(1);

        let hashtags = self.filter.matches(&record.text);
        if hashtags.is_empty() {
            return OpOutcome::NoMatch;
        }

        // A decoded create always carries a cid.
        let Some(cid) = op.cid.as_ref() else {
            return OpOutcome::Skipped;
        };

        let key = PostKey::new(&commit.repo, &op.path);
        let rows: Vec<PostRow> = hashtags
            .iter()
            .map(|hashtag| PostRow::from_record(&key, cid, &commit.repo, &record, hashtag))
            .collect();
        let row_count = rows.len();

        match self.state.admit(key.clone(), rows) {
            Ok(Admission::Accepted { ready: batches }) => {
                counter!(SKYETL_POSTS_MATCHED_TOTAL).increment(1);
                counter!(SKYETL_ROWS_BUFFERED_TOTAL).increment(row_count as u64);
                gauge!(SKYETL_SEEN_POSTS).increment(1.0);
                log_matched_post(commit, op, &key, &record, &hashtags);
                ready.extend(batches);

                OpOutcome::Matched { key, hashtags }
            }
            Ok(Admission::Duplicate) => {
                counter!(SKYETL_POSTS_DUPLICATE_TOTAL).increment(1);
                debug!(uri = %key, "skipping already processed post");

                OpOutcome::Duplicate { key }
            }
            Err(err) => {
                warn!(uri = %key, error = %err, "failed to buffer post");

                OpOutcome::Failed
            }
        }
    }
}

fn is_post_creation(op: &Operation) -> bool {
    op.action == Action::Create && op.is_post()
}

fn log_matched_post(
    commit: &CommitEvent,
    op: &Operation,
    key: &PostKey,
    record: &CandidateRecord,
    hashtags: &[String],
) {
    let hashtags = hashtags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<_>>()
        .join(", ");
    let cid = op.cid.map(|cid| cid.to_string()).unwrap_or_default();

    info!(
        hashtags = %hashtags,
        author = %commit.repo,
        uri = %key,
        rkey = op.rkey().unwrap_or_default(),
        cid = %cid,
        created_at = record.created_at.as_deref().unwrap_or_default(),
        langs = record.joined_langs().unwrap_or_default(),
        reply = record.reply,
        text = %record.text,
        "new post matched"
    );
    debug!(
        uri = %key,
        embed = ?record.embed,
        facets = ?record.facets,
        "matched post details"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::builders::{CommitBuilder, post_block};

    fn processor(tags: &[&str], max_batch_size: usize) -> CommitProcessor {
        CommitProcessor::new(
            HashtagFilter::new(tags.iter().copied()),
            SharedIngestState::new(max_batch_size),
        )
    }

    #[test]
    fn matching_create_buffers_one_row_per_hashtag() {
        let processor = processor(&["databs", "datasky"], 700);
        let (cid, block) = post_block("loving #databs today", Some("2024-05-01T10:00:00Z"));
        let commit = CommitBuilder::new(1, "did:plc:alice")
            .create_post("abc", cid, block)
            .build();

        let result = processor.process(&commit);

        let key = PostKey::new("did:plc:alice", "app.bsky.feed.post/abc");
        assert_eq!(
            result.outcomes,
            vec![OpOutcome::Matched {
                key: key.clone(),
                hashtags: vec!["databs".to_string()],
            }]
        );
        assert!(result.ready.is_empty());
        assert!(processor.state.is_seen(&key).unwrap());

        let rows = processor.state.drain().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].uri, "at://did:plc:alice/app.bsky.feed.post/abc");
        assert_eq!(rows[0].cid, cid.to_string());
        assert_eq!(rows[0].author, "did:plc:alice");
        assert_eq!(rows[0].hashtag, "databs");
        assert_eq!(rows[0].created_at.as_deref(), Some("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn post_matching_two_tags_yields_two_rows() {
        let processor = processor(&["databs", "datasky"], 700);
        let (cid, block) = post_block("#datasky meets #DataBS", None);
        let commit = CommitBuilder::new(1, "did:plc:alice")
            .create_post("abc", cid, block)
            .build();

        processor.process(&commit);

        let rows = processor.state.drain().unwrap();
        let hashtags: Vec<&str> = rows.iter().map(|row| row.hashtag.as_str()).collect();
        assert_eq!(hashtags, vec!["databs", "datasky"]);
        assert!(rows.iter().all(|row| row.uri == rows[0].uri));
    }

    #[test]
    fn duplicate_delivery_produces_no_rows() {
        let processor = processor(&["databs"], 700);
        let (cid, block) = post_block("#databs", None);
        let commit = CommitBuilder::new(1, "did:plc:alice")
            .create_post("abc", cid, block)
            .build();

        processor.process(&commit);
        let second = processor.process(&commit);

        assert!(matches!(second.outcomes[0], OpOutcome::Duplicate { .. }));
        assert_eq!(processor.state.buffered().unwrap(), 1);
    }

    #[test]
    fn delete_is_skipped_without_touching_dedup() {
        let processor = processor(&["databs"], 700);
        let (cid, block) = post_block("#databs", None);
        let commit = CommitBuilder::new(1, "did:plc:alice")
            .create_post("other", cid, block)
            .delete("app.bsky.feed.post/abc")
            .build();

        let result = processor.process(&commit);

        assert_eq!(result.outcomes[1], OpOutcome::Skipped);
        assert_eq!(processor.state.seen_count().unwrap(), 1);
        assert!(
            !processor
                .state
                .is_seen(&PostKey::new("did:plc:alice", "app.bsky.feed.post/abc"))
                .unwrap()
        );
    }

    #[test]
    fn too_big_commit_is_ignored() {
        let processor = processor(&["databs"], 700);
        let commit = CommitBuilder::new(1, "did:plc:alice").too_big().build();

        let result = processor.process(&commit);

        assert!(result.outcomes.is_empty());
        assert_eq!(processor.state.buffered().unwrap(), 0);
    }

    #[test]
    fn non_matching_and_foreign_collections() {
        let processor = processor(&["databs"], 700);
        let (first_cid, first) = post_block("nothing to see", None);
        let (like_cid, like) = post_block("#databs", None);
        let commit = CommitBuilder::new(1, "did:plc:alice")
            .create_post("abc", first_cid, first)
            .create("app.bsky.feed.like/xyz", like_cid, like)
            .build();

        let result = processor.process(&commit);

        assert_eq!(result.outcomes, vec![OpOutcome::NoMatch, OpOutcome::Skipped]);
        assert_eq!(processor.state.seen_count().unwrap(), 0);
    }

    #[test]
    fn missing_block_is_skipped() {
        let processor = processor(&["databs"], 700);
        let (cid, _) = post_block("#databs", None);
        let commit = CommitBuilder::new(1, "did:plc:alice")
            .create_post_without_block("abc", cid)
            .build();

        let result = processor.process(&commit);

        assert_eq!(result.outcomes, vec![OpOutcome::Skipped]);
    }

    #[test]
    fn corrupt_archive_fails_every_operation() {
        let processor = processor(&["databs"], 700);
        let (first_cid, first) = post_block("#databs", None);
        let (second_cid, second) = post_block("#databs again", None);
        let commit = CommitBuilder::new(1, "did:plc:alice")
            .create_post("abc", first_cid, first)
            .create_post("def", second_cid, second)
            .corrupt_blocks()
            .build();

        let result = processor.process(&commit);

        assert_eq!(result.outcomes, vec![OpOutcome::Failed, OpOutcome::Failed]);
    }

    #[test]
    fn reaching_threshold_returns_ready_batch() {
        let processor = processor(&["databs"], 2);
        let mut commit = CommitBuilder::new(1, "did:plc:alice");
        for rkey in ["a", "b", "c"] {
            let (cid, block) = post_block(&format!("#databs {rkey}"), None);
            commit = commit.create_post(rkey, cid, block);
        }

        let result = processor.process(&commit.build());

        assert_eq!(result.matched(), 3);
        assert_eq!(result.ready.len(), 1);
        assert_eq!(result.ready[0].len(), 2);
        assert_eq!(processor.state.buffered().unwrap(), 1);
    }
}
