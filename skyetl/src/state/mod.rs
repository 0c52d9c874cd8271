//! In-memory ingestion state shared by the event and timer paths.

pub mod buffer;
pub mod dedup;

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{PostKey, PostRow};

pub use buffer::BatchBuffer;
pub use dedup::DedupSet;

/// Result of offering a matched post to the [`IngestState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The post was new and its rows were buffered. Carries the batches that reached the
    /// threshold while appending, which the caller must persist.
    Accepted { ready: Vec<Vec<PostRow>> },
    /// The post had already been processed.
    Duplicate,
}

/// Dedup set and batch buffer guarded together.
#[derive(Debug)]
pub struct IngestState {
    dedup: DedupSet,
    buffer: BatchBuffer,
    max_batch_size: usize,
}

impl IngestState {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            dedup: DedupSet::new(),
            buffer: BatchBuffer::new(),
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    pub fn buffer(&self) -> &BatchBuffer {
        &self.buffer
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Checks and marks `key`, then appends `rows` if the key is new.
    ///
    /// The threshold is checked after each append, so a full batch is drained before the next
    /// row of the same post is accepted.
    pub fn admit(&mut self, key: PostKey, rows: Vec<PostRow>) -> Admission {
        if !self.dedup.insert(key) {
            return Admission::Duplicate;
        }

        let mut ready = Vec::new();
        for row in rows {
            if let Some(batch) = self.append(row) {
                ready.push(batch);
            }
        }

        Admission::Accepted { ready }
    }

    /// Appends one row and drains the buffer if it reached the threshold.
    pub fn append(&mut self, row: PostRow) -> Option<Vec<PostRow>> {
        self.buffer.append(row);

        if self.buffer.len() >= self.max_batch_size {
            return Some(self.buffer.drain());
        }

        None
    }

    pub fn seen(&self, key: &PostKey) -> bool {
        self.dedup.seen(key)
    }

    pub fn drain(&mut self) -> Vec<PostRow> {
        self.buffer.drain()
    }
}

/// Handle to the [`IngestState`] shared between workers.
///
/// Every critical section is a handful of in-memory operations; I/O always happens on rows
/// already taken out of the buffer.
#[derive(Debug, Clone)]
pub struct SharedIngestState {
    inner: Arc<Mutex<IngestState>>,
}

impl SharedIngestState {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(IngestState::new(max_batch_size))),
        }
    }

    /// Locks the state.
    ///
    /// Fails only if a thread panicked while holding the lock.
    pub fn lock(&self) -> EtlResult<MutexGuard<'_, IngestState>> {
        self.inner.lock().map_err(|_| {
            etl_error!(
                ErrorKind::InvalidState,
                "Ingest state lock is poisoned"
            )
        })
    }

    pub fn admit(&self, key: PostKey, rows: Vec<PostRow>) -> EtlResult<Admission> {
        Ok(self.lock()?.admit(key, rows))
    }

    pub fn drain(&self) -> EtlResult<Vec<PostRow>> {
        Ok(self.lock()?.drain())
    }

    pub fn buffered(&self) -> EtlResult<usize> {
        Ok(self.lock()?.buffer().len())
    }

    pub fn seen_count(&self) -> EtlResult<usize> {
        Ok(self.lock()?.dedup().len())
    }

    pub fn is_seen(&self, key: &PostKey) -> EtlResult<bool> {
        Ok(self.lock()?.seen(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::builders::row;

    fn key(n: usize) -> PostKey {
        PostKey::new("did:plc:a", &format!("app.bsky.feed.post/{n}"))
    }

    #[test]
    fn duplicate_keys_are_not_buffered_twice() {
        let mut state = IngestState::new(10);

        let first = state.admit(key(1), vec![row("at://1", "rust")]);
        let second = state.admit(key(1), vec![row("at://1", "rust")]);

        assert_eq!(first, Admission::Accepted { ready: vec![] });
        assert_eq!(second, Admission::Duplicate);
        assert_eq!(state.buffer().len(), 1);
        assert_eq!(state.dedup().len(), 1);
    }

    #[test]
    fn threshold_drains_before_next_append() {
        let mut state = IngestState::new(3);

        for n in 0..2 {
            assert!(state.append(row(&format!("at://{n}"), "rust")).is_none());
        }
        let batch = state.append(row("at://2", "rust")).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(state.buffer().len(), 0);

        assert!(state.append(row("at://3", "rust")).is_none());
        assert_eq!(state.buffer().len(), 1);
    }

    #[test]
    fn multi_tag_post_can_split_across_batches() {
        let mut state = IngestState::new(2);
        state.append(row("at://0", "rust"));

        let admission = state.admit(
            key(1),
            vec![row("at://1", "rust"), row("at://1", "duckdb")],
        );

        let Admission::Accepted { ready } = admission else {
            panic!("expected the post to be accepted");
        };
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].len(), 2);
        assert_eq!(state.buffer().len(), 1);
    }

    #[test]
    fn shared_state_is_visible_across_clones() {
        let state = SharedIngestState::new(10);
        let other = state.clone();

        state.admit(key(1), vec![row("at://1", "rust")]).unwrap();

        assert_eq!(other.buffered().unwrap(), 1);
        assert!(other.is_seen(&key(1)).unwrap());
        assert_eq!(other.drain().unwrap().len(), 1);
        assert_eq!(state.buffered().unwrap(), 0);
        assert_eq!(state.seen_count().unwrap(), 1);
    }
}
