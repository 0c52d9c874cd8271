//! Historical backfill run before going live.

use metrics::gauge;
use tracing::{info, warn};

use crate::clients::PostSearch;
use crate::destination::Destination;
use crate::error::EtlResult;
use crate::filter::HashtagFilter;
use crate::ingest::batch::{BatchFlusher, FlushTrigger};
use crate::metrics::SKYETL_SEEN_POSTS;
use crate::state::{Admission, SharedIngestState};
use crate::types::{PostKey, PostRow, SearchPost};

/// Number of most recent backfilled posts logged once the backfill completes.
const RECENT_POSTS_TO_LOG: usize = 5;

/// Summary of a completed backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Distinct posts found across all hashtags.
    pub posts: usize,
    /// Search pages fetched.
    pub pages: usize,
    /// The most recently indexed posts, newest first.
    pub recent: Vec<SearchPost>,
}

/// Seeds the dedup set and the batch buffer with posts returned by the historical search.
///
/// Each hashtag is paged until the search returns no cursor or an empty page. A post found
/// under several hashtags is kept only for the first one searched. Batches reaching the
/// threshold are flushed as they fill up; the remainder stays in the buffer.
///
/// Search errors are returned unchanged: a failed backfill must prevent the pipeline from
/// going live.
pub async fn run_backfill<S, D>(
    search: &S,
    filter: &HashtagFilter,
    state: &SharedIngestState,
    flusher: &BatchFlusher<D>,
) -> EtlResult<BackfillReport>
where
    S: PostSearch + Sync,
    D: Destination + Send + Sync,
{
    let mut report = BackfillReport::default();
    let mut posts: Vec<SearchPost> = Vec::new();

    for hashtag in filter.tags() {
        info!(hashtag = %hashtag, "fetching existing posts");

        let mut cursor: Option<String> = None;
        let mut hashtag_posts = 0;
        loop {
            let page = search.search(hashtag, cursor.as_deref()).await?;
            report.pages += 1;

            let page_empty = page.posts.is_empty();
            for post in page.posts {
                let key = PostKey::from(post.uri.as_str());
                let row = PostRow::from_search(&post, hashtag);
                let Admission::Accepted { ready } = state.admit(key, vec![row])? else {
                    continue;
                };
                for batch in ready {
                    flusher.flush_rows(batch, FlushTrigger::Backfill).await;
                }

                hashtag_posts += 1;
                posts.push(post);
            }

            match page.cursor {
                Some(next) if !page_empty => cursor = Some(next),
                Some(_) => {
                    warn!(hashtag = %hashtag, "search returned a cursor with an empty page, stopping");
                    break;
                }
                None => break,
            }
        }

        info!(hashtag = %hashtag, posts = hashtag_posts, "fetched existing posts");
    }

    report.posts = posts.len();
    gauge!(SKYETL_SEEN_POSTS).increment(report.posts as f64);
    posts.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at));
    posts.truncate(RECENT_POSTS_TO_LOG);
    for post in &posts {
        info!(
            author = %post.author_handle,
            indexed_at = %post.indexed_at,
            uri = %post.uri,
            text = %post.text,
            "recent post"
        );
    }
    report.recent = posts;

    Ok(report)
}
