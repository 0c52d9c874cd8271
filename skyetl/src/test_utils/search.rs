use std::collections::HashMap;

use crate::clients::PostSearch;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{SearchPage, SearchPost};

/// [`PostSearch`] serving pre-registered pages keyed by hashtag and cursor.
///
/// Unregistered requests return an empty page without a cursor.
#[derive(Debug, Clone, Default)]
pub struct StaticSearch {
    pages: HashMap<(String, Option<String>), SearchPage>,
    failure: Option<ErrorKind>,
}

impl StaticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the page returned for `hashtag` at `cursor`.
    pub fn page(
        mut self,
        hashtag: &str,
        cursor: Option<&str>,
        posts: Vec<SearchPost>,
        next: Option<&str>,
    ) -> Self {
        self.pages.insert(
            (hashtag.to_string(), cursor.map(str::to_string)),
            SearchPage {
                posts,
                cursor: next.map(str::to_string),
            },
        );
        self
    }

    /// Makes every request fail with `kind`.
    pub fn fail_with(mut self, kind: ErrorKind) -> Self {
        self.failure = Some(kind);
        self
    }
}

impl PostSearch for StaticSearch {
    async fn search(&self, hashtag: &str, cursor: Option<&str>) -> EtlResult<SearchPage> {
        if let Some(kind) = self.failure {
            return Err(etl_error!(kind, "Injected search failure", hashtag));
        }

        let key = (hashtag.to_string(), cursor.map(str::to_string));
        Ok(self.pages.get(&key).cloned().unwrap_or_default())
    }
}

/// Builds the `n`-th search result, indexed at `indexed_at`.
pub fn search_post(n: u32, indexed_at: &str) -> SearchPost {
    SearchPost {
        uri: format!("at://did:plc:author{n}/app.bsky.feed.post/{n}"),
        cid: format!("bafyreicid{n}"),
        author_handle: format!("author{n}.bsky.social"),
        text: format!("backfilled post {n}"),
        created_at: Some(indexed_at.to_string()),
        indexed_at: indexed_at.to_string(),
        langs: Some(vec!["en".to_string()]),
    }
}
