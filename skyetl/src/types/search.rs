/// A post returned by the historical search API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPost {
    pub uri: String,
    pub cid: String,
    pub author_handle: String,
    pub text: String,
    pub created_at: Option<String>,
    pub indexed_at: String,
    pub langs: Option<Vec<String>>,
}

/// One page of historical search results.
///
/// Pagination ends when [`SearchPage::cursor`] is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub posts: Vec<SearchPost>,
    pub cursor: Option<String>,
}
