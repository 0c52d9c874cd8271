use ciborium::Value;
use std::fmt;

/// URI scheme used to build canonical post identifiers.
const POST_KEY_SCHEME: &str = "at";

/// Decoded content of a post-shaped record.
///
/// Optional fields are `None` when the raw record does not carry them, never an empty
/// placeholder, so that "absent" and "present but empty" stay distinguishable.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub text: String,
    /// Creation timestamp as written by the author's client (`createdAt`).
    pub created_at: Option<String>,
    pub langs: Option<Vec<String>>,
    /// Embedded content descriptor (images, external links, quoted records).
    pub embed: Option<Value>,
    /// Rich text annotations such as mentions, links and tags.
    pub facets: Option<Vec<Value>>,
    /// Whether the post is a reply to another post.
    pub reply: bool,
}

impl CandidateRecord {
    /// Returns the languages joined by commas, or `None` when no language is declared.
    pub fn joined_langs(&self) -> Option<String> {
        join_langs(self.langs.as_deref())
    }
}

/// Joins language tags with commas, treating an empty list the same as an absent one.
pub(crate) fn join_langs(langs: Option<&[String]>) -> Option<String> {
    match langs {
        Some(langs) if !langs.is_empty() => Some(langs.join(",")),
        _ => None,
    }
}

/// Canonical identifier of a post, `at://<repo>/<path>`.
///
/// Post keys are the element type of the deduplication set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PostKey(String);

impl PostKey {
    /// Builds the key for the record at `path` inside `repo`.
    pub fn new(repo: &str, path: &str) -> Self {
        Self(format!("{POST_KEY_SCHEME}://{repo}/{path}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PostKey {
    /// Wraps an already canonical URI, as returned by the search API.
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

impl From<&str> for PostKey {
    fn from(uri: &str) -> Self {
        Self(uri.to_string())
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
