use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// No hashtag was configured.
    #[error("`pipeline.hashtags` must contain at least one hashtag")]
    NoHashtags,
    /// A configured hashtag is empty once `#` and whitespace are stripped.
    #[error("`pipeline.hashtags` contains an empty hashtag at position {0}")]
    EmptyHashtag(usize),
    /// A field holds a value outside its allowed range.
    #[error("`{field}` {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
