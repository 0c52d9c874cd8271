//! Hashtag matching over post text.

/// Matches post text against a fixed, ordered set of hashtags.
///
/// Matching is a case-insensitive substring test for `#<tag>`, without word boundaries: the
/// tag `rust` also matches `#rustlang` and `example.com/#rust`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashtagFilter {
    tags: Vec<String>,
    needles: Vec<String>,
}

impl HashtagFilter {
    /// Builds a filter from configured tags.
    ///
    /// Tags are lowercased with any leading `#` stripped. Empty tags are dropped and
    /// duplicates keep their first position.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for tag in tags {
            let tag = normalize_tag(tag.as_ref());
            if !tag.is_empty() && !normalized.contains(&tag) {
                normalized.push(tag);
            }
        }

        let needles = normalized.iter().map(|tag| format!("#{tag}")).collect();

        Self {
            tags: normalized,
            needles,
        }
    }

    /// Returns the configured tags, in configuration order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns the configured tags occurring in `text`, in configuration order.
    ///
    /// An empty result means the post should be skipped.
    pub fn matches(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();

        self.tags
            .iter()
            .zip(&self.needles)
            .filter(|(_, needle)| text.contains(needle.as_str()))
            .map(|(tag, _)| tag.clone())
            .collect()
    }
}

/// Lowercases a tag and strips a single leading `#`.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    tag.strip_prefix('#').unwrap_or(tag).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_configured_tag() {
        let filter = HashtagFilter::new(["databs", "datasky"]);

        assert_eq!(filter.matches("loving #databs today"), vec!["databs"]);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let filter = HashtagFilter::new(["DataBS"]);

        assert_eq!(filter.tags(), ["databs"]);
        assert_eq!(filter.matches("Loving #DATABS"), vec!["databs"]);
    }

    #[test]
    fn returns_all_matches_in_configured_order() {
        let filter = HashtagFilter::new(["datasky", "databs", "rust"]);

        assert_eq!(
            filter.matches("#databs and #datasky"),
            vec!["datasky", "databs"]
        );
    }

    #[test]
    fn no_match_is_empty() {
        let filter = HashtagFilter::new(["databs"]);

        assert!(filter.matches("databs without the hash").is_empty());
        assert!(filter.matches("").is_empty());
    }

    #[test]
    fn prefix_tags_also_match() {
        let filter = HashtagFilter::new(["data"]);

        assert_eq!(filter.matches("#databs"), vec!["data"]);
        assert_eq!(filter.matches("see https://x.dev/#data"), vec!["data"]);
    }

    #[test]
    fn configuration_is_normalized() {
        let filter = HashtagFilter::new(["#Rust", "rust", " ", "#", "duckdb"]);

        assert_eq!(filter.tags(), ["rust", "duckdb"]);
        assert!(!filter.is_empty());
    }

    #[test]
    fn result_is_exactly_the_occurring_subset() {
        let tags = ["a1", "b2", "c3", "d4"];
        let filter = HashtagFilter::new(tags);
        let texts = [
            "#a1 #c3",
            "nothing here",
            "#D4#b2",
            "#a1#b2#c3#d4",
            "a1 b2 #c 3",
        ];

        for text in texts {
            let lowered = text.to_lowercase();
            let expected: Vec<&str> = tags
                .iter()
                .copied()
                .filter(|tag| lowered.contains(&format!("#{tag}")))
                .collect();
            assert_eq!(filter.matches(text), expected, "text: {text}");
        }
    }
}
