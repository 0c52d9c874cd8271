use std::mem;

use crate::types::PostRow;

/// Ordered rows waiting to be persisted.
#[derive(Debug, Default)]
pub struct BatchBuffer {
    rows: Vec<PostRow>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, row: PostRow) {
        self.rows.push(row);
    }

    /// Takes every buffered row, in append order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<PostRow> {
        mem::take(&mut self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::builders::row;

    #[test]
    fn len_counts_appends() {
        let mut buffer = BatchBuffer::new();
        for i in 0..5 {
            buffer.append(row(&format!("at://did:plc:a/app.bsky.feed.post/{i}"), "rust"));
        }

        assert_eq!(buffer.len(), 5);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn drain_returns_rows_in_order_and_clears() {
        let mut buffer = BatchBuffer::new();
        let rows: Vec<PostRow> = (0..3)
            .map(|i| row(&format!("at://did:plc:a/app.bsky.feed.post/{i}"), "rust"))
            .collect();
        for row in rows.clone() {
            buffer.append(row);
        }

        assert_eq!(buffer.drain(), rows);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.drain().is_empty());
    }
}
