//! Heading descriptions.

use serde::{Deserialize, Serialize};

use super::NodeId;

/// Prefix of identifiers assigned to headings without an `id`.
pub const GENERATED_ID_PREFIX: &str = "pagefit-heading-";

/// A heading found in the rendered tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingInfo {
    /// Element id, or a generated one when the element has none
    pub id: String,
    /// Heading level (1-6)
    pub level: u8,
    /// Heading text
    pub text: String,
    /// Top offset, when the provider reports one
    pub y: Option<f64>,
    /// Full box height, once measured
    pub height: Option<f64>,
}

impl HeadingInfo {
    /// Create a heading description.
    pub fn new(id: impl Into<String>, level: u8, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level,
            text: text.into(),
            y: None,
            height: None,
        }
    }

    /// Stable identifier for the `index`-th heading in document order.
    pub fn generated_id(index: usize) -> String {
        format!("{}{}", GENERATED_ID_PREFIX, index)
    }

    /// Parse a generated identifier back into its document-order index.
    pub fn generated_index(id: &str) -> Option<usize> {
        id.strip_prefix(GENERATED_ID_PREFIX)?.parse().ok()
    }
}

/// A heading element located by the measurement provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadingRef {
    pub node: NodeId,
    pub level: u8,
    /// Position among all headings, in document order
    pub index: usize,
}

impl HeadingRef {
    /// Whether a heading of this level may own a figure block.
    pub fn is_candidate(&self) -> bool {
        (1..=3).contains(&self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_round_trip() {
        let id = HeadingInfo::generated_id(7);
        assert_eq!(id, "pagefit-heading-7");
        assert_eq!(HeadingInfo::generated_index(&id), Some(7));
        assert_eq!(HeadingInfo::generated_index("intro"), None);
    }

    #[test]
    fn test_candidate_levels() {
        let heading = |level| HeadingRef {
            node: NodeId(1),
            level,
            index: 0,
        };
        assert!(heading(1).is_candidate());
        assert!(heading(3).is_candidate());
        assert!(!heading(4).is_candidate());
    }
}
