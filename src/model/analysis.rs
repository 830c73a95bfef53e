//! Result of one analysis pass.

use serde::{Deserialize, Serialize};

use super::{DiagramBlock, HeadingInfo, PageFacts};

/// Snapshot of every overflowing heading + figure pair in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutAnalysis {
    /// Full page height
    pub page_height: f64,
    /// Effective page height before accounting for content above headings
    pub available_height: f64,
    /// Overflowing blocks, in document order
    pub blocks: Vec<DiagramBlock>,
    /// Candidate headings that were examined
    #[serde(default)]
    pub headings: Vec<HeadingInfo>,
    /// Page facts the numbers were derived from
    pub page_facts: PageFacts,
    /// True when measurement failed and nominal values were used
    pub degraded: bool,
}

impl LayoutAnalysis {
    /// Create an analysis from measured page facts.
    pub fn new(page_facts: PageFacts, blocks: Vec<DiagramBlock>) -> Self {
        Self {
            page_height: page_facts.page_height,
            available_height: page_facts.effective_height(),
            blocks,
            headings: Vec::new(),
            page_facts,
            degraded: false,
        }
    }

    /// Attach the examined headings.
    pub fn with_headings(mut self, headings: Vec<HeadingInfo>) -> Self {
        self.headings = headings;
        self
    }

    /// Empty analysis on nominal A4 dimensions.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::new(PageFacts::nominal_a4(), Vec::new())
        }
    }

    /// Check if nothing overflows.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Get the number of overflowing blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Find a block by heading id.
    pub fn block(&self, heading_id: &str) -> Option<&DiagramBlock> {
        self.blocks.iter().find(|b| b.heading_id == heading_id)
    }

    /// Largest overflow ratio among blocks with a meaningful ratio.
    pub fn max_overflow_ratio(&self) -> Option<f64> {
        self.blocks
            .iter()
            .filter(|b| b.has_valid_ratio())
            .map(|b| b.overflow_ratio)
            .fold(None, |acc, r| Some(acc.map_or(r, |a: f64| a.max(r))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_analysis() {
        let analysis = LayoutAnalysis::degraded();
        assert!(analysis.degraded);
        assert!(analysis.is_empty());
        assert!(!analysis.page_facts.measured);
        assert_eq!(analysis.page_height, PageFacts::A4_HEIGHT_PX);
        assert_eq!(analysis.max_overflow_ratio(), None);
    }

    #[test]
    fn test_new_uses_effective_height() {
        let facts = PageFacts::new(1000.0).with_margins(50.0, 50.0);
        let analysis = LayoutAnalysis::new(facts, Vec::new());
        assert_eq!(analysis.available_height, 900.0);
        assert!(!analysis.degraded);
    }
}
