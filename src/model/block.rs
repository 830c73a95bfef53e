//! Heading + figure blocks that need attention.

use serde::{Deserialize, Serialize};

use super::BoxSizing;
use crate::error::{Error, Result};

/// Kind of figure following a heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramType {
    /// Inline vector figure (`<svg>`)
    Svg,
    /// Raster element sourcing an SVG file (`<img src="*.svg">`)
    Image,
}

impl DiagramType {
    /// Tag name of the figure element.
    pub fn tag(&self) -> &'static str {
        match self {
            DiagramType::Svg => "svg",
            DiagramType::Image => "img",
        }
    }
}

/// Where the analyzer believes the heading lands on its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagePosition {
    /// Two or more pages of content above: top of a fresh page
    TopOfLaterPage,
    /// One page above, little left over
    AfterPageTight,
    /// One page above, remainder large enough that the heading probably flowed on
    AfterPageFlowed,
    /// Almost nothing above it
    NearTop,
    /// Same page, content above under the same-page fraction
    SamePage,
    /// Same page, but far enough down that it probably flowed on
    SamePageFlowed,
}

/// Decision fields written back by the scaling engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub final_scale_factor: f64,
    pub final_total_height: f64,
    pub target_height: f64,
    pub scale_entire_block: bool,
    pub needs_pre_break: bool,
    pub force_post_break: bool,
}

/// How the analyzer arrived at a block's numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBreakdown {
    /// Height of siblings between the last break marker and the heading
    pub content_above_heading: f64,
    pub effective_page_height: f64,
    /// Whole effective pages contained in `content_above_heading`
    pub pages_above: u32,
    /// Part of `content_above_heading` on the heading's own page
    pub remainder_on_page: f64,
    pub position: PagePosition,
    pub line_height_allowance: f64,
    pub safety_buffer: f64,
    pub container_box_sizing: BoxSizing,
    /// Sibling hops taken before the figure was found
    pub sibling_hops: usize,
    /// Filled in by the scaling engine
    pub decision: Option<DecisionRecord>,
}

impl MeasurementBreakdown {
    /// Store the scaling engine's final numbers.
    pub fn record_decision(&mut self, record: DecisionRecord) {
        self.decision = Some(record);
    }
}

/// One heading + figure pair that does not fit where it lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramBlock {
    pub heading_id: String,
    pub heading_text: String,
    pub heading_level: u8,
    pub diagram_type: DiagramType,
    pub diagram_selector: String,

    /// Heading box height (including any line-height allowance)
    pub heading_height: f64,
    /// Box height of a parent or child heading that moves with this one
    pub parent_heading_height: f64,
    /// Siblings between the heading and the figure's container
    pub elements_between_height: f64,
    /// Rendered height of the figure itself
    pub diagram_height: f64,
    pub container_margins: f64,
    pub container_padding: f64,
    pub container_borders: f64,

    /// Everything from heading through figure, plus the safety buffer
    pub total_content_height: f64,
    /// Real height left on the heading's page
    pub available_height: f64,
    /// `total_content_height / available_height`
    pub overflow_ratio: f64,

    pub header_height: f64,
    pub footer_height: f64,

    /// Absent on blocks that were built outside the analyzer
    #[serde(default)]
    pub breakdown: Option<MeasurementBreakdown>,
}

impl DiagramBlock {
    /// Figure height including its container box.
    pub fn current_diagram_height(&self) -> f64 {
        self.diagram_height + self.container_margins + self.container_padding + self.container_borders
    }

    /// Everything in the block that is not the figure.
    pub fn non_diagram_height(&self) -> f64 {
        (self.total_content_height - self.current_diagram_height()).max(0.0)
    }

    /// Intervening content plus any heading merged into the block.
    pub fn intermediate_height(&self) -> f64 {
        self.elements_between_height + self.parent_heading_height
    }

    /// Whether the overflow ratio carries meaning.
    pub fn has_valid_ratio(&self) -> bool {
        self.available_height > 0.0 && self.overflow_ratio.is_finite()
    }

    /// Decision recorded by the scaling engine, if any.
    pub fn decision_record(&self) -> Option<&DecisionRecord> {
        self.breakdown.as_ref().and_then(|b| b.decision.as_ref())
    }

    /// Write the engine's decision into the breakdown.
    pub fn write_back(&mut self, record: DecisionRecord) -> Result<()> {
        match self.breakdown.as_mut() {
            Some(breakdown) => {
                breakdown.record_decision(record);
                Ok(())
            }
            None => Err(Error::WriteBack(format!(
                "block '{}' carries no measurement breakdown",
                self.heading_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> DiagramBlock {
        DiagramBlock {
            heading_id: "arch".to_string(),
            heading_text: "Architecture".to_string(),
            heading_level: 2,
            diagram_type: DiagramType::Svg,
            diagram_selector: "svg".to_string(),
            heading_height: 60.0,
            parent_heading_height: 0.0,
            elements_between_height: 30.0,
            diagram_height: 2000.0,
            container_margins: 24.0,
            container_padding: 16.0,
            container_borders: 0.0,
            total_content_height: 2178.0,
            available_height: 894.0,
            overflow_ratio: 2178.0 / 894.0,
            header_height: 0.0,
            footer_height: 0.0,
            breakdown: None,
        }
    }

    #[test]
    fn test_height_split() {
        let b = block();
        assert_eq!(b.current_diagram_height(), 2040.0);
        assert_eq!(b.non_diagram_height(), 138.0);
        assert_eq!(b.intermediate_height(), 30.0);
        assert!(b.has_valid_ratio());
    }

    #[test]
    fn test_non_diagram_height_never_negative() {
        let mut b = block();
        b.total_content_height = 100.0;
        assert_eq!(b.non_diagram_height(), 0.0);
    }

    #[test]
    fn test_write_back_without_breakdown_fails() {
        let mut b = block();
        let record = DecisionRecord {
            final_scale_factor: 0.4,
            final_total_height: 800.0,
            target_height: 746.0,
            scale_entire_block: false,
            needs_pre_break: true,
            force_post_break: false,
        };
        assert!(matches!(b.write_back(record), Err(Error::WriteBack(_))));
        assert!(b.decision_record().is_none());
    }

    #[test]
    fn test_diagram_type_serde() {
        let json = serde_json::to_string(&DiagramType::Image).unwrap();
        assert_eq!(json, "\"image\"");
        assert_eq!(DiagramType::Svg.tag(), "svg");
    }
}
