//! Layout analysis for rendered documents.
//!
//! This module measures heading + figure pairs through a [`MeasurementPort`]
//! and works out which of them overflow the page they land on.

mod position;

pub use position::{estimate_available_height, PageEstimate};

use crate::backend::{heading_id, FigureMatch, MeasurementPort};
use crate::error::Result;
use crate::model::{
    BoxMetrics, BoxSizing, DiagramBlock, ElementInfo, HeadingInfo, HeadingRef, LayoutAnalysis,
    LineHeight, MeasurementBreakdown, NodeId, PageFacts,
};
use crate::policy::LayoutPolicy;

/// Container box contribution to a block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ContainerBox {
    margins: f64,
    padding: f64,
    borders: f64,
    sizing: BoxSizing,
}

/// Layout analyzer for finding overflowing heading + figure pairs.
pub struct LayoutAnalyzer<'a, P: MeasurementPort + ?Sized> {
    port: &'a P,
    policy: LayoutPolicy,
    verbose: bool,
}

impl<'a, P: MeasurementPort + ?Sized> LayoutAnalyzer<'a, P> {
    /// Create a new layout analyzer with the default policy.
    pub fn new(port: &'a P) -> Self {
        Self {
            port,
            policy: LayoutPolicy::default(),
            verbose: false,
        }
    }

    /// Use a specific policy.
    pub fn with_policy(mut self, policy: LayoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Log degraded analyses as warnings instead of debug messages.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Analyze the document.
    ///
    /// Never fails: if anything cannot be measured, the result is an empty,
    /// degraded analysis on nominal page dimensions.
    pub fn analyze(&self) -> LayoutAnalysis {
        match self.try_analyze() {
            Ok(analysis) => analysis,
            Err(e) => {
                if self.verbose {
                    log::warn!("Layout analysis failed, leaving document unscaled: {}", e);
                } else {
                    log::debug!("Layout analysis failed, leaving document unscaled: {}", e);
                }
                LayoutAnalysis::degraded()
            }
        }
    }

    /// Analyze the document, surfacing measurement errors.
    pub fn try_analyze(&self) -> Result<LayoutAnalysis> {
        let facts = self.port.page_facts()?;
        facts.validate()?;

        let mut headings = Vec::new();
        let mut blocks = Vec::new();
        for heading in self.port.find_headings()? {
            if !heading.is_candidate() {
                continue;
            }
            let info = self.port.element(heading.node)?;
            let metrics = self.measure(heading.node)?;
            let mut heading_info =
                HeadingInfo::new(heading_id(&info, heading.index), heading.level, &info.text);
            heading_info.y = metrics.offset_top;
            heading_info.height = Some(metrics.box_height());

            if let Some(block) =
                self.analyze_heading(&heading, &info, &metrics, &heading_info, &facts)?
            {
                blocks.push(block);
            }
            headings.push(heading_info);
        }

        log::debug!(
            "Analyzed {} headings, {} overflowing blocks",
            headings.len(),
            blocks.len()
        );
        Ok(LayoutAnalysis::new(facts, blocks).with_headings(headings))
    }

    /// Build the block for one heading, if it has a figure and overflows.
    fn analyze_heading(
        &self,
        heading: &HeadingRef,
        info: &ElementInfo,
        heading_box: &BoxMetrics,
        heading_info: &HeadingInfo,
        facts: &PageFacts,
    ) -> Result<Option<DiagramBlock>> {
        let Some(figure) = self
            .port
            .find_figure_following(heading.node, self.policy.max_sibling_hops)?
        else {
            return Ok(None);
        };

        let effective = facts.effective_height();
        let content_above = self.content_above(heading.node)?;
        let estimate = estimate_available_height(content_above, effective, &self.policy);

        let line_allowance = self.line_height_allowance(info, heading_box);
        let heading_height = heading_box.box_height() + line_allowance;
        let parent_heading_height = self.companion_heading_height(heading)?;
        let elements_between = self.elements_between(heading.node, figure.sibling)?;
        let diagram_height = self.measure(figure.figure)?.rendered_height();
        let container = self.container_box(&figure, diagram_height)?;

        let total = heading_height
            + parent_heading_height
            + elements_between
            + diagram_height
            + container.margins
            + container.padding
            + container.borders
            + self.policy.content_safety_buffer;

        if total <= estimate.available {
            log::debug!(
                "'{}' fits: {:.0}px of {:.0}px",
                heading_info.text,
                total,
                estimate.available
            );
            return Ok(None);
        }

        // Clamped denominator keeps the ratio finite on degenerate pages.
        let overflow_ratio = total / estimate.available.max(1.0);
        log::debug!(
            "'{}' overflows: {:.0}px of {:.0}px (ratio {:.2}, {:?})",
            heading_info.text,
            total,
            estimate.available,
            overflow_ratio,
            estimate.position
        );

        Ok(Some(DiagramBlock {
            heading_id: heading_info.id.clone(),
            heading_text: heading_info.text.clone(),
            heading_level: heading.level,
            diagram_type: figure.diagram_type,
            diagram_selector: self.figure_selector(&figure)?,
            heading_height,
            parent_heading_height,
            elements_between_height: elements_between,
            diagram_height,
            container_margins: container.margins,
            container_padding: container.padding,
            container_borders: container.borders,
            total_content_height: total,
            available_height: estimate.available,
            overflow_ratio,
            header_height: facts.header_height,
            footer_height: facts.footer_height,
            breakdown: Some(MeasurementBreakdown {
                content_above_heading: content_above,
                effective_page_height: effective,
                pages_above: estimate.pages_above,
                remainder_on_page: estimate.remainder,
                position: estimate.position,
                line_height_allowance: line_allowance,
                safety_buffer: self.policy.content_safety_buffer,
                container_box_sizing: container.sizing,
                sibling_hops: figure.hops,
                decision: None,
            }),
        }))
    }

    /// Measure a node and reject malformed metrics.
    fn measure(&self, node: NodeId) -> Result<BoxMetrics> {
        let metrics = self.port.measure_box(node)?;
        metrics.validate(node)?;
        Ok(metrics)
    }

    /// Flow height between the most recent page-break marker and `node`.
    ///
    /// Walks previous siblings, then the previous siblings of each ancestor
    /// below the root, until the marker is reached.
    pub fn content_above(&self, node: NodeId) -> Result<f64> {
        let marker = self.port.find_prior_break_marker(node)?;
        let root = self.port.root();
        let mut total = 0.0;
        let mut anchor = node;
        loop {
            let mut current = self.port.previous_sibling(anchor);
            while let Some(sibling) = current {
                if let Some(marker) = marker {
                    if self.port.is_within(marker, sibling) {
                        return Ok(total);
                    }
                }
                if !self.port.element(sibling)?.is_break_marker() {
                    total += self.measure(sibling)?.box_height();
                }
                current = self.port.previous_sibling(sibling);
            }
            match self.port.parent(anchor) {
                Some(parent) if parent != root => anchor = parent,
                _ => return Ok(total),
            }
        }
    }

    /// Extra height for headings whose unitless line-height makes them
    /// visibly taller than their font size.
    fn line_height_allowance(&self, info: &ElementInfo, metrics: &BoxMetrics) -> f64 {
        match (info.style.line_height, info.style.font_size) {
            (LineHeight::Unitless(line_height), Some(font_size))
                if font_size > 0.0
                    && metrics.offset_height > font_size * self.policy.line_height_trigger =>
            {
                ((line_height - 1.0) * font_size).max(0.0)
            }
            _ => 0.0,
        }
    }

    /// Box height of a heading that travels with this one: the level-2
    /// parent right before a level-3 heading, or the level-3 child right
    /// after a level-2 heading.
    fn companion_heading_height(&self, heading: &HeadingRef) -> Result<f64> {
        let (neighbour, wanted) = match heading.level {
            3 => (self.port.previous_sibling(heading.node), 2),
            2 => (self.port.next_sibling(heading.node), 3),
            _ => return Ok(0.0),
        };
        match neighbour {
            Some(node) if self.port.element(node)?.heading_level() == Some(wanted) => {
                Ok(self.measure(node)?.box_height())
            }
            _ => Ok(0.0),
        }
    }

    /// Box heights of the siblings strictly between the heading and the
    /// sibling holding the figure. Headings are not counted.
    fn elements_between(&self, heading: NodeId, figure_sibling: NodeId) -> Result<f64> {
        let mut total = 0.0;
        let mut current = self.port.next_sibling(heading);
        while let Some(node) = current {
            if node == figure_sibling {
                break;
            }
            if !self.port.element(node)?.is_heading() {
                total += self.measure(node)?.box_height();
            }
            current = self.port.next_sibling(node);
        }
        Ok(total)
    }

    /// Margins, padding and borders the figure's container adds.
    ///
    /// With `border-box` sizing the container's height already includes its
    /// padding and borders, so only the part not taken by the figure counts.
    fn container_box(&self, figure: &FigureMatch, diagram_height: f64) -> Result<ContainerBox> {
        let Some(container) = figure.container else {
            return Ok(ContainerBox::default());
        };
        let metrics = self.measure(container)?;
        let sizing = self.port.element(container)?.style.box_sizing;
        let (padding, borders) = match sizing {
            BoxSizing::ContentBox => (metrics.vertical_padding(), metrics.vertical_borders()),
            BoxSizing::BorderBox => {
                let slack = (metrics.offset_height - diagram_height).max(0.0);
                let padding = metrics.vertical_padding().min(slack);
                let borders = metrics.vertical_borders().min(slack - padding);
                (padding, borders)
            }
        };
        Ok(ContainerBox {
            margins: metrics.vertical_margins(),
            padding,
            borders,
            sizing,
        })
    }

    fn figure_selector(&self, figure: &FigureMatch) -> Result<String> {
        let figure_sel = self.port.element(figure.figure)?.selector();
        match figure.container {
            Some(container) => Ok(format!(
                "{} > {}",
                self.port.element(container)?.selector(),
                figure_sel
            )),
            None => Ok(figure_sel),
        }
    }
}

/// Analyze a document with the given policy.
pub fn analyze<P: MeasurementPort + ?Sized>(port: &P, policy: &LayoutPolicy) -> LayoutAnalysis {
    LayoutAnalyzer::new(port).with_policy(policy.clone()).analyze()
}
