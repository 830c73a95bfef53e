//! Rendering backend abstraction layer.
//!
//! Provides a trait-based interface to the rendered document, isolating
//! whatever actually lays the document out (a headless browser, a custom
//! layout engine, or a recorded snapshot) from the fitting logic.

mod snapshot;

pub use snapshot::{SnapshotDocument, SnapshotNode, KEEP_TOGETHER_CLASS, SCALED_CLASS, SPACER_CLASS};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    BoxMetrics, DiagramType, ElementInfo, HeadingInfo, HeadingRef, NodeId, PageFacts,
    ScalingDecision,
};
use crate::policy::LayoutPolicy;

/// A figure located after a heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FigureMatch {
    /// The heading's sibling the figure was found in (or is)
    pub sibling: NodeId,
    /// The figure element
    pub figure: NodeId,
    /// The figure's parent, unless the figure is itself the sibling
    pub container: Option<NodeId>,
    pub diagram_type: DiagramType,
    /// 1 when the figure sits in the heading's immediate next sibling
    pub hops: usize,
}

/// Read access to a rendered document.
///
/// Implementations report box-model numbers and expose the tree structure.
/// The search helpers have default implementations built on the navigation
/// methods; hosts with a faster query path may override them.
pub trait MeasurementPort {
    /// Page height, margins and running header/footer heights.
    fn page_facts(&self) -> Result<PageFacts>;

    /// Box-model metrics for an element.
    fn measure_box(&self, node: NodeId) -> Result<BoxMetrics>;

    /// Tag, id, classes, text and computed style of an element.
    fn element(&self, node: NodeId) -> Result<ElementInfo>;

    /// The document body.
    fn root(&self) -> NodeId;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn previous_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// All headings in document order.
    fn find_headings(&self) -> Result<Vec<HeadingRef>> {
        let mut headings = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            if let Some(level) = self.element(node)?.heading_level() {
                headings.push(HeadingRef {
                    node,
                    level,
                    index: headings.len(),
                });
            }
            let children = self.children(node);
            stack.extend(children.into_iter().rev());
        }
        Ok(headings)
    }

    /// First figure in the heading's following siblings (or their
    /// descendants), searching at most `max_hops` siblings and stopping at
    /// the next heading of any level.
    fn find_figure_following(
        &self,
        heading: NodeId,
        max_hops: usize,
    ) -> Result<Option<FigureMatch>> {
        let mut hops = 0;
        let mut current = self.next_sibling(heading);
        while let Some(sibling) = current {
            if hops >= max_hops {
                break;
            }
            hops += 1;

            let info = self.element(sibling)?;
            if info.is_heading() {
                return Ok(None);
            }
            if let Some((figure, diagram_type)) = self.first_figure_in(sibling)? {
                let container = if figure == sibling {
                    None
                } else {
                    self.parent(figure)
                };
                return Ok(Some(FigureMatch {
                    sibling,
                    figure,
                    container,
                    diagram_type,
                    hops,
                }));
            }
            current = self.next_sibling(sibling);
        }
        Ok(None)
    }

    /// First figure in `node`'s subtree, in document order.
    fn first_figure_in(&self, node: NodeId) -> Result<Option<(NodeId, DiagramType)>> {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(kind) = self.element(current)?.figure_type() {
                return Ok(Some((current, kind)));
            }
            let children = self.children(current);
            stack.extend(children.into_iter().rev());
        }
        Ok(None)
    }

    /// Nearest page-break marker preceding `before` in document order.
    ///
    /// Ancestors of `before` are not considered: a break after an ancestor
    /// falls after `before`, not ahead of it.
    fn find_prior_break_marker(&self, before: NodeId) -> Result<Option<NodeId>> {
        let mut current = before;
        loop {
            let mut sibling = self.previous_sibling(current);
            while let Some(node) = sibling {
                if let Some(marker) = self.last_marker_in(node)? {
                    return Ok(Some(marker));
                }
                sibling = self.previous_sibling(node);
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// Last break marker in `node`'s subtree, in document order.
    fn last_marker_in(&self, node: NodeId) -> Result<Option<NodeId>> {
        for child in self.children(node).into_iter().rev() {
            if let Some(marker) = self.last_marker_in(child)? {
                return Ok(Some(marker));
            }
        }
        if self.element(node)?.is_break_marker() {
            return Ok(Some(node));
        }
        Ok(None)
    }

    /// Whether `node` is `ancestor` or lies inside it.
    fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Locate a heading by its element id or generated id.
    fn find_heading_by_id(&self, id: &str) -> Result<Option<HeadingRef>> {
        let headings = self.find_headings()?;
        for heading in &headings {
            if self.element(heading.node)?.id.as_deref() == Some(id) {
                return Ok(Some(*heading));
            }
        }
        Ok(HeadingInfo::generated_index(id).and_then(|index| {
            headings
                .iter()
                .find(|h| h.index == index)
                .filter(|h| {
                    matches!(self.element(h.node), Ok(info) if info.id.as_deref().map_or(true, str::is_empty))
                })
                .copied()
        }))
    }
}

/// Identifier of a heading: its element id, or one derived from its position.
pub fn heading_id(info: &ElementInfo, index: usize) -> String {
    match &info.id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => HeadingInfo::generated_id(index),
    }
}

/// What a mutation applier did with a set of decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedChanges {
    /// Headings whose blocks were grouped and resized
    pub applied_heading_ids: BTreeSet<String>,
    /// Decisions that could not be applied, with the reason
    pub skipped: Vec<(String, String)>,
}

impl AppliedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of decisions applied.
    pub fn applied_count(&self) -> usize {
        self.applied_heading_ids.len()
    }

    /// Fold another pass's changes into this one.
    pub fn merge(&mut self, other: &AppliedChanges) {
        self.applied_heading_ids
            .extend(other.applied_heading_ids.iter().cloned());
        self.skipped.extend(other.skipped.iter().cloned());
    }
}

/// Write access to a rendered document.
///
/// For each decision an applier groups the heading (with its parent
/// heading when one travels with it), the intervening content and the
/// figure into one unit that does not split across pages, resizes the
/// figure by the decision's factor keeping its aspect ratio, marks it as
/// scaled, adds trailing space and sets the requested break directives.
/// Content not named in a decision is left untouched.
pub trait MutationApplier {
    /// Apply decisions. Headings that cannot be located are reported in
    /// [`AppliedChanges::skipped`] rather than failing the whole batch.
    fn apply(
        &mut self,
        decisions: &[ScalingDecision],
        policy: &LayoutPolicy,
    ) -> Result<AppliedChanges>;

    /// Block until layout has settled after `apply`.
    fn settle(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Check that a decision's factor is one an applier may use.
pub fn check_scale_factor(decision: &ScalingDecision) -> Result<()> {
    let factor = decision.scale_factor;
    if factor.is_finite() && factor > 0.0 && factor < 1.0 {
        Ok(())
    } else {
        Err(Error::Other(format!(
            "scale factor {} for '{}' is outside (0, 1)",
            factor, decision.heading_id
        )))
    }
}
