//! In-memory rendered tree loaded from a measured snapshot.
//!
//! A snapshot is the box-model state of a rendered document serialized as
//! JSON: page facts plus a tree of elements with their metrics. It
//! implements both [`MeasurementPort`] and [`MutationApplier`], so the
//! whole fitting loop can run against it, and the mutated tree can be
//! written back out for the renderer to replay.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{check_scale_factor, AppliedChanges, MeasurementPort, MutationApplier};
use crate::error::{Error, Result};
use crate::model::{BoxMetrics, ElementInfo, ElementStyle, NodeId, PageFacts, ScalingDecision};
use crate::policy::LayoutPolicy;

/// Class of the wrapper that keeps a heading and its figure together.
pub const KEEP_TOGETHER_CLASS: &str = "pagefit-keep-together";
/// Class added to figures that have been resized.
pub const SCALED_CLASS: &str = "pagefit-scaled";
/// Class of the trailing spacer inserted after a resized block.
pub const SPACER_CLASS: &str = "pagefit-spacer";

const SPACER_MAX_PX: f64 = 60.0;
const SPACER_MIN_PX: f64 = 8.0;

/// One element of a snapshot tree, as serialized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotNode {
    #[serde(flatten)]
    pub info: ElementInfo,
    #[serde(rename = "box", default)]
    pub metrics: BoxMetrics,
    /// Rendered width, scaled together with the height of figures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotNode>,
}

impl SnapshotNode {
    /// Create a leaf node.
    pub fn new(info: ElementInfo, metrics: BoxMetrics) -> Self {
        Self {
            info,
            metrics,
            width: None,
            children: Vec::new(),
        }
    }

    /// Set the rendered width.
    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    /// Add a child node.
    pub fn with_child(mut self, child: SnapshotNode) -> Self {
        self.children.push(child);
        self
    }
}

/// Serialized form of a whole snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotFile {
    /// Absent when the renderer could not measure the page
    #[serde(default)]
    page: Option<PageFacts>,
    root: SnapshotNode,
}

#[derive(Debug, Clone)]
struct Node {
    info: ElementInfo,
    metrics: BoxMetrics,
    width: Option<f64>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed rendered document.
#[derive(Debug, Clone)]
pub struct SnapshotDocument {
    page: Option<PageFacts>,
    nodes: Vec<Node>,
    root: NodeId,
}

impl SnapshotDocument {
    /// Create an empty document with a `body` root.
    pub fn new(page: Option<PageFacts>) -> Self {
        Self {
            page,
            nodes: vec![Node {
                info: ElementInfo::new("body"),
                metrics: BoxMetrics::default(),
                width: None,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    /// Build a document from a serialized tree.
    pub fn from_tree(page: Option<PageFacts>, root: SnapshotNode) -> Self {
        let mut doc = Self {
            page,
            nodes: Vec::new(),
            root: NodeId(0),
        };
        doc.insert_tree(None, root);
        doc
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: SnapshotFile = serde_json::from_str(json)?;
        Ok(Self::from_tree(file.page, file.root))
    }

    /// Load a snapshot file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Serialize the current tree to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        let file = SnapshotFile {
            page: self.page,
            root: self.to_tree(self.root),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Write the current tree to a file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Append an element under `parent`.
    pub fn append(
        &mut self,
        parent: NodeId,
        info: ElementInfo,
        metrics: BoxMetrics,
    ) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        self.node_mut(parent)?.children.push(id);
        self.nodes.push(Node {
            info,
            metrics,
            width: None,
            parent: Some(parent),
            children: Vec::new(),
        });
        Ok(id)
    }

    /// Set an element's rendered width.
    pub fn set_width(&mut self, node: NodeId, width: f64) -> Result<()> {
        self.node_mut(node)?.width = Some(width);
        Ok(())
    }

    /// Rendered width of an element, if recorded.
    pub fn width(&self, node: NodeId) -> Option<f64> {
        self.nodes.get(node.0).and_then(|n| n.width)
    }

    /// Find an element by its `id` attribute.
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.info.id.as_deref() == Some(id))
            .map(NodeId)
    }

    /// All elements carrying a class, in arena order.
    pub fn nodes_with_class(&self, class: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.info.has_class(class))
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// Number of elements in the tree, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn insert_tree(&mut self, parent: Option<NodeId>, tree: SnapshotNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            info: tree.info,
            metrics: tree.metrics,
            width: tree.width,
            parent,
            children: Vec::new(),
        });
        for child in tree.children {
            let child_id = self.insert_tree(Some(id), child);
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    fn to_tree(&self, id: NodeId) -> SnapshotNode {
        let node = &self.nodes[id.0];
        SnapshotNode {
            info: node.info.clone(),
            metrics: node.metrics,
            width: node.width,
            children: node.children.iter().map(|c| self.to_tree(*c)).collect(),
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::NodeNotFound(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(Error::NodeNotFound(id.0))
    }

    /// Add `delta` to the heights of every ancestor of `node` below the root.
    fn propagate_height(&mut self, node: NodeId, delta: f64) {
        let mut current = self.nodes[node.0].parent;
        while let Some(id) = current {
            if id == self.root {
                break;
            }
            let n = &mut self.nodes[id.0];
            n.metrics.offset_height = (n.metrics.offset_height + delta).max(0.0);
            n.metrics.bounding_rect_height = (n.metrics.bounding_rect_height + delta).max(0.0);
            current = n.parent;
        }
    }

    /// Scale an element's height (and width), pushing the change up to its
    /// ancestors.
    fn scale_node(&mut self, id: NodeId, factor: f64) -> Result<()> {
        let node = self.node_mut(id)?;
        let before = node.metrics.offset_height;
        node.metrics = node.metrics.scaled(factor);
        node.width = node.width.map(|w| w * factor);
        let delta = node.metrics.offset_height - before;
        self.propagate_height(id, delta);
        Ok(())
    }

    fn index_in_parent(&self, id: NodeId) -> Result<(NodeId, usize)> {
        let parent = self.node(id)?.parent.ok_or(Error::NodeNotFound(id.0))?;
        let index = self
            .node(parent)?
            .children
            .iter()
            .position(|c| *c == id)
            .ok_or(Error::NodeNotFound(id.0))?;
        Ok((parent, index))
    }

    /// Move the contiguous siblings `first..=last` into a new keep-together
    /// wrapper placed where they were.
    fn wrap_siblings(
        &mut self,
        first: NodeId,
        last: NodeId,
        decision: &ScalingDecision,
    ) -> Result<NodeId> {
        let (parent, start) = self.index_in_parent(first)?;
        let (last_parent, end) = self.index_in_parent(last)?;
        if parent != last_parent || end < start {
            return Err(Error::Other(format!(
                "block for '{}' is not a contiguous run of siblings",
                decision.heading_id
            )));
        }

        let members: Vec<NodeId> = self.nodes[parent.0].children.drain(start..=end).collect();
        let height: f64 = members.iter().map(|m| self.nodes[m.0].metrics.box_height()).sum();

        let style = ElementStyle {
            break_inside: Some("avoid".to_string()),
            break_before: decision.force_pre_break.then(|| "page".to_string()),
            break_after: decision.force_post_break.then(|| "page".to_string()),
            ..ElementStyle::default()
        };
        let wrapper = NodeId(self.nodes.len());
        self.nodes.push(Node {
            info: ElementInfo::new("div")
                .with_class(KEEP_TOGETHER_CLASS)
                .with_style(style),
            metrics: BoxMetrics::new(height),
            width: None,
            parent: Some(parent),
            children: members.clone(),
        });
        for member in &members {
            self.nodes[member.0].parent = Some(wrapper);
        }
        self.nodes[parent.0].children.insert(start, wrapper);
        Ok(wrapper)
    }

    fn apply_one(&mut self, decision: &ScalingDecision, policy: &LayoutPolicy) -> Result<()> {
        check_scale_factor(decision)?;
        let factor = decision.scale_factor;

        let heading = self
            .find_heading_by_id(&decision.heading_id)?
            .ok_or_else(|| Error::HeadingNotFound(decision.heading_id.clone()))?;
        let figure = self
            .find_figure_following(heading.node, policy.max_sibling_hops)?
            .ok_or_else(|| Error::FigureNotFound(decision.heading_id.clone()))?;
        if self.node(figure.figure)?.info.has_class(SCALED_CLASS) {
            return Err(Error::Other(format!(
                "figure after '{}' is already scaled",
                decision.heading_id
            )));
        }

        // A level-3 heading takes its immediately preceding level-2 parent along.
        let mut first = heading.node;
        if heading.level == 3 {
            if let Some(prev) = self.previous_sibling(heading.node) {
                if self.node(prev)?.info.heading_level() == Some(2) {
                    first = prev;
                }
            }
        }

        if decision.scale_entire_block {
            let mut current = Some(first);
            while let Some(id) = current {
                if id == figure.sibling {
                    break;
                }
                self.scale_node(id, factor)?;
                current = self.next_sibling(id);
            }
        }
        self.scale_node(figure.figure, factor)?;
        self.node_mut(figure.figure)?
            .info
            .classes
            .push(SCALED_CLASS.to_string());

        let wrapper = self.wrap_siblings(first, figure.sibling, decision)?;

        let spacer_height = (SPACER_MAX_PX * factor).max(SPACER_MIN_PX).round();
        self.append(
            wrapper,
            ElementInfo::new("div").with_class(SPACER_CLASS),
            BoxMetrics::new(spacer_height),
        )?;
        let w = self.node_mut(wrapper)?;
        w.metrics.offset_height += spacer_height;
        w.metrics.bounding_rect_height += spacer_height;
        self.propagate_height(wrapper, spacer_height);

        log::debug!(
            "applied scale {:.3} to '{}' (entire block: {}, pre: {}, post: {})",
            factor,
            decision.heading_id,
            decision.scale_entire_block,
            decision.force_pre_break,
            decision.force_post_break
        );
        Ok(())
    }
}

impl MeasurementPort for SnapshotDocument {
    fn page_facts(&self) -> Result<PageFacts> {
        self.page
            .ok_or_else(|| Error::Measurement("snapshot carries no page facts".to_string()))
    }

    fn measure_box(&self, node: NodeId) -> Result<BoxMetrics> {
        Ok(self.node(node)?.metrics)
    }

    fn element(&self, node: NodeId) -> Result<ElementInfo> {
        Ok(self.node(node)?.info.clone())
    }

    fn root(&self) -> NodeId {
        self.root
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node.0)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(node).ok()?;
        self.nodes[parent.0].children.get(index + 1).copied()
    }

    fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let (parent, index) = self.index_in_parent(node).ok()?;
        index
            .checked_sub(1)
            .and_then(|i| self.nodes[parent.0].children.get(i).copied())
    }
}

impl MutationApplier for SnapshotDocument {
    fn apply(
        &mut self,
        decisions: &[ScalingDecision],
        policy: &LayoutPolicy,
    ) -> Result<AppliedChanges> {
        let mut changes = AppliedChanges::new();
        for decision in decisions {
            match self.apply_one(decision, policy) {
                Ok(()) => {
                    changes
                        .applied_heading_ids
                        .insert(decision.heading_id.clone());
                }
                Err(e) => {
                    log::warn!("Skipping decision for '{}': {}", decision.heading_id, e);
                    changes
                        .skipped
                        .push((decision.heading_id.clone(), e.to_string()));
                }
            }
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (SnapshotDocument, NodeId, NodeId, NodeId) {
        let mut doc = SnapshotDocument::new(Some(PageFacts::new(1000.0)));
        let root = doc.root();
        let heading = doc.append(
            root,
            ElementInfo::new("h2").with_id("flow").with_text("Flow"),
            BoxMetrics::new(40.0),
        ).unwrap();
        let container = doc.append(
            root,
            ElementInfo::new("div").with_class("mermaid"),
            BoxMetrics::new(1200.0).with_padding(10.0, 10.0),
        ).unwrap();
        let figure = doc.append(container, ElementInfo::new("svg"), BoxMetrics::new(1200.0)).unwrap();
        doc.set_width(figure, 800.0).unwrap();
        (doc, heading, container, figure)
    }

    fn decision(id: &str, factor: f64) -> ScalingDecision {
        ScalingDecision {
            heading_id: id.to_string(),
            scale_factor: factor,
            scale_entire_block: false,
            force_pre_break: false,
            force_post_break: true,
        }
    }

    #[test]
    fn test_navigation() {
        let (doc, heading, container, figure) = sample();
        assert_eq!(doc.next_sibling(heading), Some(container));
        assert_eq!(doc.previous_sibling(container), Some(heading));
        assert_eq!(doc.previous_sibling(heading), None);
        assert_eq!(doc.parent(figure), Some(container));
        assert_eq!(doc.children(container), vec![figure]);
    }

    #[test]
    fn test_find_figure_following() {
        let (doc, heading, container, figure) = sample();
        let found = doc.find_figure_following(heading, 10).unwrap().unwrap();
        assert_eq!(found.figure, figure);
        assert_eq!(found.sibling, container);
        assert_eq!(found.container, Some(container));
        assert_eq!(found.hops, 1);
    }

    #[test]
    fn test_apply_resizes_and_wraps() {
        let (mut doc, heading, container, figure) = sample();
        let changes = doc
            .apply(&[decision("flow", 0.5)], &LayoutPolicy::default())
            .unwrap();
        assert!(changes.applied_heading_ids.contains("flow"));

        let metrics = doc.measure_box(figure).unwrap();
        assert_eq!(metrics.offset_height, 600.0);
        assert_eq!(doc.width(figure), Some(400.0));
        assert!(doc.element(figure).unwrap().has_class(SCALED_CLASS));
        assert_eq!(doc.measure_box(container).unwrap().offset_height, 600.0);

        let wrapper = doc.parent(heading).unwrap();
        let info = doc.element(wrapper).unwrap();
        assert!(info.has_class(KEEP_TOGETHER_CLASS));
        assert_eq!(info.style.break_after.as_deref(), Some("page"));
        assert!(info.style.break_before.is_none());

        let children = doc.children(wrapper);
        assert_eq!(children.len(), 3);
        assert!(doc.element(children[2]).unwrap().has_class(SPACER_CLASS));
        assert_eq!(doc.measure_box(children[2]).unwrap().offset_height, 30.0);
    }

    #[test]
    fn test_apply_twice_skips_scaled_figure() {
        let (mut doc, _, _, figure) = sample();
        let policy = LayoutPolicy::default();
        doc.apply(&[decision("flow", 0.5)], &policy).unwrap();
        let second = doc.apply(&[decision("flow", 0.5)], &policy).unwrap();
        assert_eq!(second.applied_count(), 0);
        assert_eq!(second.skipped.len(), 1);
        assert_eq!(doc.measure_box(figure).unwrap().offset_height, 600.0);
    }

    #[test]
    fn test_apply_unknown_heading_is_skipped() {
        let (mut doc, _, _, _) = sample();
        let changes = doc
            .apply(&[decision("missing", 0.5)], &LayoutPolicy::default())
            .unwrap();
        assert_eq!(changes.applied_count(), 0);
        assert_eq!(changes.skipped[0].0, "missing");
    }

    #[test]
    fn test_json_round_trip_keeps_structure() {
        let (doc, _, _, _) = sample();
        let json = doc.to_json().unwrap();
        let reloaded = SnapshotDocument::from_json(&json).unwrap();
        assert_eq!(reloaded.node_count(), doc.node_count());
        assert_eq!(reloaded.find_by_id("flow"), Some(NodeId(1)));
    }

    #[test]
    fn test_entire_block_shrinks_enclosing_section() {
        let mut doc = SnapshotDocument::new(Some(PageFacts::new(1000.0)));
        let root = doc.root();
        let section = doc
            .append(root, ElementInfo::new("section"), BoxMetrics::new(1000.0))
            .unwrap();
        doc.append(section, ElementInfo::new("h2").with_id("steps"), BoxMetrics::new(100.0))
            .unwrap();
        doc.append(section, ElementInfo::new("p"), BoxMetrics::new(300.0))
            .unwrap();
        doc.append(section, ElementInfo::new("svg"), BoxMetrics::new(600.0))
            .unwrap();

        let mut whole = decision("steps", 0.5);
        whole.scale_entire_block = true;
        let changes = doc.apply(&[whole], &LayoutPolicy::default()).unwrap();
        assert_eq!(changes.applied_count(), 1);

        let wrapper = doc.children(section)[0];
        let wrapped = doc.measure_box(wrapper).unwrap().offset_height;
        assert_eq!(wrapped, 530.0);
        assert_eq!(doc.measure_box(section).unwrap().offset_height, wrapped);
    }

    #[test]
    fn test_append_to_unknown_parent_fails() {
        let mut doc = SnapshotDocument::new(None);
        let before = doc.node_count();
        let result = doc.append(NodeId(42), ElementInfo::new("p"), BoxMetrics::new(10.0));
        assert!(matches!(result, Err(Error::NodeNotFound(42))));
        assert_eq!(doc.node_count(), before);
    }

    #[test]
    fn test_missing_page_facts_is_a_measurement_error() {
        let doc = SnapshotDocument::from_json(r#"{ "root": { "tag": "body" } }"#).unwrap();
        assert!(matches!(doc.page_facts(), Err(Error::Measurement(_))));
    }
}
