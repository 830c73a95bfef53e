//! Integration tests for the fitting loop, batches and snapshot files.

use std::collections::BTreeSet;

use pagefit::backend::{KEEP_TOGETHER_CLASS, SCALED_CLASS, SPACER_CLASS};
use pagefit::error::{Error, Result};
use pagefit::{
    fit_batch, fit_snapshot_file, plan_snapshot_file, AppliedChanges, BoxMetrics, ElementInfo,
    FitOptions, FitPipeline, LayoutPolicy, MeasurementPort, MutationApplier, NodeId, PageFacts,
    ScalingDecision, SnapshotDocument,
};

fn a4_page() -> PageFacts {
    PageFacts::new(1123.0)
        .with_margins(76.0, 76.0)
        .with_header(40.0)
        .with_footer(37.0)
}

/// Three sections: a large figure, one that already fits, and a huge one.
fn report_snapshot() -> SnapshotDocument {
    let mut doc = SnapshotDocument::new(Some(a4_page()));
    let root = doc.root();

    doc.append(root, ElementInfo::new("h2").with_id("arch"), BoxMetrics::new(60.0)).unwrap();
    let container = doc.append(
        root,
        ElementInfo::new("div").with_class("mermaid"),
        BoxMetrics::new(2000.0).with_margins(20.0, 20.0),
    ).unwrap();
    let svg = doc.append(container, ElementInfo::new("svg"), BoxMetrics::new(2000.0)).unwrap();
    doc.set_width(svg, 1200.0).unwrap();

    doc.append(root, ElementInfo::new("div").with_class("page-break"), BoxMetrics::new(0.0)).unwrap();
    doc.append(root, ElementInfo::new("h2").with_id("small"), BoxMetrics::new(40.0)).unwrap();
    doc.append(root, ElementInfo::new("svg"), BoxMetrics::new(300.0)).unwrap();

    doc.append(root, ElementInfo::new("div").with_class("page-break"), BoxMetrics::new(0.0)).unwrap();
    doc.append(root, ElementInfo::new("h2").with_id("huge"), BoxMetrics::new(60.0)).unwrap();
    doc.append(root, ElementInfo::new("svg"), BoxMetrics::new(20000.0)).unwrap();
    doc
}

#[test]
fn test_fit_adjusts_only_overflowing_blocks() {
    let mut doc = report_snapshot();
    let report = FitPipeline::new(FitOptions::default()).run(&mut doc).unwrap();

    let applied = report.applied_heading_ids();
    assert!(applied.contains("arch"));
    assert!(applied.contains("huge"));
    assert!(!applied.contains("small"));

    assert_eq!(doc.nodes_with_class(KEEP_TOGETHER_CLASS).len(), 2);
    assert_eq!(doc.nodes_with_class(SCALED_CLASS).len(), 2);
    assert_eq!(doc.nodes_with_class(SPACER_CLASS).len(), 2);
}

#[test]
fn test_convergence_stops_after_two_passes() {
    let mut doc = report_snapshot();
    let report = FitPipeline::new(FitOptions::default()).run(&mut doc).unwrap();

    assert_eq!(report.passes.len(), 2);
    assert_eq!(report.stats.pass_count, 2);

    // The floored figure still overflows and is not scaled again.
    let first: BTreeSet<_> = report.passes[0].applied.applied_heading_ids.clone();
    for decision in &report.passes[1].decisions {
        assert!(!first.contains(&decision.heading_id));
    }
    assert_eq!(report.residual_overflow, vec!["huge".to_string()]);
    assert!(!report.is_clean());
    assert_eq!(report.stats.decision_count, 2);
}

#[test]
fn test_single_pass() {
    let mut doc = report_snapshot();
    let options = FitOptions::new().without_corrective_pass();
    let report = FitPipeline::new(options).run(&mut doc).unwrap();
    assert_eq!(report.passes.len(), 1);
    assert!(report.residual_overflow.is_empty());
}

#[test]
fn test_unmeasurable_document_is_left_alone() {
    let mut doc = report_snapshot();
    let json = doc.to_json().unwrap().replacen("\"page\"", "\"unused\"", 1);
    doc = SnapshotDocument::from_json(&json).unwrap();
    let before = doc.to_json().unwrap();

    let report = FitPipeline::new(FitOptions::default()).run(&mut doc).unwrap();
    assert!(report.degraded());
    assert_eq!(report.passes.len(), 1);
    assert_eq!(report.stats.decision_count, 0);
    assert_eq!(doc.to_json().unwrap(), before);
}

#[test]
fn test_snapshot_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.json");
    let output = dir.path().join("report.fitted.json");
    report_snapshot().to_file(&input).unwrap();

    let plan = plan_snapshot_file(&input, &FitOptions::default()).unwrap();
    assert_eq!(plan.decisions.len(), 2);

    let report = fit_snapshot_file(&input, &output, &FitOptions::default()).unwrap();
    assert_eq!(report.stats.applied_count, 2);

    let fitted = SnapshotDocument::from_file(&output).unwrap();
    assert_eq!(fitted.nodes_with_class(KEEP_TOGETHER_CLASS).len(), 2);

    // Fitting the fitted output again changes nothing new.
    let again = FitPipeline::new(FitOptions::default())
        .run(&mut SnapshotDocument::from_file(&output).unwrap())
        .unwrap();
    assert_eq!(again.stats.applied_count, 0);
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = plan_snapshot_file(dir.path().join("absent.json"), &FitOptions::default());
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_batch_parallel_matches_sequential() {
    let mut parallel_docs: Vec<_> = (0..6).map(|_| report_snapshot()).collect();
    let mut sequential_docs = parallel_docs.clone();

    let parallel = fit_batch(&mut parallel_docs, &FitOptions::default());
    let sequential = fit_batch(&mut sequential_docs, &FitOptions::new().sequential());

    assert_eq!(parallel.len(), 6);
    for (p, s) in parallel.into_iter().zip(sequential) {
        assert_eq!(p.unwrap(), s.unwrap());
    }
    for (p, s) in parallel_docs.iter().zip(&sequential_docs) {
        assert_eq!(p.to_json().unwrap(), s.to_json().unwrap());
    }
}

/// Wraps a snapshot and records every batch of decisions it is asked to apply.
struct RecordingDocument {
    inner: SnapshotDocument,
    batches: Vec<Vec<ScalingDecision>>,
    fail_apply: bool,
}

impl MeasurementPort for RecordingDocument {
    fn page_facts(&self) -> Result<PageFacts> {
        self.inner.page_facts()
    }
    fn measure_box(&self, node: NodeId) -> Result<BoxMetrics> {
        self.inner.measure_box(node)
    }
    fn element(&self, node: NodeId) -> Result<ElementInfo> {
        self.inner.element(node)
    }
    fn root(&self) -> NodeId {
        self.inner.root()
    }
    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.parent(node)
    }
    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.children(node)
    }
    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.inner.next_sibling(node)
    }
    fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.inner.previous_sibling(node)
    }
}

impl MutationApplier for RecordingDocument {
    fn apply(
        &mut self,
        decisions: &[ScalingDecision],
        policy: &LayoutPolicy,
    ) -> Result<AppliedChanges> {
        if self.fail_apply {
            return Err(Error::Other("renderer went away".to_string()));
        }
        self.batches.push(decisions.to_vec());
        self.inner.apply(decisions, policy)
    }
}

#[test]
fn test_no_heading_is_sent_twice() {
    let mut doc = RecordingDocument {
        inner: report_snapshot(),
        batches: Vec::new(),
        fail_apply: false,
    };
    pagefit::fit(&mut doc, &FitOptions::default()).unwrap();

    let mut seen = BTreeSet::new();
    for batch in &doc.batches {
        for decision in batch {
            assert!(seen.insert(decision.heading_id.clone()));
        }
    }
    assert_eq!(seen.len(), 2);
}

#[test]
fn test_applier_failure_propagates() {
    let mut doc = RecordingDocument {
        inner: report_snapshot(),
        batches: Vec::new(),
        fail_apply: true,
    };
    let result = pagefit::fit(&mut doc, &FitOptions::default());
    assert!(matches!(result, Err(Error::Other(_))));
}

#[test]
fn test_invalid_policy_is_rejected_before_mutation() {
    let mut doc = report_snapshot();
    let before = doc.node_count();
    let options = FitOptions::new().with_policy(LayoutPolicy::new().with_min_scale_block(0.0));

    let result = FitPipeline::new(options).run(&mut doc);
    assert!(matches!(result, Err(Error::InvalidPolicy(_))));
    assert_eq!(doc.node_count(), before);
    assert!(doc.nodes_with_class(SCALED_CLASS).is_empty());
}
