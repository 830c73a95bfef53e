//! # pagefit
//!
//! Pagination fitting engine for rendered documents.
//!
//! Before a rendered document is printed to fixed-size pages, pagefit finds
//! headings whose following figure would overflow the page they land on and
//! works out how far to shrink the figure (or the whole heading + figure
//! block) and where to force page breaks so the pair prints together.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pagefit::{fit_snapshot_file, FitOptions};
//!
//! fn main() -> pagefit::Result<()> {
//!     // Fit a measured snapshot and write the adjusted tree back out
//!     let report = fit_snapshot_file("report.json", "report.fitted.json", &FitOptions::default())?;
//!     println!("{} blocks adjusted", report.stats.applied_count);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Backend agnostic**: measurement and mutation go through the
//!   [`MeasurementPort`] and [`MutationApplier`] traits
//! - **Shrink only**: figures are never enlarged and fitting blocks are never touched
//! - **Bounded convergence**: one initial and at most one corrective pass
//! - **Configurable**: every threshold lives in [`LayoutPolicy`]
//! - **Parallel batches**: uses Rayon to fit many documents at once

pub mod analyzer;
pub mod backend;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod scaling;

// Re-export commonly used types
pub use analyzer::{estimate_available_height, LayoutAnalyzer, PageEstimate};
pub use backend::{
    AppliedChanges, FigureMatch, MeasurementPort, MutationApplier, SnapshotDocument, SnapshotNode,
};
pub use error::{Error, Result};
pub use model::{
    BoxMetrics, BoxSizing, DecisionRecord, DiagramBlock, DiagramType, ElementInfo, ElementStyle,
    HeadingInfo, LayoutAnalysis, LineHeight, MeasurementBreakdown, NodeId, PageFacts,
    PagePosition, ScalingDecision, ScalingMode,
};
pub use pipeline::{fit_batch, FitOptions, FitPipeline, FitPlan, FitReport, FitStats, PassReport};
pub use policy::{LayoutPolicy, PolicyPreset};
pub use scaling::{compute_scaling, compute_scaling_excluding, ScalingEngine};

use std::path::Path;

/// Analyze a document with the default policy.
///
/// Never fails; an unmeasurable document yields a degraded, empty analysis.
///
/// # Example
///
/// ```no_run
/// use pagefit::{analyze, SnapshotDocument};
///
/// let doc = SnapshotDocument::from_file("report.json").unwrap();
/// let analysis = analyze(&doc);
/// println!("{} overflowing blocks", analysis.block_count());
/// ```
pub fn analyze<P: MeasurementPort + ?Sized>(port: &P) -> LayoutAnalysis {
    LayoutAnalyzer::new(port).analyze()
}

/// Analyze a document and decide its adjustments without mutating it.
pub fn plan<P: MeasurementPort + ?Sized>(port: &P, options: &FitOptions) -> FitPlan {
    FitPipeline::new(options.clone()).plan(port)
}

/// Run the full fitting loop on a document.
pub fn fit<D>(doc: &mut D, options: &FitOptions) -> Result<FitReport>
where
    D: MeasurementPort + MutationApplier + ?Sized,
{
    pipeline::fit(doc, options)
}

/// Plan a snapshot file.
pub fn plan_snapshot_file<P: AsRef<Path>>(path: P, options: &FitOptions) -> Result<FitPlan> {
    let doc = SnapshotDocument::from_file(path)?;
    Ok(plan(&doc, options))
}

/// Fit a snapshot file and write the adjusted snapshot to `output`.
///
/// # Example
///
/// ```no_run
/// use pagefit::{fit_snapshot_file, FitOptions, LayoutPolicy};
///
/// let options = FitOptions::new().with_policy(LayoutPolicy::new().with_safety_margin(24.0));
/// let report = fit_snapshot_file("in.json", "out.json", &options).unwrap();
/// assert!(report.passes.len() <= 2);
/// ```
pub fn fit_snapshot_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &FitOptions,
) -> Result<FitReport> {
    let mut doc = SnapshotDocument::from_file(input)?;
    let report = fit(&mut doc, options)?;
    doc.to_file(output)?;
    Ok(report)
}

/// Builder for one-off fitting runs.
///
/// # Example
///
/// ```no_run
/// use pagefit::{Pagefit, PolicyPreset};
///
/// let fitted = Pagefit::new()
///     .with_preset(PolicyPreset::Conservative)
///     .fit_file("report.json")?;
/// fitted.save("report.fitted.json")?;
/// # Ok::<(), pagefit::Error>(())
/// ```
pub struct Pagefit {
    options: FitOptions,
}

impl Pagefit {
    /// Create a new Pagefit builder.
    pub fn new() -> Self {
        Self {
            options: FitOptions::default(),
        }
    }

    /// Use a named policy profile.
    pub fn with_preset(mut self, preset: PolicyPreset) -> Self {
        self.options.policy = LayoutPolicy::from_preset(preset);
        self
    }

    /// Use a specific policy.
    pub fn with_policy(mut self, policy: LayoutPolicy) -> Self {
        self.options.policy = policy;
        self
    }

    /// Load the policy from a JSON file.
    pub fn with_policy_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.options.policy = LayoutPolicy::from_json_file(path)?;
        Ok(self)
    }

    /// Enable verbose logging.
    pub fn verbose(mut self) -> Self {
        self.options = self.options.verbose();
        self
    }

    /// Stop after the first pass.
    pub fn without_corrective_pass(mut self) -> Self {
        self.options = self.options.without_corrective_pass();
        self
    }

    /// Get the options this builder will run with.
    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Fit a snapshot file.
    pub fn fit_file<P: AsRef<Path>>(self, path: P) -> Result<PagefitResult> {
        let doc = SnapshotDocument::from_file(path)?;
        self.fit_snapshot(doc)
    }

    /// Fit a snapshot from JSON.
    pub fn fit_json(self, json: &str) -> Result<PagefitResult> {
        let doc = SnapshotDocument::from_json(json)?;
        self.fit_snapshot(doc)
    }

    /// Fit an in-memory snapshot.
    pub fn fit_snapshot(self, mut document: SnapshotDocument) -> Result<PagefitResult> {
        let report = fit(&mut document, &self.options)?;
        Ok(PagefitResult { document, report })
    }
}

impl Default for Pagefit {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of fitting a snapshot.
pub struct PagefitResult {
    /// The adjusted document
    pub document: SnapshotDocument,
    /// What happened on each pass
    pub report: FitReport,
}

impl PagefitResult {
    /// Serialize the adjusted document.
    pub fn to_json(&self) -> Result<String> {
        self.document.to_json()
    }

    /// Write the adjusted document to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.document.to_file(path)
    }

    /// Get the report.
    pub fn report(&self) -> &FitReport {
        &self.report
    }
}
