//! The measure, decide, mutate loop.
//!
//! One pipeline run analyzes a document, applies the resulting decisions,
//! lets layout settle and then makes a single corrective pass over blocks
//! that were not adjusted the first time. Overflow left after that is
//! reported, not chased.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analyzer::LayoutAnalyzer;
use crate::backend::{AppliedChanges, MeasurementPort, MutationApplier};
use crate::error::Result;
use crate::model::{LayoutAnalysis, ScalingDecision, ScalingMode};
use crate::policy::LayoutPolicy;
use crate::scaling::ScalingEngine;

/// Options for a fitting run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub policy: LayoutPolicy,

    /// Log degraded analyses and failed write-backs as warnings
    pub verbose: bool,

    /// Re-analyze after the first mutation and adjust what is still overflowing
    pub corrective_pass: bool,

    /// Fit batches on the rayon thread pool
    pub parallel: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            policy: LayoutPolicy::default(),
            verbose: false,
            corrective_pass: true,
            parallel: true,
        }
    }
}

impl FitOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific policy.
    pub fn with_policy(mut self, policy: LayoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable verbose logging.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Stop after the first pass.
    pub fn without_corrective_pass(mut self) -> Self {
        self.corrective_pass = false;
        self
    }

    /// Fit batches one document at a time.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Analysis and decisions for a document, without mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitPlan {
    pub analysis: LayoutAnalysis,
    pub decisions: Vec<ScalingDecision>,
}

/// One analyze + decide + apply round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub analysis: LayoutAnalysis,
    pub decisions: Vec<ScalingDecision>,
    pub applied: AppliedChanges,
}

/// Outcome of a whole fitting run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Initial pass, then the corrective pass if one ran
    pub passes: Vec<PassReport>,

    /// Headings still overflowing after the last pass without a decision
    pub residual_overflow: Vec<String>,

    pub stats: FitStats,
}

impl FitReport {
    /// Whether the first analysis fell back to nominal dimensions.
    pub fn degraded(&self) -> bool {
        self.passes.first().is_some_and(|p| p.analysis.degraded)
    }

    /// Headings adjusted across all passes.
    pub fn applied_heading_ids(&self) -> BTreeSet<String> {
        let mut all = AppliedChanges::new();
        for pass in &self.passes {
            all.merge(&pass.applied);
        }
        all.applied_heading_ids
    }

    /// Whether nothing is left overflowing.
    pub fn is_clean(&self) -> bool {
        self.residual_overflow.is_empty()
    }
}

/// Counters collected over a fitting run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitStats {
    /// Number of passes that ran
    pub pass_count: u32,

    /// Overflowing blocks found across passes
    pub blocks_found: u32,

    /// Decisions emitted
    pub decision_count: u32,

    /// Decisions that shrink only the figure
    pub figure_only_count: u32,

    /// Decisions that shrink the whole block
    pub entire_block_count: u32,

    /// Decisions that force a break before the block
    pub pre_break_count: u32,

    /// Decisions that force a break after the block
    pub post_break_count: u32,

    /// Decisions the applier carried out
    pub applied_count: u32,

    /// Decisions the applier skipped
    pub skipped_count: u32,

    /// Smallest scale factor used
    pub min_scale: Option<f64>,
}

impl FitStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one pass.
    pub fn record_pass(&mut self, pass: &PassReport) {
        self.pass_count += 1;
        self.blocks_found += pass.analysis.block_count() as u32;
        self.applied_count += pass.applied.applied_count() as u32;
        self.skipped_count += pass.applied.skipped.len() as u32;
        for decision in &pass.decisions {
            self.add_decision(decision);
        }
    }

    /// Count one decision.
    pub fn add_decision(&mut self, decision: &ScalingDecision) {
        self.decision_count += 1;
        match decision.mode() {
            ScalingMode::EntireBlock => self.entire_block_count += 1,
            ScalingMode::FigureOnly => self.figure_only_count += 1,
        }
        if decision.force_pre_break {
            self.pre_break_count += 1;
        }
        if decision.force_post_break {
            self.post_break_count += 1;
        }
        self.min_scale = Some(
            self.min_scale
                .map_or(decision.scale_factor, |m| m.min(decision.scale_factor)),
        );
    }

    /// Merge another stats instance into this one.
    pub fn merge(&mut self, other: &FitStats) {
        self.pass_count += other.pass_count;
        self.blocks_found += other.blocks_found;
        self.decision_count += other.decision_count;
        self.figure_only_count += other.figure_only_count;
        self.entire_block_count += other.entire_block_count;
        self.pre_break_count += other.pre_break_count;
        self.post_break_count += other.post_break_count;
        self.applied_count += other.applied_count;
        self.skipped_count += other.skipped_count;
        self.min_scale = match (self.min_scale, other.min_scale) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Runs the fitting loop on one document.
#[derive(Debug, Clone, Default)]
pub struct FitPipeline {
    options: FitOptions,
}

impl FitPipeline {
    pub fn new(options: FitOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    fn engine(&self) -> ScalingEngine {
        ScalingEngine::new(self.options.policy.clone()).verbose(self.options.verbose)
    }

    fn analyze<P: MeasurementPort + ?Sized>(&self, port: &P) -> LayoutAnalysis {
        LayoutAnalyzer::new(port)
            .with_policy(self.options.policy.clone())
            .verbose(self.options.verbose)
            .analyze()
    }

    /// Analyze and decide without touching the document.
    pub fn plan<P: MeasurementPort + ?Sized>(&self, port: &P) -> FitPlan {
        let mut analysis = self.analyze(port);
        let decisions = self.engine().decide(&mut analysis);
        FitPlan {
            analysis,
            decisions,
        }
    }

    /// Run the loop: at most one initial and one corrective pass.
    pub fn run<D>(&self, doc: &mut D) -> Result<FitReport>
    where
        D: MeasurementPort + MutationApplier + ?Sized,
    {
        self.options.policy.validate()?;
        let engine = self.engine();
        let mut report = FitReport::default();

        let first = self.pass(doc, &engine, &BTreeSet::new())?;
        let adjusted = first.applied.applied_heading_ids.clone();
        let needs_correction =
            self.options.corrective_pass && !first.decisions.is_empty() && !first.analysis.degraded;
        report.passes.push(first);

        if needs_correction {
            log::debug!("Corrective pass, excluding {} headings", adjusted.len());
            let second = self.pass(doc, &engine, &adjusted)?;
            report.passes.push(second);
        }

        if let Some(last) = report.passes.last() {
            let decided: BTreeSet<&str> =
                last.decisions.iter().map(|d| d.heading_id.as_str()).collect();
            report.residual_overflow = last
                .analysis
                .blocks
                .iter()
                .filter(|b| !decided.contains(b.heading_id.as_str()))
                .map(|b| b.heading_id.clone())
                .collect();
        }
        for pass in &report.passes {
            report.stats.record_pass(pass);
        }

        if !report.residual_overflow.is_empty() {
            log::debug!(
                "Accepting residual overflow for {} headings",
                report.residual_overflow.len()
            );
        }
        Ok(report)
    }

    fn pass<D>(
        &self,
        doc: &mut D,
        engine: &ScalingEngine,
        exclude: &BTreeSet<String>,
    ) -> Result<PassReport>
    where
        D: MeasurementPort + MutationApplier + ?Sized,
    {
        let mut analysis = self.analyze(&*doc);
        let decisions = engine.decide_excluding(&mut analysis, exclude);
        let applied = if decisions.is_empty() {
            AppliedChanges::new()
        } else {
            let applied = doc.apply(&decisions, &self.options.policy)?;
            doc.settle()?;
            applied
        };
        Ok(PassReport {
            analysis,
            decisions,
            applied,
        })
    }
}

/// Fit one document with the given options.
pub fn fit<D>(doc: &mut D, options: &FitOptions) -> Result<FitReport>
where
    D: MeasurementPort + MutationApplier + ?Sized,
{
    FitPipeline::new(options.clone()).run(doc)
}

/// Fit many documents, each with its own backend.
///
/// Results come back in input order; a failure in one document does not
/// affect the others.
pub fn fit_batch<D>(docs: &mut [D], options: &FitOptions) -> Vec<Result<FitReport>>
where
    D: MeasurementPort + MutationApplier + Send,
{
    let pipeline = FitPipeline::new(options.clone());
    if options.parallel {
        docs.par_iter_mut().map(|doc| pipeline.run(doc)).collect()
    } else {
        docs.iter_mut().map(|doc| pipeline.run(doc)).collect()
    }
}
