//! Scaling decisions for overflowing blocks.
//!
//! Turns a [`LayoutAnalysis`] into bounded scale factors and page-break
//! directives. The engine only ever shrinks: blocks whose factor would be
//! 1.0 or more get no decision.

use std::collections::BTreeSet;

use crate::model::{DecisionRecord, DiagramBlock, LayoutAnalysis, ScalingDecision};
use crate::policy::LayoutPolicy;

/// Planned adjustment for one block, before it is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPlan {
    pub decision: ScalingDecision,
    pub record: DecisionRecord,
}

/// Scaling engine.
#[derive(Debug, Clone, Default)]
pub struct ScalingEngine {
    policy: LayoutPolicy,
    verbose: bool,
}

impl ScalingEngine {
    /// Create an engine with the given policy.
    pub fn new(policy: LayoutPolicy) -> Self {
        Self {
            policy,
            verbose: false,
        }
    }

    /// Log failed write-backs as warnings.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn policy(&self) -> &LayoutPolicy {
        &self.policy
    }

    /// Decide every block, recording each decision in its breakdown.
    pub fn decide(&self, analysis: &mut LayoutAnalysis) -> Vec<ScalingDecision> {
        self.decide_excluding(analysis, &BTreeSet::new())
    }

    /// Decide every block whose heading is not in `exclude`.
    pub fn decide_excluding(
        &self,
        analysis: &mut LayoutAnalysis,
        exclude: &BTreeSet<String>,
    ) -> Vec<ScalingDecision> {
        let mut decisions = Vec::new();
        for block in analysis.blocks.iter_mut() {
            if exclude.contains(&block.heading_id) {
                log::debug!("'{}' was already scaled, leaving it", block.heading_id);
                continue;
            }
            let Some(plan) = self.plan(block) else {
                continue;
            };
            if let Err(e) = block.write_back(plan.record) {
                if self.verbose {
                    log::warn!("Could not record decision: {}", e);
                } else {
                    log::debug!("Could not record decision: {}", e);
                }
            }
            decisions.push(plan.decision);
        }
        decisions
    }

    /// Work out the adjustment for one block without touching it.
    ///
    /// Returns `None` when the block needs no shrinking.
    pub fn plan(&self, block: &DiagramBlock) -> Option<BlockPlan> {
        let policy = &self.policy;
        let total = block.total_content_height;
        if !(total > 0.0) || !total.is_finite() {
            return None;
        }

        // A block without a usable ratio is treated as the most severe case.
        let ratio = if block.has_valid_ratio() {
            block.overflow_ratio
        } else {
            f64::INFINITY
        };

        let current_diagram = block.current_diagram_height();
        let non_diagram = block.non_diagram_height();
        let reserved = policy.buffer_for(ratio) + policy.next_heading_space;
        let available = block.available_height - reserved;

        let entire_block = block.intermediate_height()
            > policy.intermediate_threshold(block.available_height)
            && total > available;

        let raw = if entire_block {
            let mut factor = (available / total).max(policy.min_scale_block);
            if total * factor + policy.small_buffer > block.available_height {
                let conservative = ((block.available_height - policy.small_buffer) / total)
                    .max(policy.min_scale_block);
                factor = factor.min(conservative);
            }
            factor
        } else {
            let available_for_diagram = available - non_diagram;
            if available_for_diagram <= 0.0 {
                if current_diagram > 0.0 {
                    (available / current_diagram).max(0.3)
                } else {
                    0.5
                }
            } else {
                // infinite for an empty figure, which needs nothing
                available_for_diagram / current_diagram
            }
        };

        if !raw.is_finite() || raw >= 1.0 || raw <= 0.0 {
            log::debug!(
                "'{}' needs no shrinking (factor {:.3})",
                block.heading_id,
                raw
            );
            return None;
        }

        let floor = if entire_block {
            policy.min_scale_block
        } else if ratio > policy.severe_overflow_ratio {
            policy.min_scale_diagram_extreme
        } else if ratio > policy.large_overflow_ratio && raw < 0.15 {
            policy.min_scale_diagram_large
        } else {
            policy.min_scale_diagram_moderate
        };
        let mut factor = raw.max(floor);

        let target = if entire_block {
            block.available_height
        } else {
            block.available_height - reserved
        };
        let final_height = |f: f64| {
            if entire_block {
                total * f
            } else {
                non_diagram + current_diagram * f
            }
        };

        // Shrink further toward the safety target, never below the floor.
        if final_height(factor) > target {
            let goal = target - policy.safety_margin_px;
            let tighter = if entire_block {
                goal / total
            } else if current_diagram > 0.0 {
                (goal - non_diagram) / current_diagram
            } else {
                factor
            };
            if tighter.is_finite() {
                factor = factor.min(tighter.max(floor));
            }
        }

        if !(factor > 0.0) {
            log::debug!("'{}' has no positive scale factor", block.heading_id);
            return None;
        }

        let final_total = final_height(factor);
        let needs_pre_break = !entire_block && final_total > target;
        let force_post_break = final_total > target * policy.post_break_overflow_factor;

        log::debug!(
            "'{}': scale {:.3} ({}), {:.0}px against target {:.0}px, pre {}, post {}",
            block.heading_id,
            factor,
            if entire_block { "entire block" } else { "figure only" },
            final_total,
            target,
            needs_pre_break,
            force_post_break
        );

        Some(BlockPlan {
            decision: ScalingDecision {
                heading_id: block.heading_id.clone(),
                scale_factor: factor,
                scale_entire_block: entire_block,
                force_pre_break: needs_pre_break,
                force_post_break,
            },
            record: DecisionRecord {
                final_scale_factor: factor,
                final_total_height: final_total,
                target_height: target,
                scale_entire_block: entire_block,
                needs_pre_break,
                force_post_break,
            },
        })
    }
}

/// Compute decisions for every block, recording them in the analysis.
pub fn compute_scaling(analysis: &mut LayoutAnalysis, policy: &LayoutPolicy) -> Vec<ScalingDecision> {
    ScalingEngine::new(policy.clone()).decide(analysis)
}

/// Compute decisions, skipping headings that were already adjusted.
pub fn compute_scaling_excluding(
    analysis: &mut LayoutAnalysis,
    policy: &LayoutPolicy,
    exclude: &BTreeSet<String>,
) -> Vec<ScalingDecision> {
    ScalingEngine::new(policy.clone()).decide_excluding(analysis, exclude)
}

/// Compute decisions without modifying the analysis.
pub fn decide(analysis: &LayoutAnalysis, policy: &LayoutPolicy) -> Vec<ScalingDecision> {
    let engine = ScalingEngine::new(policy.clone());
    analysis
        .blocks
        .iter()
        .filter_map(|b| engine.plan(b))
        .map(|p| p.decision)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BoxSizing, DiagramType, MeasurementBreakdown, PageFacts, PagePosition,
    };

    fn block(id: &str, diagram: f64, between: f64, available: f64) -> DiagramBlock {
        let heading = 60.0;
        let margins = 40.0;
        let total = heading + between + diagram + margins;
        DiagramBlock {
            heading_id: id.to_string(),
            heading_text: id.to_string(),
            heading_level: 2,
            diagram_type: DiagramType::Svg,
            diagram_selector: "div.mermaid > svg".to_string(),
            heading_height: heading,
            parent_heading_height: 0.0,
            elements_between_height: between,
            diagram_height: diagram,
            container_margins: margins,
            container_padding: 0.0,
            container_borders: 0.0,
            total_content_height: total,
            available_height: available,
            overflow_ratio: total / available,
            header_height: 0.0,
            footer_height: 0.0,
            breakdown: Some(MeasurementBreakdown {
                content_above_heading: 0.0,
                effective_page_height: available,
                pages_above: 0,
                remainder_on_page: 0.0,
                position: PagePosition::NearTop,
                line_height_allowance: 0.0,
                safety_buffer: 0.0,
                container_box_sizing: BoxSizing::ContentBox,
                sibling_hops: 1,
                decision: None,
            }),
        }
    }

    fn analysis(blocks: Vec<DiagramBlock>) -> LayoutAnalysis {
        LayoutAnalysis::new(PageFacts::new(894.0), blocks)
    }

    #[test]
    fn test_large_vector_figure() {
        // heading 60 + figure 2000 + container 40 on an 894px page
        let mut a = analysis(vec![block("arch", 2000.0, 0.0, 894.0)]);
        let decisions = compute_scaling(&mut a, &LayoutPolicy::default());
        assert_eq!(decisions.len(), 1);

        let d = &decisions[0];
        assert!(!d.scale_entire_block);
        assert!((d.scale_factor - 0.40).abs() < 1e-9);
        assert!(d.force_pre_break);
        assert!(d.force_post_break);

        let record = a.blocks[0].decision_record().unwrap();
        assert!((record.final_total_height - 876.0).abs() < 1e-9);
        assert_eq!(record.target_height, 694.0);
    }

    #[test]
    fn test_moderate_overflow_fits_without_breaks() {
        let mut a = analysis(vec![block("flow", 900.0, 0.0, 894.0)]);
        let decisions = compute_scaling(&mut a, &LayoutPolicy::default());
        let d = &decisions[0];
        assert!(d.scale_factor < 1.0);
        assert!(!d.force_pre_break);
        assert!(!d.force_post_break);
        let record = a.blocks[0].decision_record().unwrap();
        assert!(record.final_total_height <= record.target_height);
    }

    #[test]
    fn test_significant_intermediate_content_scales_entire_block() {
        let mut a = analysis(vec![block("steps", 1200.0, 300.0, 894.0)]);
        let decisions = compute_scaling(&mut a, &LayoutPolicy::default());
        let d = &decisions[0];
        assert!(d.scale_entire_block);
        assert!(!d.force_pre_break);
        assert!(d.scale_factor >= 0.25);
    }

    #[test]
    fn test_severe_overflow_uses_extreme_floor() {
        let mut a = analysis(vec![block("huge", 8000.0, 0.0, 894.0)]);
        let decisions = compute_scaling(&mut a, &LayoutPolicy::default());
        assert!((decisions[0].scale_factor - 0.12).abs() < 1e-9);
        assert!(decisions[0].force_post_break);
    }

    #[test]
    fn test_degenerate_available_height_falls_back() {
        let mut b = block("tiny-page", 600.0, 0.0, 120.0);
        b.overflow_ratio = f64::NAN;
        let mut a = analysis(vec![b]);
        let decisions = compute_scaling(&mut a, &LayoutPolicy::default());
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].scale_factor > 0.0);
        assert!(decisions[0].scale_factor < 1.0);
    }

    #[test]
    fn test_no_upscaling() {
        let mut a = analysis(vec![block("small", 200.0, 0.0, 894.0)]);
        assert!(compute_scaling(&mut a, &LayoutPolicy::default()).is_empty());
        assert!(a.blocks[0].decision_record().is_none());
    }

    #[test]
    fn test_empty_analysis_yields_nothing() {
        let mut a = analysis(Vec::new());
        assert!(compute_scaling(&mut a, &LayoutPolicy::default()).is_empty());
    }

    #[test]
    fn test_missing_breakdown_does_not_block_decision() {
        let mut b = block("bare", 2000.0, 0.0, 894.0);
        b.breakdown = None;
        let mut a = analysis(vec![b]);
        let decisions = ScalingEngine::new(LayoutPolicy::default())
            .verbose(true)
            .decide(&mut a);
        assert_eq!(decisions.len(), 1);
        assert!(a.blocks[0].decision_record().is_none());
    }

    #[test]
    fn test_exclusion_set() {
        let mut a = analysis(vec![
            block("a", 2000.0, 0.0, 894.0),
            block("b", 2000.0, 0.0, 894.0),
        ]);
        let exclude: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        let decisions = compute_scaling_excluding(&mut a, &LayoutPolicy::default(), &exclude);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].heading_id, "b");
    }

    #[test]
    fn test_empty_figure_with_room_needs_nothing() {
        let mut b = block("blank", 0.0, 0.0, 500.0);
        b.heading_height = 300.0;
        b.container_margins = 0.0;
        b.total_content_height = 300.0;
        b.overflow_ratio = 300.0 / 500.0;
        let mut a = analysis(vec![b]);
        assert!(compute_scaling(&mut a, &LayoutPolicy::default()).is_empty());
    }

    #[test]
    fn test_zero_floor_never_yields_zero_factor() {
        let policy = LayoutPolicy::new().with_min_scale_block(0.0);
        let mut a = analysis(vec![block("steps", 1000.0, 360.0, 150.0)]);
        let decisions = compute_scaling(&mut a, &policy);
        assert!(decisions.iter().all(|d| d.scale_factor > 0.0));
    }

    #[test]
    fn test_decide_is_pure() {
        let a = analysis(vec![block("arch", 2000.0, 0.0, 894.0)]);
        let first = decide(&a, &LayoutPolicy::default());
        let second = decide(&a, &LayoutPolicy::default());
        assert_eq!(first, second);
        assert!(a.blocks[0].decision_record().is_none());
    }
}
