//! Value types shared by the analysis and decision phases.
//!
//! Everything here lives for one document's pagination pass. The analyzer
//! produces these types, the scaling engine reads them and writes its final
//! numbers back into [`MeasurementBreakdown`], and the mutation applier
//! consumes the resulting [`ScalingDecision`]s.

mod analysis;
mod block;
mod decision;
mod heading;
mod metrics;

pub use analysis::LayoutAnalysis;
pub use block::{DecisionRecord, DiagramBlock, DiagramType, MeasurementBreakdown, PagePosition};
pub use decision::{ScalingDecision, ScalingMode};
pub use heading::{HeadingInfo, HeadingRef, GENERATED_ID_PREFIX};
pub use metrics::{
    BoxMetrics, BoxSizing, ElementInfo, ElementStyle, LineHeight, NodeId, PageFacts,
    BREAK_MARKER_CLASSES,
};
