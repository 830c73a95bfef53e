//! Scaling decisions handed to the mutation applier.

use serde::{Deserialize, Serialize};

/// Which part of a block shrinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    /// Only the figure shrinks
    FigureOnly,
    /// Heading(s), intervening content and figure shrink together
    EntireBlock,
}

/// Adjustment for one heading + figure block.
///
/// A block without a decision is left as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecision {
    pub heading_id: String,
    /// Always in `(0, 1)`
    pub scale_factor: f64,
    pub scale_entire_block: bool,
    pub force_pre_break: bool,
    pub force_post_break: bool,
}

impl ScalingDecision {
    pub fn mode(&self) -> ScalingMode {
        if self.scale_entire_block {
            ScalingMode::EntireBlock
        } else {
            ScalingMode::FigureOnly
        }
    }
}
