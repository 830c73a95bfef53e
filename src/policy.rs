//! Fitting policy and configuration.
//!
//! Every threshold the analyzer and the scaling engine use lives in
//! [`LayoutPolicy`]. It is passed by value; there is no global state.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Thresholds for analysis and scaling. All lengths are pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutPolicy {
    // ---- scaling ----
    /// Space reserved after a block for the next heading
    pub next_heading_space: f64,

    /// Buffer used for moderate overflow
    pub small_buffer: f64,

    /// Buffer used once overflow exceeds `large_overflow_ratio`
    pub large_buffer: f64,

    /// Fraction of available height above which intervening content is significant
    pub intermediate_ratio: f64,

    /// Cap on the significance threshold
    pub intermediate_px_cap: f64,

    /// Floor for entire-block scaling
    pub min_scale_block: f64,

    /// Figure-only floor for moderate overflow
    pub min_scale_diagram_moderate: f64,

    /// Figure-only floor for large overflow
    pub min_scale_diagram_large: f64,

    /// Figure-only floor for severe overflow
    pub min_scale_diagram_extreme: f64,

    pub severe_overflow_ratio: f64,
    pub large_overflow_ratio: f64,

    /// Tolerated overshoot of the target before a trailing break is forced
    pub post_break_overflow_factor: f64,

    /// Margin kept below the target when shrinking further
    pub safety_margin_px: f64,

    // ---- analysis ----
    /// Sibling hops searched for a figure after a heading
    pub max_sibling_hops: usize,

    /// Space assumed lost at the top of a page
    pub page_top_buffer: f64,

    /// Remainder below which a heading is assumed to sit on a mostly-empty page
    pub small_remainder_px: f64,

    /// Lower bound of the generous estimate
    pub generous_min_available: f64,

    /// Content above this is "near the top"
    pub near_top_px: f64,

    /// Fraction of the effective page under which content is taken literally
    pub same_page_fraction: f64,

    /// Added to every block's total content height
    pub content_safety_buffer: f64,

    /// Heading height / font size ratio that triggers the line-height allowance
    pub line_height_trigger: f64,
}

impl LayoutPolicy {
    /// Create a policy with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy from a preset.
    pub fn from_preset(preset: PolicyPreset) -> Self {
        match preset {
            PolicyPreset::Standard => Self::default(),
            PolicyPreset::Conservative => Self {
                min_scale_block: 0.40,
                min_scale_diagram_moderate: 0.55,
                min_scale_diagram_large: 0.35,
                min_scale_diagram_extreme: 0.25,
                post_break_overflow_factor: 1.05,
                ..Self::default()
            },
            PolicyPreset::Aggressive => Self {
                next_heading_space: 60.0,
                small_buffer: 32.0,
                large_buffer: 64.0,
                min_scale_block: 0.15,
                min_scale_diagram_moderate: 0.30,
                min_scale_diagram_large: 0.15,
                min_scale_diagram_extreme: 0.08,
                post_break_overflow_factor: 1.20,
                ..Self::default()
            },
        }
    }

    /// Load a policy from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Parse a policy from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let policy: Self = serde_json::from_str(json)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Set the space reserved for the next heading.
    pub fn with_next_heading_space(mut self, px: f64) -> Self {
        self.next_heading_space = px;
        self
    }

    /// Set the small and large buffers.
    pub fn with_buffers(mut self, small: f64, large: f64) -> Self {
        self.small_buffer = small;
        self.large_buffer = large;
        self
    }

    /// Set the intermediate-content threshold parameters.
    pub fn with_intermediate_threshold(mut self, ratio: f64, px_cap: f64) -> Self {
        self.intermediate_ratio = ratio;
        self.intermediate_px_cap = px_cap;
        self
    }

    /// Set the entire-block floor.
    pub fn with_min_scale_block(mut self, floor: f64) -> Self {
        self.min_scale_block = floor;
        self
    }

    /// Set the figure-only floors (moderate, large, extreme).
    pub fn with_diagram_floors(mut self, moderate: f64, large: f64, extreme: f64) -> Self {
        self.min_scale_diagram_moderate = moderate;
        self.min_scale_diagram_large = large;
        self.min_scale_diagram_extreme = extreme;
        self
    }

    /// Set the overflow-severity thresholds.
    pub fn with_overflow_ratios(mut self, large: f64, severe: f64) -> Self {
        self.large_overflow_ratio = large;
        self.severe_overflow_ratio = severe;
        self
    }

    /// Set the post-break overflow factor.
    pub fn with_post_break_factor(mut self, factor: f64) -> Self {
        self.post_break_overflow_factor = factor;
        self
    }

    /// Set the safety margin.
    pub fn with_safety_margin(mut self, px: f64) -> Self {
        self.safety_margin_px = px;
        self
    }

    /// Set the sibling-search window.
    pub fn with_max_sibling_hops(mut self, hops: usize) -> Self {
        self.max_sibling_hops = hops;
        self
    }

    /// Threshold above which intervening content counts as significant.
    pub fn intermediate_threshold(&self, available_height: f64) -> f64 {
        self.intermediate_px_cap
            .min(available_height * self.intermediate_ratio)
    }

    /// Buffer for a given overflow ratio.
    pub fn buffer_for(&self, overflow_ratio: f64) -> f64 {
        if overflow_ratio > self.large_overflow_ratio {
            self.large_buffer
        } else {
            self.small_buffer
        }
    }

    /// Check that every value is in a usable range.
    pub fn validate(&self) -> Result<()> {
        let floors = [
            ("min_scale_block", self.min_scale_block),
            ("min_scale_diagram_moderate", self.min_scale_diagram_moderate),
            ("min_scale_diagram_large", self.min_scale_diagram_large),
            ("min_scale_diagram_extreme", self.min_scale_diagram_extreme),
        ];
        for (name, value) in floors {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::InvalidPolicy(format!(
                    "{} must be in (0, 1), got {}",
                    name, value
                )));
            }
        }

        let lengths = [
            ("next_heading_space", self.next_heading_space),
            ("small_buffer", self.small_buffer),
            ("large_buffer", self.large_buffer),
            ("intermediate_px_cap", self.intermediate_px_cap),
            ("safety_margin_px", self.safety_margin_px),
            ("page_top_buffer", self.page_top_buffer),
            ("small_remainder_px", self.small_remainder_px),
            ("generous_min_available", self.generous_min_available),
            ("near_top_px", self.near_top_px),
            ("content_safety_buffer", self.content_safety_buffer),
        ];
        for (name, value) in lengths {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidPolicy(format!(
                    "{} must be a non-negative length, got {}",
                    name, value
                )));
            }
        }

        let ratios = [
            ("large_overflow_ratio", self.large_overflow_ratio),
            ("severe_overflow_ratio", self.severe_overflow_ratio),
            ("line_height_trigger", self.line_height_trigger),
        ];
        for (name, value) in ratios {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidPolicy(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if !(self.intermediate_ratio > 0.0 && self.intermediate_ratio <= 1.0) {
            return Err(Error::InvalidPolicy(format!(
                "intermediate_ratio must be in (0, 1], got {}",
                self.intermediate_ratio
            )));
        }

        let post = self.post_break_overflow_factor;
        if !post.is_finite() || post < 1.0 {
            return Err(Error::InvalidPolicy(format!(
                "post_break_overflow_factor must be >= 1, got {}",
                self.post_break_overflow_factor
            )));
        }
        if self.large_overflow_ratio > self.severe_overflow_ratio {
            return Err(Error::InvalidPolicy(format!(
                "large_overflow_ratio ({}) exceeds severe_overflow_ratio ({})",
                self.large_overflow_ratio, self.severe_overflow_ratio
            )));
        }
        if self.max_sibling_hops == 0 {
            return Err(Error::InvalidPolicy(
                "max_sibling_hops must be at least 1".to_string(),
            ));
        }
        if !(self.same_page_fraction > 0.0 && self.same_page_fraction <= 1.0) {
            return Err(Error::InvalidPolicy(format!(
                "same_page_fraction must be in (0, 1], got {}",
                self.same_page_fraction
            )));
        }
        Ok(())
    }
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        Self {
            next_heading_space: 100.0,
            small_buffer: 48.0,
            large_buffer: 100.0,
            intermediate_ratio: 0.15,
            intermediate_px_cap: 100.0,
            min_scale_block: 0.25,
            min_scale_diagram_moderate: 0.40,
            min_scale_diagram_large: 0.20,
            min_scale_diagram_extreme: 0.12,
            severe_overflow_ratio: 2.5,
            large_overflow_ratio: 2.0,
            post_break_overflow_factor: 1.10,
            safety_margin_px: 16.0,
            max_sibling_hops: 10,
            page_top_buffer: 50.0,
            small_remainder_px: 200.0,
            generous_min_available: 500.0,
            near_top_px: 100.0,
            same_page_fraction: 0.5,
            content_safety_buffer: 48.0,
            line_height_trigger: 1.5,
        }
    }
}

/// Named policy profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyPreset {
    /// Higher floors; prefers breaking over shrinking
    Conservative,
    /// Default thresholds
    #[default]
    Standard,
    /// Lower floors and smaller reserves; packs more per page
    Aggressive,
}
