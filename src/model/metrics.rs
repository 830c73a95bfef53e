//! Box-model metrics, page facts and element descriptions.
//!
//! These are the raw values a measurement provider reports about the
//! rendered tree. All lengths are CSS pixels at the 96 dpi reference.

use serde::{Deserialize, Serialize};

use super::DiagramType;
use crate::error::{Error, Result};

/// Opaque reference to an element in the rendered tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Classes that mark an explicit page break.
pub const BREAK_MARKER_CLASSES: &[&str] =
    &["page-break", "pagebreak", "page-break-after", "break-after"];

/// Rendered box of a single element.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxMetrics {
    /// Border-box height (content + padding + borders)
    pub offset_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    pub padding_top: f64,
    pub padding_bottom: f64,
    pub border_top: f64,
    pub border_bottom: f64,
    /// Height of the bounding client rect (reflects transforms)
    pub bounding_rect_height: f64,
    /// Top offset within the document flow, when known
    pub offset_top: Option<f64>,
}

impl BoxMetrics {
    /// Create metrics for a box of the given height with no margins.
    pub fn new(offset_height: f64) -> Self {
        Self {
            offset_height,
            bounding_rect_height: offset_height,
            ..Self::default()
        }
    }

    /// Set vertical margins.
    pub fn with_margins(mut self, top: f64, bottom: f64) -> Self {
        self.margin_top = top;
        self.margin_bottom = bottom;
        self
    }

    /// Set vertical padding.
    pub fn with_padding(mut self, top: f64, bottom: f64) -> Self {
        self.padding_top = top;
        self.padding_bottom = bottom;
        self
    }

    /// Set vertical border widths.
    pub fn with_borders(mut self, top: f64, bottom: f64) -> Self {
        self.border_top = top;
        self.border_bottom = bottom;
        self
    }

    pub fn vertical_margins(&self) -> f64 {
        self.margin_top + self.margin_bottom
    }

    pub fn vertical_padding(&self) -> f64 {
        self.padding_top + self.padding_bottom
    }

    pub fn vertical_borders(&self) -> f64 {
        self.border_top + self.border_bottom
    }

    /// Space the element claims in the flow: offset height plus vertical
    /// margins and padding.
    pub fn box_height(&self) -> f64 {
        self.offset_height + self.vertical_margins() + self.vertical_padding()
    }

    /// Visual height, preferring the bounding rect when it was reported.
    pub fn rendered_height(&self) -> f64 {
        if self.bounding_rect_height > 0.0 {
            self.bounding_rect_height
        } else {
            self.offset_height
        }
    }

    /// Return a copy with content heights multiplied by `factor`.
    ///
    /// Margins, padding and borders are left alone.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            offset_height: self.offset_height * factor,
            bounding_rect_height: self.bounding_rect_height * factor,
            ..*self
        }
    }

    /// Reject negative or non-finite values.
    pub fn validate(&self, node: NodeId) -> Result<()> {
        let values = [
            ("offset_height", self.offset_height),
            ("margin_top", self.margin_top),
            ("margin_bottom", self.margin_bottom),
            ("padding_top", self.padding_top),
            ("padding_bottom", self.padding_bottom),
            ("border_top", self.border_top),
            ("border_bottom", self.border_bottom),
            ("bounding_rect_height", self.bounding_rect_height),
        ];
        for (name, value) in values {
            // Negative margins are legal CSS; everything else must be >= 0.
            let allow_negative = name.starts_with("margin");
            if !value.is_finite() || (!allow_negative && value < 0.0) {
                return Err(Error::MalformedMetrics {
                    node: node.0,
                    reason: format!("{} = {}", name, value),
                });
            }
        }
        Ok(())
    }
}

/// Page-level facts used to derive the usable height of a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageFacts {
    /// Full page height
    pub page_height: f64,
    pub margin_top: f64,
    pub margin_bottom: f64,
    /// Running header height
    pub header_height: f64,
    /// Running footer height
    pub footer_height: f64,
    /// False when these are nominal values rather than measurements
    pub measured: bool,
}

impl PageFacts {
    /// A4 height at 96 dpi.
    pub const A4_HEIGHT_PX: f64 = 1123.0;
    /// 20mm at 96 dpi.
    pub const A4_MARGIN_PX: f64 = 76.0;

    /// Create measured page facts with no margins, header or footer.
    pub fn new(page_height: f64) -> Self {
        Self {
            page_height,
            margin_top: 0.0,
            margin_bottom: 0.0,
            header_height: 0.0,
            footer_height: 0.0,
            measured: true,
        }
    }

    /// Nominal A4 page used when the provider cannot measure.
    pub fn nominal_a4() -> Self {
        Self {
            page_height: Self::A4_HEIGHT_PX,
            margin_top: Self::A4_MARGIN_PX,
            margin_bottom: Self::A4_MARGIN_PX,
            header_height: 0.0,
            footer_height: 0.0,
            measured: false,
        }
    }

    /// Set top and bottom page margins.
    pub fn with_margins(mut self, top: f64, bottom: f64) -> Self {
        self.margin_top = top;
        self.margin_bottom = bottom;
        self
    }

    /// Set running header height.
    pub fn with_header(mut self, height: f64) -> Self {
        self.header_height = height;
        self
    }

    /// Set running footer height.
    pub fn with_footer(mut self, height: f64) -> Self {
        self.footer_height = height;
        self
    }

    /// Page height minus margins, header and footer.
    pub fn effective_height(&self) -> f64 {
        self.page_height
            - self.margin_top
            - self.margin_bottom
            - self.header_height
            - self.footer_height
    }

    /// Reject page facts that leave no usable height.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            self.page_height,
            self.margin_top,
            self.margin_bottom,
            self.header_height,
            self.footer_height,
        ];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(Error::Measurement(format!(
                "page facts contain invalid values: {:?}",
                self
            )));
        }
        if self.effective_height() <= 0.0 {
            return Err(Error::Measurement(format!(
                "no usable page height ({} px)",
                self.effective_height()
            )));
        }
        Ok(())
    }
}

impl Default for PageFacts {
    fn default() -> Self {
        Self::nominal_a4()
    }
}

/// CSS `line-height` as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LineHeight {
    #[default]
    Normal,
    /// Multiplier of the font size (e.g. `1.6`)
    Unitless(f64),
    /// Absolute length in pixels
    Px(f64),
}

/// CSS `box-sizing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoxSizing {
    #[default]
    ContentBox,
    BorderBox,
}

/// Computed style values the engine cares about.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementStyle {
    /// Font size in pixels
    pub font_size: Option<f64>,
    pub line_height: LineHeight,
    pub box_sizing: BoxSizing,
    pub break_before: Option<String>,
    pub break_after: Option<String>,
    pub page_break_after: Option<String>,
    pub break_inside: Option<String>,
}

impl ElementStyle {
    /// Whether a `break-after` / `page-break-after` value forces a page break.
    pub fn forces_break_after(&self) -> bool {
        [&self.break_after, &self.page_break_after]
            .into_iter()
            .flatten()
            .any(|v| is_forced_break_value(v))
    }
}

fn is_forced_break_value(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "page" | "always" | "left" | "right" | "recto" | "verso"
    )
}

/// Static description of an element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementInfo {
    /// Lowercase tag name
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Text content (headings only need this)
    pub text: String,
    /// Image source, for `img` elements
    pub src: Option<String>,
    pub style: ElementStyle,
}

impl ElementInfo {
    /// Create an element description for a tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_style(mut self, style: ElementStyle) -> Self {
        self.style = style;
        self
    }

    /// Heading level for `h1`..`h6`.
    pub fn heading_level(&self) -> Option<u8> {
        let bytes = self.tag.as_bytes();
        if bytes.len() == 2 && (bytes[0] == b'h' || bytes[0] == b'H') {
            match bytes[1] {
                b'1'..=b'6' => Some(bytes[1] - b'0'),
                _ => None,
            }
        } else {
            None
        }
    }

    pub fn is_heading(&self) -> bool {
        self.heading_level().is_some()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Explicit page-break marker, by class or by style.
    pub fn is_break_marker(&self) -> bool {
        BREAK_MARKER_CLASSES.iter().any(|c| self.has_class(c)) || self.style.forces_break_after()
    }

    /// Figure kind if this element is a vector figure or an SVG-sourced image.
    pub fn figure_type(&self) -> Option<DiagramType> {
        match self.tag.as_str() {
            "svg" => Some(DiagramType::Svg),
            "img" if self.src.as_deref().is_some_and(is_svg_source) => Some(DiagramType::Image),
            _ => None,
        }
    }

    /// CSS-like selector used in diagnostics.
    pub fn selector(&self) -> String {
        let mut selector = self.tag.clone();
        if let Some(id) = &self.id {
            selector.push('#');
            selector.push_str(id);
        }
        for class in &self.classes {
            selector.push('.');
            selector.push_str(class);
        }
        selector
    }
}

/// Whether an image source points at an SVG file (query and fragment ignored).
fn is_svg_source(src: &str) -> bool {
    let path = src.split(|c| c == '?' || c == '#').next().unwrap_or(src);
    path.to_ascii_lowercase().ends_with(".svg") || src.starts_with("data:image/svg+xml")
}
