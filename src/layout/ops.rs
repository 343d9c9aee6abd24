//! Typed draw operations: the layout engine's output.
//!
//! A [`Document`] is a pure value: positions are absolute millimetres from
//! the top-left corner of each page. Serialising a `Document` gives a
//! stable snapshot for tests; the PDF writer consumes the same value.

use crate::layout::geometry::PageGeometry;
use crate::layout::metrics::FontStyle;
use serde::{Deserialize, Serialize};

/// Horizontal anchoring of a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    /// `x` is the left edge of the run.
    Left,
    /// `x` is the centre of the run.
    Center,
    /// `x` is the right edge of the run.
    Right,
}

/// One positioned draw operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawOp {
    /// A single line of text. `y` is the baseline.
    Text {
        x: f64,
        y: f64,
        size: f64,
        style: FontStyle,
        align: TextAlign,
        text: String,
    },
    /// A JPEG image placed with its top-left corner at (`x`, `y`),
    /// scaled to `width` × `height` mm.
    Image {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        /// Encoded JPEG bytes, embedded verbatim by the PDF writer.
        jpeg: Vec<u8>,
        /// Pixel dimensions of the encoded image.
        px_width: u32,
        px_height: u32,
    },
    /// A stroked rounded rectangle (border decoration).
    RoundedRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        radius: f64,
    },
}

/// One page of positioned operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

/// A fully laid-out report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub geometry: PageGeometry,
    pub pages: Vec<Page>,
}

impl Document {
    /// Every text op on every page, for assertions over rendered content.
    pub fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flat_map(|p| {
            p.ops.iter().filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
        })
    }

    /// True if any text op contains `needle`.
    pub fn contains_text(&self, needle: &str) -> bool {
        self.text_runs().any(|t| t.contains(needle))
    }
}
