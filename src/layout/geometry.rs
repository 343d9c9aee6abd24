//! Page geometry and typographic constants.
//!
//! All layout distances are millimetres on an A4 portrait page; font sizes
//! are points. The line-height ratio matches the original report renderer
//! so existing documents re-render with identical page breaks.

use serde::{Deserialize, Serialize};

/// Millimetres per PDF point (1 pt = 1/72 inch).
pub const MM_PER_PT: f64 = 25.4 / 72.0;

/// Line height in mm for a font size in points: `size / LINE_HEIGHT_DIVISOR`.
pub const LINE_HEIGHT_DIVISOR: f64 = 2.8;

/// Page dimensions and margins for the rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Page width in mm.
    pub width: f64,
    /// Page height in mm.
    pub height: f64,
    /// Uniform margin in mm.
    pub margin: f64,
}

impl Default for PageGeometry {
    /// A4 portrait with 20 mm margins.
    fn default() -> Self {
        Self {
            width: 210.0,
            height: 297.0,
            margin: 20.0,
        }
    }
}

impl PageGeometry {
    /// Horizontal space available to content.
    pub fn content_width(&self) -> f64 {
        self.width - self.margin * 2.0
    }

    /// Lowest cursor position content may still occupy.
    pub fn bottom_limit(&self) -> f64 {
        self.height - self.margin
    }

    /// Vertical space available to content on an empty page.
    pub fn printable_height(&self) -> f64 {
        self.height - self.margin * 2.0
    }
}

/// Line height in mm for the given font size in points.
pub fn line_height(font_size: f64) -> f64 {
    font_size / LINE_HEIGHT_DIVISOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_content_width() {
        let g = PageGeometry::default();
        assert_eq!(g.content_width(), 170.0);
        assert_eq!(g.bottom_limit(), 277.0);
        assert_eq!(g.printable_height(), 257.0);
    }

    #[test]
    fn line_height_ratio() {
        assert!((line_height(12.0) - 4.2857).abs() < 1e-3);
    }
}
