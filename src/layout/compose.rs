//! Report composition: a completed analysis record in, positioned pages out.
//!
//! `render` is a pure function of (record, image bytes, geometry). The
//! cursor walks down each page; every block's height is computed from the
//! measured text before anything is emitted, and a block that would cross
//! the bottom margin forces a page break first. Plain prose flows line by
//! line across pages; a threat block is placed as a unit so its border
//! always encloses its text.
//!
//! Section order is fixed: title page, architecture (user text, optional
//! diagram, AI text), data-flow description, then one block per threat in
//! record order.

use crate::layout::geometry::{line_height, PageGeometry};
use crate::layout::metrics::{self, FontStyle};
use crate::layout::ops::{Document, DrawOp, Page, TextAlign};
use crate::record::AnalysisRecord;
use image::GenericImageView;
use std::io::Cursor;
use tracing::warn;

// Font sizes (points), matching the original report renderer.
const SIZE_TITLE: f64 = 24.0;
const SIZE_SECTION: f64 = 18.0;
const SIZE_SUBTITLE: f64 = 16.0;
const SIZE_THREAT_NAME: f64 = 14.0;
const SIZE_BODY: f64 = 12.0;
const SIZE_DFD: f64 = 11.0;
const SIZE_SMALL: f64 = 10.0;

// Threat block internals (mm). The fixed part of a block's height:
// top pad to the name baseline (10) + gap to the category line (8) +
// gap to the description (8) + gap between sections (5) + bottom pad (8).
const THREAT_BLOCK_FIXED: f64 = 39.0;
const THREAT_INNER_PAD: f64 = 5.0;
const THREAT_BLOCK_GAP: f64 = 10.0;
const THREAT_CORNER_RADIUS: f64 = 3.0;

/// Lay out the full report for a completed analysis.
///
/// `image_bytes` is the stored diagram, if any; a diagram that fails to
/// decode is skipped and layout continues without it.
pub fn render(
    record: &AnalysisRecord,
    image_bytes: Option<&[u8]>,
    geometry: &PageGeometry,
) -> Document {
    let mut c = Composer::new(*geometry);

    title_page(&mut c, record);

    c.new_page();
    architecture_section(&mut c, record, image_bytes);

    c.new_page();
    dfd_section(&mut c, record);

    c.new_page();
    threats_section(&mut c, record);

    c.finish()
}

// ── Sections ─────────────────────────────────────────────────────────────

fn title_page(c: &mut Composer, record: &AnalysisRecord) {
    let center = c.geometry.width / 2.0;
    let title = if record.title.is_empty() {
        "Threat Model Report"
    } else {
        &record.title
    };

    c.text_at(center, SIZE_TITLE, FontStyle::Bold, TextAlign::Center, title);
    c.advance(15.0);
    c.text_at(
        center,
        SIZE_BODY,
        FontStyle::Normal,
        TextAlign::Center,
        &format!("Report generated: {}", record.created_at.format("%Y-%m-%d")),
    );
    c.advance(20.0);

    c.text(SIZE_SUBTITLE, FontStyle::Bold, "Analysis Inputs");
    c.advance(10.0);
    c.text(
        SIZE_BODY,
        FontStyle::Normal,
        &format!("Application Type: {}", record.app_type.label()),
    );
    c.advance(7.0);
    c.text(
        SIZE_BODY,
        FontStyle::Normal,
        &format!("Data Classification: {}", record.classification.label()),
    );
    c.advance(7.0);
}

fn architecture_section(c: &mut Composer, record: &AnalysisRecord, image_bytes: Option<&[u8]>) {
    c.text(SIZE_SECTION, FontStyle::Bold, "System Architecture");
    c.advance(10.0);

    let user_text = if record.user_description.trim().is_empty() {
        "N/A".to_string()
    } else {
        record.user_description.clone()
    };
    c.flow_text(
        &format!("User-Provided Description: {user_text}"),
        SIZE_BODY,
        FontStyle::Normal,
    );
    c.advance(10.0);

    if let Some(bytes) = image_bytes {
        match decode_diagram(bytes) {
            Some(diagram) => {
                c.flow_text("Provided Diagram:", SIZE_BODY, FontStyle::Normal);
                c.advance(5.0);
                c.image_block(diagram);
                c.advance(10.0);
            }
            None => {
                // Non-fatal: the report simply omits the diagram.
                warn!("diagram could not be decoded, continuing without it");
            }
        }
    }

    c.flow_text(
        &format!("AI-Generated Description: {}", record.ai_description),
        SIZE_BODY,
        FontStyle::Normal,
    );
}

fn dfd_section(c: &mut Composer, record: &AnalysisRecord) {
    c.text(SIZE_SECTION, FontStyle::Bold, "Data Flow Diagram (DFD) Details");
    c.advance(10.0);
    c.flow_text(&record.dfd_description, SIZE_DFD, FontStyle::Normal);
}

fn threats_section(c: &mut Composer, record: &AnalysisRecord) {
    c.text(SIZE_SECTION, FontStyle::Bold, "Threat Analysis Results");
    c.advance(15.0);

    if record.threats.is_empty() {
        c.flow_text(
            "No threats were identified for the provided inputs.",
            SIZE_BODY,
            FontStyle::Normal,
        );
        return;
    }

    for threat in &record.threats {
        threat_block(c, threat);
    }
}

/// One bordered threat block. Height is computed from the wrapped sections
/// before any operation is emitted; the border is sized from that height,
/// so compute must precede draw.
fn threat_block(c: &mut Composer, threat: &crate::record::Threat) {
    let geometry = c.geometry;
    let content_width = geometry.content_width();
    let inner_width = content_width - THREAT_INNER_PAD * 2.0;

    let description = format!("Description: {}", threat.description);
    let mitigation = format!("Mitigation: {}", threat.mitigation);
    let desc_height = metrics::wrapped_height(&description, inner_width, SIZE_SMALL, FontStyle::Normal);
    let mit_height = metrics::wrapped_height(&mitigation, inner_width, SIZE_SMALL, FontStyle::Normal);
    let height = THREAT_BLOCK_FIXED + desc_height + mit_height;

    c.ensure_room(height);

    let x = geometry.margin;
    let top = c.y;
    c.push(DrawOp::RoundedRect {
        x,
        y: top,
        width: content_width,
        height,
        radius: THREAT_CORNER_RADIUS,
    });

    let inner_x = x + THREAT_INNER_PAD;
    let mut inner_y = top + 10.0;

    c.push(DrawOp::Text {
        x: inner_x,
        y: inner_y,
        size: SIZE_THREAT_NAME,
        style: FontStyle::Bold,
        align: TextAlign::Left,
        text: threat.name.clone(),
    });
    c.push(DrawOp::Text {
        x: geometry.width - geometry.margin - THREAT_INNER_PAD,
        y: inner_y - 1.0,
        size: SIZE_SMALL,
        style: FontStyle::Normal,
        align: TextAlign::Right,
        text: format!("Status: {}", threat.status.label()),
    });
    inner_y += 8.0;

    c.push(DrawOp::Text {
        x: inner_x,
        y: inner_y,
        size: SIZE_SMALL,
        style: FontStyle::Bold,
        align: TextAlign::Left,
        text: format!("Category: {}", threat.category.label()),
    });
    inner_y += 8.0;

    inner_y = c.place_wrapped(&description, inner_x, inner_y, inner_width, SIZE_SMALL);
    inner_y += 5.0;
    c.place_wrapped(&mitigation, inner_x, inner_y, inner_width, SIZE_SMALL);

    c.y += height + THREAT_BLOCK_GAP;
}

// ── Diagram handling ─────────────────────────────────────────────────────

struct Diagram {
    jpeg: Vec<u8>,
    px_width: u32,
    px_height: u32,
}

/// Decode the stored diagram and re-encode it as JPEG for embedding.
/// Returns `None` when the bytes are not a decodable image.
fn decode_diagram(bytes: &[u8]) -> Option<Diagram> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!(error = %e, "diagram decode failed");
            return None;
        }
    };
    let (px_width, px_height) = img.dimensions();
    if px_width == 0 || px_height == 0 {
        return None;
    }
    let mut jpeg = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), 85);
    if let Err(e) = img.to_rgb8().write_with_encoder(encoder) {
        warn!(error = %e, "diagram re-encode failed");
        return None;
    }
    Some(Diagram {
        jpeg,
        px_width,
        px_height,
    })
}

// ── Composer ─────────────────────────────────────────────────────────────

/// Cursor-tracking page builder. `y` is the next baseline / block top in mm
/// from the top of the current page; it never exceeds the bottom margin.
struct Composer {
    geometry: PageGeometry,
    pages: Vec<Page>,
    y: f64,
}

impl Composer {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: vec![Page::default()],
            y: geometry.margin,
        }
    }

    fn finish(self) -> Document {
        Document {
            geometry: self.geometry,
            pages: self.pages,
        }
    }

    fn push(&mut self, op: DrawOp) {
        match self.pages.last_mut() {
            Some(page) => page.ops.push(op),
            None => self.pages.push(Page { ops: vec![op] }),
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = self.geometry.margin;
    }

    /// Break to a new page if a block of `height` mm would cross the
    /// bottom margin from the current cursor.
    fn ensure_room(&mut self, height: f64) {
        if self.y + height > self.geometry.bottom_limit() {
            self.new_page();
        }
    }

    fn advance(&mut self, dy: f64) {
        self.y += dy;
        if self.y > self.geometry.bottom_limit() {
            self.new_page();
        }
    }

    /// Emit one line at the left margin without moving the cursor.
    fn text(&mut self, size: f64, style: FontStyle, text: &str) {
        self.text_at(self.geometry.margin, size, style, TextAlign::Left, text);
    }

    /// Emit one line at an explicit x without moving the cursor.
    fn text_at(&mut self, x: f64, size: f64, style: FontStyle, align: TextAlign, text: &str) {
        let y = self.y;
        self.push(DrawOp::Text {
            x,
            y,
            size,
            style,
            align,
            text: text.to_string(),
        });
    }

    /// Wrap `text` to the content width and flow it line by line, breaking
    /// pages wherever the next line would not fit. Advances the cursor.
    fn flow_text(&mut self, text: &str, size: f64, style: FontStyle) {
        let max_width = self.geometry.content_width();
        let lh = line_height(size);
        for line in metrics::wrap(text, max_width, size, style) {
            self.ensure_room(lh);
            if !line.is_empty() {
                let x = self.geometry.margin;
                let y = self.y;
                self.push(DrawOp::Text {
                    x,
                    y,
                    size,
                    style,
                    align: TextAlign::Left,
                    text: line,
                });
            }
            self.y += lh;
        }
    }

    /// Emit pre-wrapped text at a fixed x inside a block (no page breaks:
    /// the caller has already reserved the room). Returns the y after the
    /// last line.
    fn place_wrapped(&mut self, text: &str, x: f64, start_y: f64, max_width: f64, size: f64) -> f64 {
        let lh = line_height(size);
        let mut y = start_y;
        for line in metrics::wrap(text, max_width, size, FontStyle::Normal) {
            if !line.is_empty() {
                self.push(DrawOp::Text {
                    x,
                    y,
                    size,
                    style: FontStyle::Normal,
                    align: TextAlign::Left,
                    text: line,
                });
            }
            y += lh;
        }
        y
    }

    /// Place the diagram scaled to the content width (clamped to the
    /// printable height), breaking the page first if it does not fit.
    fn image_block(&mut self, diagram: Diagram) {
        let aspect = diagram.px_width as f64 / diagram.px_height as f64;
        let mut width = self.geometry.content_width();
        let mut height = width / aspect;
        if height > self.geometry.printable_height() {
            height = self.geometry.printable_height();
            width = height * aspect;
        }

        self.ensure_room(height);
        let x = self.geometry.margin;
        let y = self.y;
        self.push(DrawOp::Image {
            x,
            y,
            width,
            height,
            jpeg: diagram.jpeg,
            px_width: diagram.px_width,
            px_height: diagram.px_height,
        });
        self.y += height;
    }
}
