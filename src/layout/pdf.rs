//! PDF serialisation of a laid-out [`Document`].
//!
//! Emits a self-contained PDF 1.4 file: base-14 Helvetica fonts (no
//! embedding), uncompressed content streams, and JPEG images passed through
//! as DCTDecode XObjects. Coordinates convert from the layout's
//! top-left-origin millimetres to PDF's bottom-left-origin points.
//!
//! The writer is deterministic: identical documents serialise to identical
//! bytes (numbers are formatted with fixed precision and object ids are
//! assigned in traversal order).

use crate::layout::metrics::{text_width, FontStyle};
use crate::layout::ops::{Document, DrawOp, TextAlign};

/// Points per millimetre.
const PT_PER_MM: f64 = 72.0 / 25.4;

/// Cubic Bézier arc constant for quarter circles.
const KAPPA: f64 = 0.552_284_749_831;

/// Serialise the document to PDF bytes.
pub fn write_pdf(doc: &Document) -> Vec<u8> {
    let mut objects: Vec<Vec<u8>> = Vec::new();

    let page_height = doc.geometry.height;
    let page_w_pt = doc.geometry.width * PT_PER_MM;
    let page_h_pt = page_height * PT_PER_MM;

    // Object ids: 1 catalog, 2 page tree, 3 normal font, 4 bold font, then
    // per page its image XObjects, content stream, and page object.
    let mut next_id: u32 = 5;
    let mut kids: Vec<u32> = Vec::new();
    let mut page_objects: Vec<(u32, Vec<u8>)> = Vec::new();

    for page in &doc.pages {
        let mut image_ids: Vec<u32> = Vec::new();
        let mut image_objs: Vec<(u32, Vec<u8>)> = Vec::new();

        for op in &page.ops {
            if let DrawOp::Image {
                jpeg,
                px_width,
                px_height,
                ..
            } = op
            {
                let id = next_id;
                next_id += 1;
                image_ids.push(id);
                let mut body = format!(
                    "<< /Type /XObject /Subtype /Image /Width {px_width} /Height {px_height} \
                     /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
                    jpeg.len()
                )
                .into_bytes();
                body.extend_from_slice(jpeg);
                body.extend_from_slice(b"\nendstream");
                image_objs.push((id, body));
            }
        }

        let content = page_content(page, page_height, &image_ids);
        let content_id = next_id;
        next_id += 1;
        let mut content_obj =
            format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        content_obj.extend_from_slice(content.as_bytes());
        content_obj.extend_from_slice(b"\nendstream");

        let page_id = next_id;
        next_id += 1;
        let mut resources = String::from("/Font << /F1 3 0 R /F2 4 0 R >>");
        if !image_ids.is_empty() {
            resources.push_str(" /XObject << ");
            for (i, id) in image_ids.iter().enumerate() {
                resources.push_str(&format!("/Im{i} {id} 0 R "));
            }
            resources.push_str(">>");
        }
        let page_obj = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {page_w_pt:.2} {page_h_pt:.2}] \
             /Resources << {resources} >> /Contents {content_id} 0 R >>"
        )
        .into_bytes();

        for obj in image_objs {
            page_objects.push(obj);
        }
        page_objects.push((content_id, content_obj));
        page_objects.push((page_id, page_obj));
        kids.push(page_id);
    }

    // Objects 1-4.
    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());
    let kids_refs: Vec<String> = kids.iter().map(|id| format!("{id} 0 R")).collect();
    objects.push(
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids_refs.join(" "),
            kids.len()
        )
        .into_bytes(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    // Page-related objects were assigned ids 5.. in order; append their
    // bodies in that same order.
    for (_, body) in page_objects {
        objects.push(body);
    }

    assemble(objects)
}

/// Concatenate the object bodies into a full file with xref and trailer.
fn assemble(objects: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets: Vec<usize> = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

/// Render one page's draw operations as a content stream.
fn page_content(page: &crate::layout::ops::Page, page_height_mm: f64, image_ids: &[u32]) -> String {
    let mut s = String::new();
    let mut image_index = 0usize;

    for op in &page.ops {
        match op {
            DrawOp::Text {
                x,
                y,
                size,
                style,
                align,
                text,
            } => {
                let font = match style {
                    FontStyle::Normal => "F1",
                    FontStyle::Bold => "F2",
                };
                let width_mm = text_width(text, *size, *style);
                let x_mm = match align {
                    TextAlign::Left => *x,
                    TextAlign::Center => x - width_mm / 2.0,
                    TextAlign::Right => x - width_mm,
                };
                let x_pt = x_mm * PT_PER_MM;
                let y_pt = (page_height_mm - y) * PT_PER_MM;
                s.push_str(&format!(
                    "BT /{font} {size:.1} Tf {x_pt:.2} {y_pt:.2} Td ({}) Tj ET\n",
                    escape_pdf_text(text)
                ));
            }
            DrawOp::Image {
                x, y, width, height, ..
            } => {
                let w_pt = width * PT_PER_MM;
                let h_pt = height * PT_PER_MM;
                let x_pt = x * PT_PER_MM;
                // PDF places images from their bottom-left corner.
                let y_pt = (page_height_mm - y - height) * PT_PER_MM;
                s.push_str(&format!(
                    "q {w_pt:.2} 0 0 {h_pt:.2} {x_pt:.2} {y_pt:.2} cm /Im{image_index} Do Q\n"
                ));
                image_index += 1;
            }
            DrawOp::RoundedRect {
                x,
                y,
                width,
                height,
                radius,
            } => {
                s.push_str(&rounded_rect_path(*x, *y, *width, *height, *radius, page_height_mm));
            }
        }
    }

    debug_assert_eq!(image_index, image_ids.len());
    s
}

/// Stroked rounded-rectangle path in PDF coordinates.
fn rounded_rect_path(x: f64, y: f64, w: f64, h: f64, r: f64, page_height_mm: f64) -> String {
    let k = PT_PER_MM;
    let x0 = x * k;
    let x1 = (x + w) * k;
    let yt = (page_height_mm - y) * k;
    let yb = (page_height_mm - y - h) * k;
    let r = (r.min(w / 2.0).min(h / 2.0)) * k;
    let c = r * KAPPA;

    let mut s = String::from("q 0.4 G 0.5 w\n");
    s.push_str(&format!("{:.2} {:.2} m\n", x0 + r, yt));
    s.push_str(&format!("{:.2} {:.2} l\n", x1 - r, yt));
    s.push_str(&format!(
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x1 - r + c,
        yt,
        x1,
        yt - r + c,
        x1,
        yt - r
    ));
    s.push_str(&format!("{:.2} {:.2} l\n", x1, yb + r));
    s.push_str(&format!(
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x1,
        yb + r - c,
        x1 - r + c,
        yb,
        x1 - r,
        yb
    ));
    s.push_str(&format!("{:.2} {:.2} l\n", x0 + r, yb));
    s.push_str(&format!(
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x0 + r - c,
        yb,
        x0,
        yb + r - c,
        x0,
        yb + r
    ));
    s.push_str(&format!("{:.2} {:.2} l\n", x0, yt - r));
    s.push_str(&format!(
        "{:.2} {:.2} {:.2} {:.2} {:.2} {:.2} c\n",
        x0,
        yt - r + c,
        x0 + r - c,
        yt,
        x0 + r,
        yt
    ));
    s.push_str("S Q\n");
    s
}

/// Escape text for a PDF literal string. Characters outside WinAnsi's
/// printable range are replaced rather than mis-encoded.
fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            '\n' | '\r' | '\t' => out.push(' '),
            c if (c as u32) < 32 => out.push(' '),
            c if (c as u32) <= 126 => out.push(c),
            c if (c as u32) <= 255 => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => out.push('?'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::geometry::PageGeometry;
    use crate::layout::ops::Page;

    fn doc_with_text(text: &str) -> Document {
        Document {
            geometry: PageGeometry::default(),
            pages: vec![Page {
                ops: vec![DrawOp::Text {
                    x: 20.0,
                    y: 20.0,
                    size: 12.0,
                    style: FontStyle::Normal,
                    align: TextAlign::Left,
                    text: text.to_string(),
                }],
            }],
        }
    }

    #[test]
    fn header_and_trailer_present() {
        let bytes = write_pdf(&doc_with_text("hello"));
        assert!(bytes.starts_with(b"%PDF-1.4"));
        assert!(bytes.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn page_count_matches_document() {
        let doc = Document {
            geometry: PageGeometry::default(),
            pages: vec![Page::default(), Page::default(), Page::default()],
        };
        let text = String::from_utf8_lossy(&write_pdf(&doc)).into_owned();
        assert!(text.contains("/Count 3"));
    }

    #[test]
    fn output_is_deterministic() {
        let doc = doc_with_text("same input, same bytes");
        assert_eq!(write_pdf(&doc), write_pdf(&doc));
    }

    #[test]
    fn parens_are_escaped() {
        let bytes = write_pdf(&doc_with_text("call(api) \\ done"));
        let text = String::from_utf8_lossy(&bytes).into_owned();
        assert!(text.contains(r"call\(api\) \\ done"));
    }

    #[test]
    fn non_ascii_is_octal_or_replaced() {
        assert_eq!(escape_pdf_text("café"), "caf\\351");
        assert_eq!(escape_pdf_text("→"), "?");
    }
}
