//! Text measurement: Helvetica advance widths and greedy word wrap.
//!
//! Page breaks are computed from measured text, not from a rendering
//! backend, so the measurement must be self-contained. The tables below are
//! the standard AFM advance widths (thousandths of the em) for the base-14
//! Helvetica and Helvetica-Bold fonts, covering printable ASCII; characters
//! outside the table fall back to a representative width. The same tables
//! drive both wrapping here and the PDF writer's right-aligned text, so
//! what is measured is what is drawn.

use crate::layout::geometry::MM_PER_PT;

/// Font style used by the report (the base font family is fixed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FontStyle {
    Normal,
    Bold,
}

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, // 'A'..'P'
    778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'Q'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, // 'a'..'p'
    556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'q'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Helvetica-Bold advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    333, 333, 584, 584, 584, 611, 975, // ':'..'@'
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, // 'A'..'P'
    778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'Q'..'Z'
    333, 278, 333, 584, 556, 333, // '['..'`'
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611, // 'a'..'p'
    611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // 'q'..'z'
    389, 280, 389, 584, // '{'..'~'
];

/// Fallback width for characters outside the table.
const DEFAULT_WIDTH: u16 = 556;

/// Advance width of one character, in 1/1000 em.
fn char_units(c: char, style: FontStyle) -> u16 {
    let table = match style {
        FontStyle::Normal => &HELVETICA,
        FontStyle::Bold => &HELVETICA_BOLD,
    };
    let code = c as u32;
    if (32..=126).contains(&code) {
        table[(code - 32) as usize]
    } else {
        DEFAULT_WIDTH
    }
}

/// Measured width of a string in mm at the given font size (points).
pub fn text_width(text: &str, font_size: f64, style: FontStyle) -> f64 {
    let units: u64 = text.chars().map(|c| char_units(c, style) as u64).sum();
    units as f64 / 1000.0 * font_size * MM_PER_PT
}

/// Greedy word wrap: split `text` into lines no wider than `max_width` mm.
///
/// Existing newlines are hard breaks. A single word wider than the line is
/// split at character boundaries; there is no hyphenation. Empty input
/// yields no lines.
pub fn wrap(text: &str, max_width: f64, font_size: f64, style: FontStyle) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        wrap_paragraph(paragraph, max_width, font_size, style, &mut lines);
    }
    // A trailing empty paragraph from split('\n') on empty input.
    if text.is_empty() {
        lines.clear();
    }
    lines
}

fn wrap_paragraph(
    paragraph: &str,
    max_width: f64,
    font_size: f64,
    style: FontStyle,
    lines: &mut Vec<String>,
) {
    if paragraph.trim().is_empty() {
        lines.push(String::new());
        return;
    }

    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if text_width(&candidate, font_size, style) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        // The word alone may still be too wide: split it by characters.
        if text_width(word, font_size, style) <= max_width {
            current = word.to_string();
        } else {
            current = split_long_word(word, max_width, font_size, style, lines);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
}

/// Push full-width chunks of an over-long word, returning the remainder.
fn split_long_word(
    word: &str,
    max_width: f64,
    font_size: f64,
    style: FontStyle,
    lines: &mut Vec<String>,
) -> String {
    let mut chunk = String::new();
    for c in word.chars() {
        let mut candidate = chunk.clone();
        candidate.push(c);
        if !chunk.is_empty() && text_width(&candidate, font_size, style) > max_width {
            lines.push(chunk);
            chunk = c.to_string();
        } else {
            chunk = candidate;
        }
    }
    chunk
}

/// Height in mm of `text` wrapped to `max_width`, at the given size.
pub fn wrapped_height(text: &str, max_width: f64, font_size: f64, style: FontStyle) -> f64 {
    let count = wrap(text, max_width, font_size, style).len();
    count as f64 * crate::layout::geometry::line_height(font_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_scale_with_font_size() {
        let narrow = text_width("sample", 10.0, FontStyle::Normal);
        let wide = text_width("sample", 20.0, FontStyle::Normal);
        assert!((wide - narrow * 2.0).abs() < 1e-9);
    }

    #[test]
    fn bold_is_wider_than_normal() {
        let n = text_width("Threat", 12.0, FontStyle::Normal);
        let b = text_width("Threat", 12.0, FontStyle::Bold);
        assert!(b > n);
    }

    #[test]
    fn wrap_respects_max_width() {
        let text = "the quick brown fox jumps over the lazy dog";
        let lines = wrap(text, 30.0, 12.0, FontStyle::Normal);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(
                text_width(line, 12.0, FontStyle::Normal) <= 30.0,
                "line too wide: {line:?}"
            );
        }
        // No content lost, words intact.
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn wrap_keeps_hard_breaks() {
        let lines = wrap("one\ntwo", 100.0, 12.0, FontStyle::Normal);
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn overlong_word_is_split_not_dropped() {
        let word = "a".repeat(200);
        let lines = wrap(&word, 20.0, 12.0, FontStyle::Normal);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
        for line in &lines {
            assert!(text_width(line, 12.0, FontStyle::Normal) <= 20.0);
        }
    }

    #[test]
    fn empty_text_has_no_lines() {
        assert!(wrap("", 100.0, 12.0, FontStyle::Normal).is_empty());
        assert_eq!(wrapped_height("", 100.0, 12.0, FontStyle::Normal), 0.0);
    }

    #[test]
    fn blank_line_is_preserved() {
        let lines = wrap("a\n\nb", 100.0, 12.0, FontStyle::Normal);
        assert_eq!(
            lines,
            vec!["a".to_string(), String::new(), "b".to_string()]
        );
    }
}
