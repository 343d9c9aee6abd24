//! Deterministic cleanup of model prose before it is stored as stage output.
//!
//! Models occasionally wrap replies in code fences despite instructions,
//! emit Windows line endings, or leak invisible Unicode. These rules fix
//! such artefacts without touching content, so stage outputs render the
//! same way regardless of which backend produced them. Each rule is a pure
//! `&str -> String` function with no shared state.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw model prose, in order:
///
/// 1. Strip an outer code fence wrapping the whole reply
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Trim leading/trailing blank space
pub fn clean_prose(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode ─────────────────────────────────────

const INVISIBLE: [char; 6] = [
    '\u{200B}', // zero-width space
    '\u{200C}', // zero-width non-joiner
    '\u{200D}', // zero-width joiner
    '\u{2060}', // word joiner
    '\u{FEFF}', // BOM
    '\u{00AD}', // soft hyphen
];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_outer_fence() {
        assert_eq!(clean_prose("```markdown\nThe system.\n```"), "The system.");
        assert_eq!(clean_prose("```\ncontent\n```"), "content");
    }

    #[test]
    fn inner_fences_survive() {
        let input = "before\n```\ncode\n```\nafter";
        assert_eq!(clean_prose(input), input);
    }

    #[test]
    fn normalises_crlf() {
        assert_eq!(clean_prose("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_prose("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn strips_invisible_chars() {
        assert_eq!(clean_prose("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn trims_outer_whitespace() {
        assert_eq!(clean_prose("  \n text \n  "), "text");
    }
}
