//! Text cleaning and normalization for TTS processing.
//!
//! Raw PDF text arrives with page breaks as form feeds, running headers and
//! footers, page numbers and words hyphenated across lines. None of that should
//! be read aloud.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Page separator emitted by the PDF text layer and by the OCR fallback.
pub const PAGE_BREAK: char = '\x0C';

/// Lines longer than this are never treated as running headers or footers.
const MAX_HEADER_LEN: usize = 80;

/// A running header must appear on at least this many pages.
const MIN_HEADER_PAGES: usize = 3;

/// Characters that can cause TTS issues and their replacements.
const PROBLEMATIC_CHARS: &[(char, &str)] = &[
    ('\u{2018}', "'"),   // Left single quote
    ('\u{2019}', "'"),   // Right single quote
    ('\u{201c}', "\""),  // Left double quote
    ('\u{201d}', "\""),  // Right double quote
    ('\u{2013}', "-"),   // En dash
    ('\u{2014}', "-"),   // Em dash
    ('\u{2026}', "..."), // Ellipsis
    ('\u{00a0}', " "),   // Non-breaking space
    ('\u{00ad}', ""),    // Soft hyphen
    ('\u{200b}', ""),    // Zero-width space
    ('\u{200c}', ""),    // Zero-width non-joiner
    ('\u{200d}', ""),    // Zero-width joiner
    ('\u{feff}', ""),    // BOM
    ('\u{2011}', "-"),   // Non-breaking hyphen
    ('\u{2012}', "-"),   // Figure dash
    ('\u{2015}', "-"),   // Horizontal bar
    ('\u{2212}', "-"),   // Minus sign
    ('\u{2032}', "'"),   // Prime
    ('\u{2033}', "\""),  // Double prime
    ('\u{00ab}', "\""),  // Left-pointing double angle quote
    ('\u{00bb}', "\""),  // Right-pointing double angle quote
    ('\u{fb00}', "ff"),  // Ligatures common in typeset PDFs
    ('\u{fb01}', "fi"),
    ('\u{fb02}', "fl"),
    ('\u{fb03}', "ffi"),
    ('\u{fb04}', "ffl"),
];

fn page_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:page\s+)?-?\s*(\d{1,4})\s*-?(?:\s*(?:of|/)\s*\d{1,4})?$")
            .expect("page number pattern is valid")
    })
}

fn roman_numeral_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^-?\s*(?:x{0,3})(?:ix|iv|v?i{0,3})\s*-?$").expect("roman numeral pattern is valid")
    })
}

fn hyphenation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\p{L})-[ \t]*\n[ \t]*(\p{Ll})").expect("hyphenation pattern is valid")
    })
}

/// Clean raw extracted text for TTS processing.
///
/// This function:
/// - Replaces problematic Unicode characters (smart quotes, dashes, ligatures)
/// - Removes control characters
/// - Drops running headers/footers and lone page-number lines
/// - Rejoins words hyphenated across line breaks
/// - Fixes runs of periods that cause TTS noise
/// - Collapses all whitespace to single spaces
///
/// The result is a single line, possibly empty.
pub fn clean_text(raw: &str) -> String {
    let text = replace_characters(raw);
    let text = strip_boilerplate(&text);
    let text = hyphenation_regex().replace_all(&text, "$1$2");
    let text = fix_multiple_periods(&text);
    collapse_whitespace(&text)
}

/// Replace problematic characters and drop control characters.
///
/// Newlines, tabs and page breaks survive; carriage returns do not.
fn replace_characters(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for c in text.chars() {
        let replacement = PROBLEMATIC_CHARS
            .iter()
            .find(|(ch, _)| *ch == c)
            .map(|(_, r)| *r);

        if let Some(r) = replacement {
            result.push_str(r);
        } else if is_allowed_char(c) {
            result.push(c);
        }
    }

    result
}

fn is_allowed_char(c: char) -> bool {
    if c == '\n' || c == '\t' || c == PAGE_BREAK {
        return true;
    }
    !c.is_control()
}

/// Remove page-number lines and running headers/footers, page by page.
fn strip_boilerplate(text: &str) -> String {
    let pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    let headers = find_running_headers(&pages);

    let mut kept = Vec::new();
    for page in pages {
        for line in page.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || is_page_number_line(trimmed) {
                continue;
            }
            if headers.contains(&header_key(trimmed)) {
                continue;
            }
            kept.push(line);
        }
    }

    kept.join("\n")
}

/// Check if a trimmed line is nothing but a page number.
pub fn is_page_number_line(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    if page_number_regex().is_match(line) {
        return true;
    }
    // Front matter is usually numbered in lowercase roman numerals.
    let stripped = line.trim_matches(|c: char| c == '-' || c.is_whitespace());
    !stripped.is_empty() && roman_numeral_regex().is_match(line)
}

/// Lines that open or close at least half of the pages are running headers.
fn find_running_headers(pages: &[&str]) -> HashSet<String> {
    let content_pages: Vec<&&str> = pages.iter().filter(|p| !p.trim().is_empty()).collect();
    if content_pages.len() < MIN_HEADER_PAGES {
        return HashSet::new();
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for page in &content_pages {
        let mut lines = page
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !is_page_number_line(l));
        let first = lines.next();
        let last = lines.last();

        let mut seen = HashSet::new();
        for line in first.into_iter().chain(last) {
            if line.chars().count() <= MAX_HEADER_LEN {
                seen.insert(header_key(line));
            }
        }
        for key in seen {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    let threshold = content_pages.len().div_ceil(2).max(MIN_HEADER_PAGES);
    counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(key, _)| key)
        .collect()
}

/// Comparison key for header lines: whitespace collapsed, digits masked so
/// that "Chapter 3 - 41" and "Chapter 3 - 42" match.
fn header_key(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(|c| if c.is_ascii_digit() { '#' } else { c })
        .collect()
}

/// Replace multiple consecutive periods with a single period.
fn fix_multiple_periods(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut period_count = 0;

    for c in text.chars() {
        if c == '.' {
            period_count += 1;
            if period_count == 1 {
                result.push('.');
            }
        } else {
            period_count = 0;
            result.push(c);
        }
    }

    result
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_smart_quotes() {
        let text = "\u{201c}Hello,\u{201d} said John. \u{2018}It\u{2019}s nice.\u{2019}";
        let cleaned = clean_text(text);
        assert_eq!(cleaned, "\"Hello,\" said John. 'It's nice.'");
    }

    #[test]
    fn test_clean_dashes_and_ligatures() {
        assert_eq!(clean_text("one–two—three"), "one-two-three");
        assert_eq!(clean_text("ef\u{fb01}cient \u{fb02}ow"), "efficient flow");
    }

    #[test]
    fn test_clean_multiple_periods() {
        assert_eq!(clean_text("Wait… what.. is this...."), "Wait. what. is this.");
    }

    #[test]
    fn test_collapses_all_whitespace() {
        let text = "Hello   world\n\n\n\nNew\tparagraph\r\n";
        assert_eq!(clean_text(text), "Hello world New paragraph");
    }

    #[test]
    fn test_clean_control_chars() {
        assert_eq!(clean_text("Hello\x00World\x07Test"), "HelloWorldTest");
    }

    #[test]
    fn test_removes_page_number_lines() {
        let text = "The results were clear.\n12\nWe continue here.\n- 13 -\nPage 14 of 20\nxii\nDone.";
        assert_eq!(
            clean_text(text),
            "The results were clear. We continue here. Done."
        );
    }

    #[test]
    fn test_keeps_numbers_inside_sentences() {
        let text = "There were 12 samples.\n42 of them failed.";
        assert_eq!(clean_text(text), "There were 12 samples. 42 of them failed.");
    }

    #[test]
    fn test_page_number_detection() {
        assert!(is_page_number_line("7"));
        assert!(is_page_number_line("Page 7"));
        assert!(is_page_number_line("page 7 of 30"));
        assert!(is_page_number_line("7/30"));
        assert!(is_page_number_line("- 7 -"));
        assert!(is_page_number_line("iv"));
        assert!(!is_page_number_line("Introduction"));
        assert!(!is_page_number_line("7 samples were taken"));
        assert!(!is_page_number_line(""));
        assert!(!is_page_number_line("-"));
    }

    #[test]
    fn test_removes_running_headers() {
        let pages = [
            "Journal of Examples 1\nFirst page body.\nPreprint",
            "Journal of Examples 2\nSecond page body.\nPreprint",
            "Journal of Examples 3\nThird page body.\nPreprint",
            "Journal of Examples 4\nFourth page body.\nPreprint",
        ];
        let raw = pages.join("\x0C");
        assert_eq!(
            clean_text(&raw),
            "First page body. Second page body. Third page body. Fourth page body."
        );
    }

    #[test]
    fn test_short_documents_keep_repeated_lines() {
        let raw = "Title\nBody one.\x0CTitle\nBody two.";
        assert_eq!(clean_text(raw), "Title Body one. Title Body two.");
    }

    #[test]
    fn test_rejoins_hyphenated_words() {
        let text = "The experi-\nment was repeated.";
        assert_eq!(clean_text(text), "The experiment was repeated.");
    }

    #[test]
    fn test_keeps_hyphen_before_capital() {
        let text = "the Hartree-\nFock method";
        assert_eq!(clean_text(text), "the Hartree- Fock method");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text(" \n\x0C\n "), "");
    }
}
