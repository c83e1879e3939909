//! Cell text normalization and number parsing.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

pub(crate) fn sel(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Trimmed text nodes joined by single spaces.
pub(crate) fn text_of(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match of `css` under `element`, if non-empty.
pub(crate) fn select_text(element: ElementRef, css: &str) -> Option<String> {
    let selector = sel(css)?;
    element
        .select(&selector)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

/// `"Shots on Target"` -> `"shots_on_target"`
pub fn normalize_key(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.push(c);
        } else {
            pending_sep = true;
        }
    }
    key
}

/// Non-negative integer with thousands separators tolerated.
pub fn parse_count(text: &str) -> Option<u32> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<u32>().ok()
}

/// Non-negative finite decimal; `%` and separators tolerated.
pub fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '%')
        .collect();
    let value = cleaned.trim().parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Whole-number decimal as a count.
pub fn decimal_to_count(value: f64) -> Option<u32> {
    (value.fract() == 0.0 && value >= 0.0 && value <= u32::MAX as f64).then_some(value as u32)
}

/// First percentage in `text`: `"4 of 14 — 29%"` -> `29.0`
pub fn parse_pct(text: &str) -> Option<f64> {
    static PCT: OnceLock<Regex> = OnceLock::new();
    re(&PCT, r"(\d+(?:\.\d+)?)\s*%")
        .captures(text)
        .and_then(|caps| parse_decimal(&caps[1]))
}

/// `"4 of 14 — 29%"` -> `(4, 14)`
pub fn parse_of(text: &str) -> Option<(u32, u32)> {
    static OF: OnceLock<Regex> = OnceLock::new();
    let caps = re(&OF, r"(\d+)\s+of\s+(\d+)").captures(text)?;
    Some((parse_count(&caps[1])?, parse_count(&caps[2])?))
}

/// Find `pattern`'s first capture group in `text`.
pub(crate) fn capture(cell: &'static OnceLock<Regex>, pattern: &str, text: &str) -> Option<String> {
    re(cell, pattern)
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Capture groups 1 and 2.
pub(crate) fn capture2(
    cell: &'static OnceLock<Regex>,
    pattern: &str,
    text: &str,
) -> Option<(String, String)> {
    let caps = re(cell, pattern).captures(text)?;
    Some((caps.get(1)?.as_str().trim().to_string(), caps.get(2)?.as_str().trim().to_string()))
}
