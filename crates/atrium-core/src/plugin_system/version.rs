//! Dotted version strings as they appear in plugin descriptors.
//!
//! The accepted grammar is `digits(.digits){0,2}(_digits)?`, e.g. `1`,
//! `1.2`, `1.2.3` or `1.2.3_4`. Versions are informational only: the
//! resolver matches dependencies by name and never enforces them.

use std::cmp::Ordering;

/// Number of numeric segments a version carries (three dotted plus the
/// optional underscore suffix).
const SEGMENTS: usize = 4;

/// Parses a version string into its numeric segments.
///
/// Returns `None` when the string does not match the grammar. Missing
/// segments are zero-filled so `"1"` and `"1.0.0_0"` compare equal.
fn parse_segments(version: &str) -> Option<[u64; SEGMENTS]> {
    if version.is_empty() {
        return None;
    }

    let (dotted, suffix) = match version.split_once('_') {
        Some((dotted, suffix)) => (dotted, Some(suffix)),
        None => (version, None),
    };

    let mut segments = [0u64; SEGMENTS];
    let mut count = 0;
    for part in dotted.split('.') {
        if count >= 3 {
            return None;
        }
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        segments[count] = part.parse().ok()?;
        count += 1;
    }

    if let Some(suffix) = suffix {
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        segments[3] = suffix.parse().ok()?;
    }

    Some(segments)
}

/// Returns whether `version` matches the descriptor version grammar.
pub fn is_valid(version: &str) -> bool {
    parse_segments(version).is_some()
}

/// Compares two version strings segment by segment.
///
/// Invalid input on either side yields `Ordering::Equal`; callers that
/// care about validity should check [`is_valid`] first.
pub fn compare(left: &str, right: &str) -> Ordering {
    match (parse_segments(left), parse_segments(right)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => Ordering::Equal,
    }
}
