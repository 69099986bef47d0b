//! Text cleanup for values that end up in CSV cells and log summaries.
use crate::util::truncate_string;
use regex::Regex;
use std::sync::OnceLock;

/// Upper bound for per-item reason strings stored in the manifest.
pub const MAX_REASON_BYTES: usize = 300;

fn pictograph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            "[\u{1F300}-\u{1F5FF}\u{1F600}-\u{1F64F}\u{1F680}-\u{1F6FF}\u{1F700}-\u{1F77F}\
             \u{1F780}-\u{1F7FF}\u{1F800}-\u{1F8FF}\u{1F900}-\u{1F9FF}\u{1FA00}-\u{1FA6F}\
             \u{1FA70}-\u{1FAFF}\u{2600}-\u{26FF}\u{2700}-\u{27BF}]+",
        )
        .expect("pictograph regex")
    })
}

/// Drop emoji and pictographs along with their joiners and variation selectors.
pub fn strip_pictographs(text: &str) -> String {
    let without_joiners: String = text
        .chars()
        .filter(|ch| !matches!(ch, '\u{200D}' | '\u{FE0F}'))
        .collect();
    pictograph_re().replace_all(&without_joiners, "").into_owned()
}

/// Normalize text so it round-trips cleanly through a CSV cell.
pub fn sanitize_for_csv(text: &str) -> String {
    strip_pictographs(text)
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{00A0}', " ")
        .replace('\u{200B}', "")
}

/// Sanitize and bound a failure reason.
pub fn bounded_reason(text: &str) -> String {
    truncate_string(sanitize_for_csv(text).trim(), MAX_REASON_BYTES)
}

/// Last non-empty line of the first non-blank stream, used as a failure hint.
pub fn last_meaningful_line(primary: &str, secondary: &str) -> Option<String> {
    [primary, secondary]
        .into_iter()
        .find(|text| !text.trim().is_empty())
        .and_then(|text| text.lines().rev().find(|line| !line.trim().is_empty()))
        .map(|line| bounded_reason(line))
}
