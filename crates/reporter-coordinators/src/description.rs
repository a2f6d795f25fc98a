//! Issue summary and description text.

use crate::UniqueCrashFound;
use regex::Regex;
use std::sync::OnceLock;

/// Longest summary the tracker accepts, in characters.
pub const SUMMARY_MAX_CHARS: usize = 255;

fn duplicates_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\*Duplicates\*: [0-9]+").expect("duplicates pattern is valid"))
}

/// Issue summary: the crash info cut to [`SUMMARY_MAX_CHARS`] characters.
pub fn summary(crash_info: &str) -> String {
    crash_info.chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Issue description for a newly found crash, with the duplicate counter at 0.
pub fn render_description(crash: &UniqueCrashFound) -> String {
    format!(
        "*Crash info*: {}\n\
         *Crash link*: {}\n\
         *Project name*: {}\n\
         *Fuzzer name*: {}\n\
         *Revision*: {}\n\
         *Duplicates*: 0\n\
         *Full output*: ```{}```",
        crash.crash_info,
        crash.crash_url,
        crash.project_name,
        crash.fuzzer_name,
        crash.revision_name,
        crash.crash_output,
    )
}

/// Set every duplicate counter in `description` to `count`.
///
/// Text without a counter comes back unchanged.
pub fn rewrite_duplicates(description: &str, count: u64) -> String {
    let replacement = format!("*Duplicates*: {count}");
    duplicates_marker()
        .replace_all(description, regex::NoExpand(&replacement))
        .into_owned()
}
