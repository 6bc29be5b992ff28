//! Log accumulation for a single run unit
//!
//! Job output arrives as lines or as streamed chunks. Both go through the
//! same join rule so the accumulated text never gains a blank line or loses
//! a line break at a chunk boundary.

/// Appends `addition` to `existing` and returns the joined text.
///
/// Empty or all-whitespace additions are ignored. A single `\n` separator is
/// inserted only when `existing` is non-empty, does not already end with a
/// newline and `addition` does not start with one.
pub fn append(existing: &str, addition: &str) -> String {
    let mut logs = existing.to_string();
    append_in_place(&mut logs, addition);
    logs
}

/// In-place variant of [`append`]
pub fn append_in_place(logs: &mut String, addition: &str) {
    if addition.trim().is_empty() {
        return;
    }

    if needs_separator(logs, addition) {
        logs.push('\n');
    }
    logs.push_str(addition);
}

fn needs_separator(existing: &str, addition: &str) -> bool {
    !existing.is_empty() && !existing.ends_with('\n') && !addition.starts_with('\n')
}
