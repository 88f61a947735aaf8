//! Filename rules for installed attachment files
//!
//! Remote filenames may contain characters the local filesystem rejects, and
//! deep storage directories may leave too little room for long names. These
//! helpers produce the name a file is actually written under.

use std::path::Path;

/// Characters never allowed in a stored filename
const FORBIDDEN: &[char] = &['/', '\\', '?', '*', ':', '|', '"', '<', '>'];

/// Replacement for a name that filters down to nothing
const EMPTY_NAME_REPLACEMENT: &str = "_";

/// Makes a single path component safe to write to disk
///
/// - strips `/ \ ? * : | " < >`
/// - collapses runs of CR, LF and tab into one space
/// - turns typographic spaces (U+2000 to U+200A) into plain spaces
/// - drops zero-width and directional marks (U+200B to U+200E)
/// - drops remaining control characters
/// - drops a leading dot so files are never hidden
///
/// A result of `""`, `"."` or `".."` becomes `"_"`.
pub fn valid_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_break = false;

    for c in name.chars() {
        if matches!(c, '\r' | '\n' | '\t') {
            if !in_break {
                out.push(' ');
                in_break = true;
            }
            continue;
        }
        in_break = false;

        match c {
            c if FORBIDDEN.contains(&c) => {}
            '\u{2000}'..='\u{200A}' => out.push(' '),
            '\u{200B}'..='\u{200E}' => {}
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    let trimmed = out.strip_prefix('.').unwrap_or(&out);
    match trimmed {
        "" | "." | ".." => EMPTY_NAME_REPLACEMENT.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Splits `name` into stem and extension (including the dot)
///
/// Extensions longer than 10 bytes are treated as part of the stem.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && name.len() - idx <= 10 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Largest prefix of `s` that is at most `max` bytes and ends on a char boundary
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Shortens `name` so that `dir/name` fits the given limits
///
/// The extension is kept where possible and the stem is truncated. Returns
/// the name unchanged if it already fits. Lengths are measured in bytes.
pub fn shortened_name(dir: &Path, name: &str, max_path_length: usize, max_name_length: usize) -> String {
    let dir_len = dir.as_os_str().len() + 1;
    let budget = max_name_length.min(max_path_length.saturating_sub(dir_len));

    if name.len() <= budget {
        return name.to_string();
    }

    let (stem, ext) = split_extension(name);
    if ext.len() < budget {
        let stem = truncate_bytes(stem, budget - ext.len());
        if !stem.is_empty() {
            return format!("{stem}{ext}");
        }
    }
    truncate_bytes(name, budget).to_string()
}
