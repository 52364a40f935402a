//! Path tokenization and case-insensitive name comparison.

/// Maximum length, in characters, of a single path segment (spec §4.1).
pub const MAX_SEGMENT_LEN: usize = 256;

/// Maximum length, in characters, of a fully-qualified path accepted by `open` (spec §4.4).
pub const MAX_OPEN_PATH_LEN: usize = 65533;

/// Maximum length, in characters, of a value name (spec §4.5).
pub const MAX_VALUE_NAME_LEN: usize = 16383;

/// Compares two names the way the tree orders children and values: a
/// case-insensitive, length-tie-broken ordering over the shorter common
/// prefix.
///
/// This is the ordering used for binary search over `children` and
/// `values`; it is not a full Unicode case fold, only ASCII-style
/// case-insensitivity, matching the source registry's behavior.
pub fn name_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    let mut ai = a.chars().flat_map(char::to_lowercase);
    let mut bi = b.chars().flat_map(char::to_lowercase);
    loop {
        match (ai.next(), bi.next()) {
            (Some(x), Some(y)) => match x.cmp(&y) {
                std::cmp::Ordering::Equal => continue,
                other => return other,
            },
            (Some(_), None) => return std::cmp::Ordering::Greater,
            (None, Some(_)) => return std::cmp::Ordering::Less,
            (None, None) => return std::cmp::Ordering::Equal,
        }
    }
}

/// Returns whether two names are equal under [`name_cmp`].
pub fn name_eq(a: &str, b: &str) -> bool {
    name_cmp(a, b) == std::cmp::Ordering::Equal
}

/// A path broken into its backslash-separated segments.
///
/// Runs of consecutive backslashes between segments collapse to a single
/// separator; a leading backslash is rejected by the caller (spec §4.1),
/// not by the tokenizer itself, since some callers (recursive create)
/// need to distinguish "empty path" from "invalid path".
pub struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Segments<'a> {
    pub fn new(path: &'a str) -> Self {
        Self { rest: path }
    }

    /// `true` if the original path started with a backslash.
    pub fn has_leading_backslash(path: &str) -> bool {
        path.starts_with('\\')
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.rest = self.rest.trim_start_matches('\\');
        if self.rest.is_empty() {
            return None;
        }
        let end = self.rest.find('\\').unwrap_or(self.rest.len());
        let (seg, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(seg)
    }
}
