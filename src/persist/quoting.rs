//! Quoted-string escaping shared by the text format's parser and writer
//! (spec §4.7 `qstring`).

/// Escapes `s` the way the writer emits quoted strings: backslash, quote,
/// and control characters get C-style escapes; anything outside printable
/// ASCII falls back to `\xHHHH` per UTF-16 code unit.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (0x20..0x7f).contains(&(c as u32)) => out.push(c),
            c => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\x{:04x}", unit));
                }
            }
        }
    }
    out
}

/// Parses the inside of a quoted string (without the surrounding quotes),
/// decoding the escape set `escape` produces.
pub fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut pending_high_surrogate: Option<u16> = None;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            flush_surrogate(&mut out, &mut pending_high_surrogate);
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => {
                flush_surrogate(&mut out, &mut pending_high_surrogate);
                out.push('\\');
            }
            '"' => {
                flush_surrogate(&mut out, &mut pending_high_surrogate);
                out.push('"');
            }
            'n' => {
                flush_surrogate(&mut out, &mut pending_high_surrogate);
                out.push('\n');
            }
            'r' => {
                flush_surrogate(&mut out, &mut pending_high_surrogate);
                out.push('\r');
            }
            't' => {
                flush_surrogate(&mut out, &mut pending_high_surrogate);
                out.push('\t');
            }
            'x' => {
                let hex: String = (0..4).map(|_| chars.next()).collect::<Option<String>>()?;
                let unit = u16::from_str_radix(&hex, 16).ok()?;
                if let Some(high) = pending_high_surrogate.take() {
                    let combined = 0x10000
                        + ((high as u32 - 0xd800) << 10)
                        + (unit as u32 - 0xdc00);
                    out.push(char::from_u32(combined)?);
                } else if (0xd800..0xdc00).contains(&unit) {
                    pending_high_surrogate = Some(unit);
                } else {
                    out.push(char::from_u32(unit as u32)?);
                }
            }
            _ => return None,
        }
    }
    flush_surrogate(&mut out, &mut pending_high_surrogate);
    Some(out)
}

fn flush_surrogate(out: &mut String, pending: &mut Option<u16>) {
    if let Some(unit) = pending.take() {
        out.push(char::from_u32(unit as u32).unwrap_or('\u{fffd}'));
    }
}

/// Joins path segments into a `qpath` (spec §4.7): each segment escaped
/// individually, separated by a raw, unescaped backslash.
pub fn join_qpath(segments: &[String]) -> String {
    segments.iter().map(|s| escape(s)).collect::<Vec<_>>().join("\\")
}

/// Splits a `qpath` back into its segments.
///
/// Unlike [`unescape`], a bare backslash not starting a recognized escape
/// is the path separator rather than a parse error, since `qpath` packs
/// several escaped segments behind raw separators (spec §4.7 `qpath`).
pub fn parse_qpath(inner: &str) -> Option<Vec<String>> {
    let chars: Vec<char> = inner.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '\\' {
            current.push(chars[i]);
            i += 1;
            continue;
        }
        if i + 1 >= chars.len() {
            return None;
        }
        match chars[i + 1] {
            '\\' => {
                current.push('\\');
                i += 2;
            }
            '"' => {
                current.push('"');
                i += 2;
            }
            'n' => {
                current.push('\n');
                i += 2;
            }
            'r' => {
                current.push('\r');
                i += 2;
            }
            't' => {
                current.push('\t');
                i += 2;
            }
            'x' => {
                if i + 6 > chars.len() {
                    return None;
                }
                let hex: String = chars[i + 2..i + 6].iter().collect();
                let unit = u16::from_str_radix(&hex, 16).ok()?;
                current.push(char::from_u32(unit as u32)?);
                i += 6;
            }
            _ => {
                segments.push(std::mem::take(&mut current));
                i += 1;
            }
        }
    }
    segments.push(current);
    Some(segments)
}

#[cfg(test)]
mod qpath_tests {
    use super::*;

    #[test]
    fn splits_plain_segments() {
        assert_eq!(
            parse_qpath("Machine\\SOFTWARE\\Acme").unwrap(),
            vec!["Machine".to_string(), "SOFTWARE".to_string(), "Acme".to_string()]
        );
    }

    #[test]
    fn roundtrips_segment_containing_literal_backslash() {
        let segments = vec!["A".to_string(), "weird\\name".to_string(), "B".to_string()];
        let joined = join_qpath(&segments);
        assert_eq!(parse_qpath(&joined).unwrap(), segments);
    }
}
