//! A tolerant, line-oriented streaming parser for the text format (spec
//! §4.7). Yields a sequence of events instead of mutating a shared `info`
//! struct: malformed lines produce an [`Event::Error`] and are skipped;
//! a missing header or mismatched architecture tag is a structural error
//! reported directly by [`parse`].

use crate::engine::Arch;
use crate::persist::quoting::{parse_qpath, unescape};
use crate::value::ValueType;
use crate::StatusCode;

pub(crate) const HEADER_LINE: &str = "WINE REGISTRY Version 2";

/// One parsed unit of the file.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `[qpath]` optionally followed by a decimal-seconds modification time.
    Section { path: Vec<String>, epoch_seconds: Option<i64> },
    /// `#time=` applying to the most recently opened section.
    Time(u64),
    /// `#class="..."` applying to the most recently opened section.
    Class(String),
    /// `#link` applying to the most recently opened section.
    Link,
    /// A value line; `name` is `None` for the `@` default value.
    Value { name: Option<String>, value_type: ValueType, data: Vec<u8> },
    /// A malformed line that was skipped.
    Error { line: usize, message: String },
}

/// Parses the whole file, returning its declared architecture and the
/// event stream. Fails the whole load only on a missing header or a
/// structurally unreadable architecture tag (spec §4.7, §7
/// `NOT_REGISTRY_FILE`); individual bad lines are reported as
/// [`Event::Error`] and skipped.
pub fn parse(text: &str) -> Result<(Arch, Vec<Event>), StatusCode> {
    let mut lines = join_continuations(text).into_iter();

    let header = lines.next().ok_or(StatusCode::NotRegistryFile)?;
    if header.line.trim_end() != HEADER_LINE {
        return Err(StatusCode::NotRegistryFile);
    }

    let mut arch = None;
    let mut events = Vec::new();

    for joined in lines {
        let line = joined.line.trim_end_matches(['\n', '\r']);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("#arch=") {
            match rest {
                "win32" => arch = Some(Arch::Win32),
                "win64" => arch = Some(Arch::Win64),
                _ => return Err(StatusCode::NotRegistryFile),
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('[') {
            match parse_section(rest) {
                Some(event) => events.push(event),
                None => events.push(Event::Error { line: joined.number, message: format!("malformed section header: {trimmed}") }),
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("#time=") {
            match u64::from_str_radix(rest.trim(), 16) {
                Ok(ticks) => events.push(Event::Time(ticks)),
                Err(_) => events.push(Event::Error { line: joined.number, message: format!("malformed #time: {rest}") }),
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("#class=") {
            match parse_quoted(rest.trim()) {
                Some(class) => events.push(Event::Class(class)),
                None => events.push(Event::Error { line: joined.number, message: "malformed #class".into() }),
            }
            continue;
        }
        if trimmed == "#link" {
            events.push(Event::Link);
            continue;
        }
        match parse_value_line(trimmed) {
            Some(event) => events.push(event),
            None => events.push(Event::Error { line: joined.number, message: format!("malformed value line: {trimmed}") }),
        }
    }

    Ok((arch.unwrap_or(Arch::Win64), events))
}

fn parse_section(rest: &str) -> Option<Event> {
    let close = rest.find(']')?;
    let (inner, after) = (&rest[..close], rest[close + 1..].trim());
    let segments = parse_qpath(inner)?;
    let epoch_seconds = if after.is_empty() { None } else { after.parse::<i64>().ok() };
    Some(Event::Section { path: segments, epoch_seconds })
}

fn parse_quoted(s: &str) -> Option<String> {
    let s = s.strip_prefix('"')?;
    let s = s.strip_suffix('"')?;
    unescape(s)
}

fn parse_value_line(line: &str) -> Option<Event> {
    let eq = find_top_level_eq(line)?;
    let (name_part, value_part) = (line[..eq].trim(), line[eq + 1..].trim());

    let name = if name_part == "@" {
        None
    } else {
        Some(parse_quoted(name_part)?)
    };

    let event_value = parse_typed_value(value_part)?;
    Some(Event::Value { name, value_type: event_value.0, data: event_value.1 })
}

/// Finds the `=` that separates name from value, ignoring any `=` that
/// appears inside the quoted name.
fn find_top_level_eq(line: &str) -> Option<usize> {
    if line.starts_with('"') {
        let mut chars = line.char_indices().skip(1);
        let mut escaped = false;
        for (i, c) in &mut chars {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => {
                    let rest = &line[i + 1..];
                    return rest.find('=').map(|p| i + 1 + p);
                }
                _ => {}
            }
        }
        None
    } else {
        line.find('=')
    }
}

fn parse_typed_value(value: &str) -> Option<(ValueType, Vec<u8>)> {
    if let Some(rest) = value.strip_prefix('"') {
        let s = parse_quoted_body(rest)?;
        return Some((ValueType::Sz, sz_bytes(&s)));
    }
    if let Some(rest) = value.strip_prefix("str(") {
        let close = rest.find(')')?;
        let code = u32::from_str_radix(&rest[..close], 16).ok()?;
        let value_type = ValueType::from_code(code)?;
        let quoted = rest[close + 1..].trim();
        let quoted = quoted.strip_prefix(':')?.trim();
        let s = parse_quoted(quoted)?;
        return Some((value_type, sz_bytes(&s)));
    }
    if let Some(rest) = value.strip_prefix("dword:") {
        let n = u32::from_str_radix(rest.trim(), 16).ok()?;
        return Some((ValueType::Dword, n.to_le_bytes().to_vec()));
    }
    if let Some(rest) = value.strip_prefix("hex(") {
        let close = rest.find(')')?;
        let code = u32::from_str_radix(&rest[..close], 16).ok()?;
        let value_type = ValueType::from_code(code)?;
        let bytes = rest[close + 1..].trim().strip_prefix(':')?.trim();
        return Some((value_type, parse_hex_bytes(bytes)?));
    }
    if let Some(rest) = value.strip_prefix("hex:") {
        return Some((ValueType::Binary, parse_hex_bytes(rest.trim())?));
    }
    None
}

fn parse_quoted_body(rest: &str) -> Option<String> {
    let end = rest.rfind('"')?;
    unescape(&rest[..end])
}

fn sz_bytes(s: &str) -> Vec<u8> {
    let mut data = s.as_bytes().to_vec();
    data.push(0);
    data
}

fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() {
        return Some(Vec::new());
    }
    s.split(',').map(|b| u8::from_str_radix(b.trim(), 16).ok()).collect()
}

struct Joined {
    number: usize,
    line: String,
}

/// Joins `"\\\n  "`-continued hex lines into a single logical line, so the
/// rest of the parser can treat the file as simple lines (spec §4.7
/// `hexbytes` line continuation).
fn join_continuations(text: &str) -> Vec<Joined> {
    let mut out = Vec::new();
    let mut pending: Option<Joined> = None;
    for (i, raw) in text.lines().enumerate() {
        let continues = raw.ends_with('\\');
        let body = raw.strip_suffix('\\').unwrap_or(raw);
        match &mut pending {
            Some(joined) => {
                joined.line.push_str(body.trim_start());
            }
            None => {
                pending = Some(Joined { number: i + 1, line: body.to_string() });
            }
        }
        if !continues {
            out.push(pending.take().unwrap());
        }
    }
    if let Some(joined) = pending {
        out.push(joined);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_is_not_a_registry_file() {
        assert_eq!(parse("not a header\n").unwrap_err(), StatusCode::NotRegistryFile);
    }

    #[test]
    fn parses_section_and_values() {
        let text = "WINE REGISTRY Version 2\n#arch=win64\n[Machine\\SOFTWARE\\Acme] 1700000000\n#time=1b000000000000\n\"Name\"=\"Widget\"\n\"Count\"=dword:0000002a\n\"Blob\"=hex:01,02,03\n";
        let (arch, events) = parse(text).unwrap();
        assert_eq!(arch, Arch::Win64);
        assert!(events.iter().any(|e| matches!(e, Event::Section { path, .. } if path == &vec!["Machine".to_string(), "SOFTWARE".to_string(), "Acme".to_string()])));
        assert!(events.iter().any(|e| matches!(e, Event::Value { name: Some(n), value_type: ValueType::Sz, .. } if n == "Name")));
        assert!(events.iter().any(|e| matches!(e, Event::Value { value_type: ValueType::Dword, data, .. } if data == &0x2au32.to_le_bytes().to_vec())));
    }

    #[test]
    fn default_value_uses_at_sign() {
        let text = "WINE REGISTRY Version 2\n[A]\n@=\"x\"\n";
        let (_, events) = parse(text).unwrap();
        assert!(events.iter().any(|e| matches!(e, Event::Value { name: None, .. })));
    }

    #[test]
    fn bad_line_is_reported_and_skipped() {
        let text = "WINE REGISTRY Version 2\n[A]\nnot a value line at all\n\"Ok\"=\"fine\"\n";
        let (_, events) = parse(text).unwrap();
        assert!(events.iter().any(|e| matches!(e, Event::Error { .. })));
        assert!(events.iter().any(|e| matches!(e, Event::Value { name: Some(n), .. } if n == "Ok")));
    }

    #[test]
    fn hex_line_continuation_joins() {
        let text = "WINE REGISTRY Version 2\n[A]\n\"Blob\"=hex:01,02,\\\n  03,04\n";
        let (_, events) = parse(text).unwrap();
        assert!(events.iter().any(|e| matches!(e, Event::Value { data, .. } if data == &vec![1,2,3,4])));
    }
}
