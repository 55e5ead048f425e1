//! Tagged-attribute line parser.
//!
//! Instrument logs carry one record per line in the form
//!
//! ```text
//! MsgID="…" TimeStamp="…" Channel="…" Type="…" Severity="…" Message="…"
//! ```
//!
//! The attribute run may be preceded by an arbitrary prefix (a wrapper
//! timestamp, a file name, …). `Message` is allowed to span several physical
//! lines. A backslash-escaped quote (`\"`) does not terminate a value and is
//! kept verbatim in it; no other escape is interpreted.

use serde::Serialize;

pub const KEY_MSG_ID: &str = "MsgID";
pub const KEY_TIMESTAMP: &str = "TimeStamp";
pub const KEY_CHANNEL: &str = "Channel";
pub const KEY_TYPE: &str = "Type";
pub const KEY_SEVERITY: &str = "Severity";
pub const KEY_MESSAGE: &str = "Message";

const REQUIRED_KEYS: [&str; 6] = [
    KEY_MSG_ID,
    KEY_TIMESTAMP,
    KEY_CHANNEL,
    KEY_TYPE,
    KEY_SEVERITY,
    KEY_MESSAGE,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub message_id: String,
    /// Source format, never reparsed.
    pub timestamp: String,
    pub channel: String,
    pub log_type: String,
    pub severity: String,
    pub message: String,
    pub raw_text: String,
}

/// A single `Key="Value"` pair as it appears in the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Parse one logical line. Returns `None` unless all six attributes are present.
pub fn parse_line(line: &str) -> Option<LogRecord> {
    let mut search_from = 0;
    while let Some(offset) = line[search_from..].find(KEY_MSG_ID) {
        let start = search_from + offset;
        if is_key_boundary(line, start) {
            if let Some(record) = parse_from(line, start) {
                return Some(record);
            }
        }
        search_from = start + KEY_MSG_ID.len();
    }
    None
}

fn is_key_boundary(line: &str, start: usize) -> bool {
    line[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
}

fn parse_from(line: &str, start: usize) -> Option<LogRecord> {
    let mut fields: [Option<&str>; 6] = [None; 6];
    for attr in Attributes::new(&line[start..]) {
        let attr = attr.ok()?;
        if let Some(slot) = REQUIRED_KEYS.iter().position(|k| *k == attr.key) {
            if attr.key != KEY_MESSAGE && attr.value.contains('\n') {
                return None;
            }
            if fields[slot].is_none() {
                fields[slot] = Some(attr.value);
            }
        }
        if fields.iter().all(Option::is_some) {
            break;
        }
    }

    let [msg_id, ts, channel, log_type, severity, message] = fields;
    Some(LogRecord {
        message_id: msg_id?.to_string(),
        timestamp: ts?.to_string(),
        channel: channel?.to_string(),
        log_type: log_type?.to_string(),
        severity: severity?.to_string(),
        message: message?.to_string(),
        raw_text: line.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Something other than `Key="` where an attribute was expected.
    NotAnAttribute,
    /// Input ended before the closing quote.
    Unterminated,
}

/// Iterator over consecutive `Key="Value"` pairs.
///
/// Stops at end of input or at the first token that is not an attribute.
/// An unterminated value yields `Err(TokenError::Unterminated)` once.
pub struct Attributes<'a> {
    input: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> Attributes<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0, done: false }
    }

    fn next_attr(&mut self) -> Option<Result<Attribute<'a>, TokenError>> {
        let input = self.input;
        let bytes = input.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return None;
        }

        let key_start = self.pos;
        while self.pos < bytes.len() && (bytes[self.pos].is_ascii_alphanumeric() || bytes[self.pos] == b'_') {
            self.pos += 1;
        }
        let key_end = self.pos;
        if key_end == key_start || !input[self.pos..].starts_with("=\"") {
            return Some(Err(TokenError::NotAnAttribute));
        }
        self.pos += 2;

        let value_start = self.pos;
        let mut escaped = false;
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\\' if !escaped => escaped = true,
                b'"' if !escaped => {
                    let value = &input[value_start..self.pos];
                    self.pos += 1;
                    return Some(Ok(Attribute { key: &input[key_start..key_end], value }));
                }
                _ => escaped = false,
            }
            self.pos += 1;
        }
        Some(Err(TokenError::Unterminated))
    }
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Result<Attribute<'a>, TokenError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_attr() {
            Some(Err(TokenError::NotAnAttribute)) | None => {
                self.done = true;
                None
            }
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            ok => ok,
        }
    }
}

/// True when `text` ends inside a quoted value, i.e. more physical lines are
/// needed to complete the record.
pub fn has_open_quote(text: &str) -> bool {
    let mut open = false;
    let mut escaped = false;
    for b in text.bytes() {
        match b {
            b'\\' if !escaped => escaped = true,
            b'"' if !escaped => open = !open,
            _ => escaped = false,
        }
    }
    open
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_reads_pairs_until_non_attribute() {
        let attrs: Vec<_> = Attributes::new(r#"A="1" B="two words" trailing text"#)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(attrs, vec![
            Attribute { key: "A", value: "1" },
            Attribute { key: "B", value: "two words" },
        ]);
    }

    #[test]
    fn tokenizer_reports_unterminated_value() {
        let mut it = Attributes::new(r#"A="1" B="open"#);
        assert!(matches!(it.next(), Some(Ok(_))));
        assert_eq!(it.next(), Some(Err(TokenError::Unterminated)));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn tokenizer_keeps_escaped_quote() {
        let attr = Attributes::new(r#"M="say \"hi\"""#).next().unwrap().unwrap();
        assert_eq!(attr.value, r#"say \"hi\""#);
    }

    #[test]
    fn key_boundary_rejects_embedded_key() {
        assert!(!is_key_boundary("XMsgID", 1));
        assert!(is_key_boundary(" MsgID", 1));
        assert!(is_key_boundary("MsgID", 0));
    }

    #[test]
    fn open_quote_tracking() {
        assert!(has_open_quote(r#"MsgID="1" Message="first line"#));
        assert!(!has_open_quote(r#"MsgID="1" Message="done""#));
        assert!(has_open_quote(r#"Message="a \" b"#));
    }
}
