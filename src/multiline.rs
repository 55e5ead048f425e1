use crate::parser;

pub const MAX_RECORD_BYTES: usize = 1 << 20;

fn starts_record(line: &str) -> bool {
    line.contains("MsgID=\"")
}

/// Joins physical lines into logical records.
///
/// A record continues onto the next physical line only while a quoted value
/// is still open, which is how a multi-line `Message` appears in a file.
/// Lines are joined with `\n`. An open record is abandoned when a new record
/// starts or when it grows past [`MAX_RECORD_BYTES`]; such a fragment could
/// never parse.
#[derive(Default)]
pub struct RecordAggregator {
    buf: String,
}

impl RecordAggregator {
    pub fn push(&mut self, line: &str) -> Option<String> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if !self.buf.is_empty() && (starts_record(line) || self.buf.len() > MAX_RECORD_BYTES) {
            tracing::debug!(bytes = self.buf.len(), "dropping unterminated record");
            self.buf.clear();
        }
        if !self.buf.is_empty() {
            self.buf.push('\n');
        }
        self.buf.push_str(line);
        if parser::has_open_quote(&self.buf) {
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }

    /// Flush whatever is buffered, including an unterminated record.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() { None } else { Some(std::mem::take(&mut self.buf)) }
    }
}

/// Aggregate and parse a whole input, dropping lines that are not records.
pub fn parse_records<I, S>(lines: I) -> Vec<parser::LogRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut agg = RecordAggregator::default();
    let mut out = Vec::new();
    for line in lines {
        if let Some(rec) = agg.push(line.as_ref()).and_then(|l| parser::parse_line(&l)) {
            out.push(rec);
        }
    }
    if let Some(rec) = agg.finish().and_then(|l| parser::parse_line(&l)) {
        out.push(rec);
    }
    out
}
