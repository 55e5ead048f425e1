use crate::masking;
use crate::parser::LogRecord;

/// Bumped whenever the field order, delimiter or normalization rules change;
/// stored documents built with another version are not comparable.
pub const SIGNATURE_VERSION: u32 = 1;

pub const FIELD_DELIMITER: &str = ", ";

/// `"{channel}, {log_type}, {severity}, {normalized message}"`
pub fn build_signature_text(record: &LogRecord) -> String {
    build_signature_text_with_limit(record, masking::DEFAULT_MAX_MESSAGE_CHARS)
}

pub fn build_signature_text_with_limit(record: &LogRecord, max_message_chars: usize) -> String {
    let normalized = masking::normalize_with_limit(&record.message, max_message_chars);
    [
        record.channel.as_str(),
        record.log_type.as_str(),
        record.severity.as_str(),
        normalized.as_str(),
    ]
    .join(FIELD_DELIMITER)
}
