use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 200;

pub const TOKEN_GUID: &str = "GUID";
pub const TOKEN_IP: &str = "IP";
pub const TOKEN_EMAIL: &str = "EMAIL";
pub const TOKEN_FILEPATH: &str = "FILEPATH";
pub const TOKEN_URL: &str = "URL";
pub const TOKEN_PHONE: &str = "PHONE";
pub const TOKEN_DATE: &str = "DATE";
pub const TOKEN_TIME: &str = "TIME";

// Bare or braced registry-style GUIDs.
static RE_GUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\}|\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b").unwrap()
});

static RE_IPV6: Lazy<Regex> = Lazy::new(|| {
    // Full form only
    Regex::new(r"\b(?:[0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}\b").unwrap()
});

static RE_IPV4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b").unwrap()
});

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static RE_FILEPATH: Lazy<Regex> = Lazy::new(|| {
    // Group 1 is the boundary that precedes the path and is kept. Requiring it
    // keeps `scheme://host/...` intact for the URL rule.
    Regex::new(r#"(?x)
        (^|[\s=,;(\[{'"])
        (?:
            [A-Za-z]:\\[^\s"'<>|]*
          | \\\\[\w.\-$]+(?:\\[^\s"'<>|\\]+)+\\?
          | (?:~|\.{1,2})?/[\w.\-]+(?:/[\w.\-]+)*/?
        )
    "#).unwrap()
});

static RE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b[a-zA-Z][a-zA-Z0-9+.-]*://[^\s"']+\b"#).unwrap()
});

static RE_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-])\d{3}[\s.-]\d{4}\b").unwrap()
});

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    // An ISO `T` separator is only consumed when a digit follows; the digit is
    // captured and re-emitted so the time part stays detectable.
    Regex::new(r"\b(?:\d{4}-\d{2}-\d{2}|\d{4}/\d{2}/\d{2}|\d{1,2}/\d{1,2}/\d{4}|\d{1,2}\.\d{1,2}\.\d{4})(?:T(\d)|\b)").unwrap()
});

static RE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\d:.])\d{1,2}:\d{2}(?::\d{2}(?:[.,]\d{1,9})?)?(?:\s?[AaPp][Mm]\b)?(?:Z|[+-]\d{2}:?\d{2})?\b").unwrap()
});

// Passes are repeated until stable so that output never depends on how many
// times it was normalized; in practice the second pass is already a no-op.
const MAX_PASSES: usize = 4;

/// Normalize a message to its signature form using the default length bound.
pub fn normalize(message: &str) -> String {
    normalize_with_limit(message, DEFAULT_MAX_MESSAGE_CHARS)
}

/// Truncate to `max_chars` characters, then replace volatile substrings with
/// placeholder tokens in the order
/// GUID, IP, EMAIL, FILEPATH, URL, PHONE, DATE, TIME.
pub fn normalize_with_limit(message: &str, max_chars: usize) -> String {
    let mut current = truncate_chars(message, max_chars).to_string();
    for _ in 0..MAX_PASSES {
        let next = mask_volatile(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// One ordered substitution pass, no truncation.
pub fn mask_volatile(input: &str) -> String {
    let s = RE_GUID.replace_all(input, TOKEN_GUID);
    let s = RE_IPV6.replace_all(&s, TOKEN_IP);
    let s = RE_IPV4.replace_all(&s, TOKEN_IP);
    let s = RE_EMAIL.replace_all(&s, TOKEN_EMAIL);
    let s = RE_FILEPATH.replace_all(&s, mask_path);
    let s = RE_URL.replace_all(&s, TOKEN_URL);
    let s = RE_PHONE.replace_all(&s, TOKEN_PHONE);
    let s = RE_DATE.replace_all(&s, |caps: &Captures| match caps.get(1) {
        Some(digit) => format!("{TOKEN_DATE} {}", digit.as_str()),
        None => TOKEN_DATE.to_string(),
    });
    let s = RE_TIME.replace_all(&s, |caps: &Captures| format!("{}{}", &caps[1], TOKEN_TIME));
    s.into_owned()
}

// Paths shorter than the token stay as they are so that no pass lengthens the
// text; a normalized message then never needs truncating again.
fn mask_path(caps: &Captures) -> String {
    let whole = &caps[0];
    let path = &whole[caps[1].len()..];
    if path.chars().count() < TOKEN_FILEPATH.len() {
        whole.to_string()
    } else {
        format!("{}{}", &caps[1], TOKEN_FILEPATH)
    }
}

/// Prefix of at most `max_chars` Unicode scalar values.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("°C°C", 3), "°C°");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn iso_timestamp_becomes_date_and_time() {
        assert_eq!(mask_volatile("at 2024-06-01T10:30:15Z done"), "at DATE TIME done");
        assert_eq!(mask_volatile("at 2024-06-01 10:30:15 done"), "at DATE TIME done");
    }

    #[test]
    fn date_followed_by_word_is_left_alone() {
        assert_eq!(mask_volatile("2024-06-01Test run"), "2024-06-01Test run");
    }

    #[test]
    fn short_paths_are_not_lengthened() {
        assert_eq!(mask_volatile("rate 3 /s"), "rate 3 /s");
        assert_eq!(mask_volatile("in /tmp/run.log"), "in FILEPATH");
    }
}
