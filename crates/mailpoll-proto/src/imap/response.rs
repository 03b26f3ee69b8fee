//! Minimal IMAP response parsing.
//!
//! Only the responses the polling session relies on are understood:
//! status lines, CAPABILITY, SEARCH, EXISTS and the `BODY[]` item of FETCH.
//! Everything else is skipped.

use bytes::Bytes;

/// Status of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed.
    No,
    /// Command was malformed.
    Bad,
    /// Server is closing the connection.
    Bye,
    /// Connection is already authenticated.
    PreAuth,
}

impl Status {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "BYE" => Some(Self::Bye),
            "PREAUTH" => Some(Self::PreAuth),
            _ => None,
        }
    }
}

/// Splits `line` (CRLF removed) into tag, status and the remaining text.
fn split_status(line: &[u8]) -> Option<(&str, Status, &str)> {
    let line = std::str::from_utf8(line).ok()?.trim_end_matches("\r\n");
    let (tag, rest) = line.split_once(' ')?;
    let (word, text) = rest.split_once(' ').unwrap_or((rest, ""));
    Some((tag, Status::parse(word)?, text))
}

/// Parses a tagged status response for `tag`.
#[must_use]
pub fn parse_tagged<'a>(line: &'a [u8], tag: &str) -> Option<(Status, &'a str)> {
    split_status(line)
        .filter(|(t, _, _)| *t == tag)
        .map(|(_, status, text)| (status, text))
}

/// Parses an untagged status response such as the greeting or `* BYE`.
#[must_use]
pub fn parse_untagged_status(line: &[u8]) -> Option<(Status, &str)> {
    split_status(line)
        .filter(|(t, _, _)| *t == "*")
        .map(|(_, status, text)| (status, text))
}

/// Extracts capabilities from `* CAPABILITY ...` or a `[CAPABILITY ...]` code.
#[must_use]
pub fn parse_capabilities(line: &[u8]) -> Option<Vec<String>> {
    let text = std::str::from_utf8(line).ok()?.trim_end_matches("\r\n");
    let upper = text.to_ascii_uppercase();

    let list = if let Some(rest) = upper.strip_prefix("* CAPABILITY ") {
        rest
    } else {
        let start = upper.find("[CAPABILITY ")? + "[CAPABILITY ".len();
        let end = upper[start..].find(']')? + start;
        &upper[start..end]
    };

    Some(list.split_whitespace().map(str::to_string).collect())
}

/// Parses the numbers of a `* SEARCH` response, keeping server order.
#[must_use]
pub fn parse_search(line: &[u8]) -> Option<Vec<u32>> {
    let text = std::str::from_utf8(line).ok()?.trim_end_matches("\r\n");
    let mut words = text.split_whitespace();
    if words.next()? != "*" || !words.next()?.eq_ignore_ascii_case("SEARCH") {
        return None;
    }
    Some(words.filter_map(|w| w.parse().ok()).collect())
}

/// Parses `* n EXISTS`.
#[must_use]
pub fn parse_exists(line: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(line).ok()?.trim_end_matches("\r\n");
    let mut words = text.split_whitespace();
    if words.next()? != "*" {
        return None;
    }
    let count = words.next()?.parse().ok()?;
    words
        .next()
        .filter(|w| w.eq_ignore_ascii_case("EXISTS"))
        .map(|_| count)
}

/// Returns true if a status line carries the `[READ-ONLY]` response code.
#[must_use]
pub fn has_read_only_code(line: &[u8]) -> bool {
    String::from_utf8_lossy(line)
        .to_ascii_uppercase()
        .contains("[READ-ONLY]")
}

/// Extracts the `BODY[]` payload from a FETCH response.
///
/// The payload may be a literal, a quoted string or `NIL`.
#[must_use]
pub fn extract_body(response: &[u8]) -> Option<Bytes> {
    const MARKER: &[u8] = b"BODY[] ";

    let start = response
        .windows(MARKER.len())
        .position(|w| w.eq_ignore_ascii_case(MARKER))?
        + MARKER.len();
    let rest = &response[start..];

    match rest.first().copied()? {
        b'{' => {
            let close = rest.iter().position(|&b| b == b'}')?;
            let digits = rest[1..close].strip_suffix(b"+").unwrap_or(&rest[1..close]);
            let len: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
            let data_start = close + 1 + 2; // "}\r\n"
            rest.get(data_start..data_start + len)
                .map(Bytes::copy_from_slice)
        }
        b'"' => {
            let mut out = Vec::new();
            let mut escaped = false;
            for &b in &rest[1..] {
                match (escaped, b) {
                    (false, b'\\') => escaped = true,
                    (false, b'"') => return Some(Bytes::from(out)),
                    _ => {
                        out.push(b);
                        escaped = false;
                    }
                }
            }
            None
        }
        _ if rest.len() >= 3 && rest[..3].eq_ignore_ascii_case(b"NIL") => Some(Bytes::new()),
        _ => None,
    }
}
