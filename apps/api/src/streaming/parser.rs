//! Incremental-text parser — turns raw chunked upstream payloads into content
//! tokens.
//!
//! The upstream speaks an SSE-style line protocol: newline-delimited frames,
//! each prefixed `data: `, carrying a JSON payload whose `"content"` field
//! holds the token, terminated by a `[DONE]` sentinel frame. Each chunk is
//! parsed independently; malformed frames are dropped with a warning, never
//! fatal to the stream.

use tracing::warn;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";
const CONTENT_MARKER: &str = "\"content\":\"";

/// Extracts the content tokens from one raw chunk. The chunk may contain zero
/// or more frames; frames without a well-formed content field are skipped.
pub fn parse_chunk(chunk: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for line in chunk.lines() {
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == DONE_SENTINEL {
            continue;
        }
        match extract_content(data) {
            Some(raw) => tokens.push(unescape(raw)),
            None => warn!(frame = %data, "Skipping malformed stream frame"),
        }
    }

    tokens
}

/// Returns the literal substring between the content marker and the next
/// unescaped quote, or `None` when the marker is absent or the field is
/// unterminated.
fn extract_content(data: &str) -> Option<&str> {
    let start = data.find(CONTENT_MARKER)? + CONTENT_MARKER.len();
    let rest = &data[start..];

    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return Some(&rest[..i]),
            _ => {}
        }
    }
    None
}

/// Unescapes the standard JSON control sequences (`\n` `\r` `\t` `\"` `\\`)
/// in a single pass. Unknown escapes are passed through verbatim.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_well_formed_frame() {
        let chunk = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_chunk(chunk), vec!["Hello"]);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk_stay_ordered() {
        let chunk = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
        );
        assert_eq!(parse_chunk(chunk), vec!["Hel", "lo"]);
    }

    #[test]
    fn test_done_sentinel_is_discarded() {
        let chunk = "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\ndata: [DONE]\n";
        assert_eq!(parse_chunk(chunk), vec!["x"]);
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let chunk = "event: ping\n: comment\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}";
        assert_eq!(parse_chunk(chunk), vec!["x"]);
    }

    #[test]
    fn test_malformed_frame_is_skipped_not_fatal() {
        let chunk = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"good\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{}}]}\n",
        );
        assert_eq!(parse_chunk(chunk), vec!["good"]);
    }

    #[test]
    fn test_unterminated_content_is_skipped() {
        let chunk = "data: {\"delta\":{\"content\":\"never closed";
        assert!(parse_chunk(chunk).is_empty());
    }

    #[test]
    fn test_escaped_quote_does_not_end_the_token() {
        let chunk = r#"data: {"delta":{"content":"say \"hi\" now"}}"#;
        assert_eq!(parse_chunk(chunk), vec!["say \"hi\" now"]);
    }

    #[test]
    fn test_control_sequences_are_unescaped() {
        let chunk = r#"data: {"delta":{"content":"line1\nline2\tend\r"}}"#;
        assert_eq!(parse_chunk(chunk), vec!["line1\nline2\tend\r"]);
    }

    #[test]
    fn test_escaped_backslash_survives() {
        let chunk = r#"data: {"delta":{"content":"C:\\temp"}}"#;
        assert_eq!(parse_chunk(chunk), vec!["C:\\temp"]);
    }

    #[test]
    fn test_empty_chunk_yields_nothing() {
        assert!(parse_chunk("").is_empty());
        assert!(parse_chunk("\n\n").is_empty());
    }
}
