//! Generated-document detection and extraction.
//!
//! A generated document is a self-contained HTML artifact. It begins either
//! with a raw document-root marker or with a ```html fenced block whose body
//! itself begins with that marker. The server uses this module to persist
//! finished documents; the client reducer uses it to switch from narration
//! to document streaming, so both sides must agree on the markers.

/// Where a document begins inside accumulated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStart {
    /// Byte offset where pre-document prose ends
    pub prefix_end: usize,
    /// Byte offset where the document body begins
    pub body_start: usize,
    /// Whether the document is wrapped in a ```html fence
    pub fenced: bool,
}

/// A document split out of surrounding prose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub prefix: String,
    pub body: String,
    pub suffix: String,
}

/// ASCII-case-insensitive substring search. Both markers and fences are
/// pure ASCII, so a match offset is always a char boundary.
fn find_ascii_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() || from > h.len() - n.len() {
        return None;
    }
    (from..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

fn starts_with_ascii_ci(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Find the earliest raw document-root marker. `<html` only counts once the
/// tag boundary is visible, so a truncated stream never misfires.
fn find_raw_marker(text: &str, from: usize) -> Option<usize> {
    let doctype = find_ascii_ci(text, "<!doctype html", from);

    let mut html = None;
    let mut at = from;
    while let Some(i) = find_ascii_ci(text, "<html", at) {
        match text.as_bytes().get(i + 5) {
            Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                html = Some(i);
                break;
            }
            Some(_) => at = i + 5,
            // Marker runs to the end of the buffer: wait for more text
            None => break,
        }
    }

    match (doctype, html) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Find a ```html fence whose body begins with a document-root marker.
/// Returns `(fence_start, body_start)`.
fn find_fenced_document(text: &str) -> Option<(usize, usize)> {
    let mut at = 0;
    while let Some(fence) = find_ascii_ci(text, "```html", at) {
        // Fences only count at the start of a line
        if fence > 0 && text.as_bytes()[fence - 1] != b'\n' {
            at = fence + 7;
            continue;
        }
        // Body begins after the fence line
        let Some(nl) = text[fence..].find('\n') else {
            return None;
        };
        let body_start = fence + nl + 1;
        let trimmed = text[body_start..].trim_start();
        if trimmed.is_empty() {
            // Nothing streamed past the fence yet
            return None;
        }
        if starts_with_ascii_ci(trimmed, "<!doctype html") || starts_with_ascii_ci(trimmed, "<html")
        {
            return Some((fence, body_start));
        }
        at = fence + 7;
    }
    None
}

/// Detect where a generated document begins in accumulated text.
///
/// Returns `None` until detection fires; until then all text is ordinary
/// narration.
pub fn detect_start(text: &str) -> Option<DocumentStart> {
    let raw = find_raw_marker(text, 0);
    let fenced = find_fenced_document(text);

    match (raw, fenced) {
        (Some(r), Some((f, body))) if f < r => Some(DocumentStart {
            prefix_end: f,
            body_start: body,
            fenced: true,
        }),
        (Some(r), _) => Some(DocumentStart {
            prefix_end: r,
            body_start: r,
            fenced: false,
        }),
        (None, Some((f, body))) => Some(DocumentStart {
            prefix_end: f,
            body_start: body,
            fenced: true,
        }),
        (None, None) => None,
    }
}

/// Check whether accumulated text contains a document start.
pub fn contains_document(text: &str) -> bool {
    detect_start(text).is_some()
}

/// The in-progress document body for a detected start: everything from the
/// body offset onward, minus a trailing close fence. Recomputed from the
/// full accumulated text on every frame (replace, not append).
pub fn streaming_body<'a>(text: &'a str, start: &DocumentStart) -> &'a str {
    let body = &text[start.body_start..];
    if start.fenced {
        if let Some(close) = find_close_fence(body) {
            return &body[..close];
        }
    }
    body
}

/// Find a closing ``` fence at the start of a line. Returns the offset of
/// the newline preceding it (the body ends there).
fn find_close_fence(body: &str) -> Option<usize> {
    if let Some(rest) = body.strip_prefix("```") {
        if rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n") {
            return Some(0);
        }
    }
    let mut at = 0;
    while let Some(i) = body[at..].find("\n```") {
        let idx = at + i;
        let after = &body[idx + 4..];
        if after.is_empty() || after.starts_with('\n') || after.starts_with("\r\n") {
            return Some(idx);
        }
        at = idx + 4;
    }
    None
}

/// Split completed text into prose prefix, document body, and prose suffix.
pub fn extract(text: &str) -> Option<ExtractedDocument> {
    let start = detect_start(text)?;
    let prefix = text[..start.prefix_end].to_string();
    let body_region = &text[start.body_start..];

    let (body, suffix) = if start.fenced {
        match find_close_fence(body_region) {
            Some(close) => {
                let after = &body_region[close..];
                // Skip the close fence line itself
                let fence_len = if after.starts_with('\n') { 4 } else { 3 };
                let suffix = &after[fence_len.min(after.len())..];
                (&body_region[..close], suffix)
            }
            None => (body_region, ""),
        }
    } else {
        match find_ascii_ci(body_region, "</html>", 0) {
            Some(i) => (&body_region[..i + 7], &body_region[i + 7..]),
            None => (body_region, ""),
        }
    };

    Some(ExtractedDocument {
        prefix,
        body: body.trim().to_string(),
        suffix: suffix.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_marker_no_detection() {
        assert!(detect_start("just some narration about sales").is_none());
        assert!(detect_start("here is `<code>` but no document").is_none());
    }

    #[test]
    fn test_raw_doctype_detection() {
        let text = "Here is your report:\n<!DOCTYPE html>\n<html><body>...";
        let start = detect_start(text).unwrap();
        assert!(!start.fenced);
        assert_eq!(&text[start.body_start..start.body_start + 9], "<!DOCTYPE");
        assert_eq!(&text[..start.prefix_end], "Here is your report:\n");
    }

    #[test]
    fn test_raw_html_tag_detection_needs_boundary() {
        // Truncated mid-token: wait
        assert!(detect_start("prose <html").is_none());
        // Boundary visible: fire
        assert!(detect_start("prose <html>").is_some());
        assert!(detect_start("prose <html lang=\"en\">").is_some());
        // Not actually the html tag
        assert!(detect_start("prose <htmlish>").is_none());
    }

    #[test]
    fn test_fenced_detection_requires_marker_in_body() {
        let doc = "Intro\n```html\n<!DOCTYPE html>\n<html></html>\n```\nOutro";
        let start = detect_start(doc).unwrap();
        assert!(start.fenced);
        assert!(doc[start.body_start..].starts_with("<!DOCTYPE html>"));

        // A fenced html snippet that is not a full document stays narration
        let snippet = "Example:\n```html\n<div>hello</div>\n```\n";
        assert!(detect_start(snippet).is_none());
    }

    #[test]
    fn test_fenced_detection_waits_for_body() {
        // Fence opened but no body yet
        assert!(detect_start("Report:\n```html\n").is_none());
        assert!(detect_start("Report:\n```html\n\n  ").is_none());
    }

    #[test]
    fn test_streaming_body_strips_trailing_fence() {
        let text = "```html\n<!DOCTYPE html>\n<html></html>\n```";
        let start = detect_start(text).unwrap();
        assert_eq!(streaming_body(text, &start), "<!DOCTYPE html>\n<html></html>");
    }

    #[test]
    fn test_streaming_body_replace_semantics() {
        let mut text = String::from("```html\n<!DOCTYPE html>\n<html>");
        let start = detect_start(&text).unwrap();
        assert_eq!(streaming_body(&text, &start), "<!DOCTYPE html>\n<html>");
        text.push_str("<body></body></html>");
        assert_eq!(
            streaming_body(&text, &start),
            "<!DOCTYPE html>\n<html><body></body></html>"
        );
    }

    #[test]
    fn test_extract_with_prefix_and_suffix() {
        let text = "Here you go.\n```html\n<!DOCTYPE html>\n<html><body>hi</body></html>\n```\nAnything else?";
        let doc = extract(text).unwrap();
        assert_eq!(doc.prefix, "Here you go.\n");
        assert!(doc.body.starts_with("<!DOCTYPE html>"));
        assert!(doc.body.ends_with("</html>"));
        assert_eq!(doc.suffix, "\nAnything else?");
    }

    #[test]
    fn test_extract_raw_document_trailing_prose() {
        let text = "<!DOCTYPE html>\n<html><body></body></html>\nLet me know.";
        let doc = extract(text).unwrap();
        assert_eq!(doc.prefix, "");
        assert!(doc.body.ends_with("</html>"));
        assert_eq!(doc.suffix, "\nLet me know.");
    }

    #[test]
    fn test_extract_unclosed_fence_runs_to_end() {
        let text = "```html\n<!DOCTYPE html>\n<html><body>partial";
        let doc = extract(text).unwrap();
        assert!(doc.body.ends_with("partial"));
        assert_eq!(doc.suffix, "");
    }

    #[test]
    fn test_case_insensitive_markers() {
        assert!(contains_document("<!doctype HTML>\n<HTML>"));
        assert!(contains_document("<HTML lang=\"en\">"));
    }
}
