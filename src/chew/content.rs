//! Event description processing: HTML to text, anchors, snippet.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{BodyPart, BodyType, LinkInfo};

use super::links::{process_links, LinkConfig};

/// Snippets are cut at this many characters.
pub const SNIPPET_LEN: usize = 100;

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a\s*>"#)
        .expect("valid anchor regex")
});

static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(?:br|/?p|/?div|/?tr|/?li|/?h[1-6])\b[^>]*>").expect("valid block regex")
});

static DROPPED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b.*?</(?:script|style)\s*>").expect("valid script regex")
});

/// Output of [`process_event_content`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedContent {
    pub body: BodyPart,
    pub snippet: Option<String>,
    pub authored_body_size: usize,
    pub links: Vec<LinkInfo>,
}

/// Render a description into a body part plus its snippet and links.
pub fn process_event_content(content: &str, kind: BodyType, cfg: &LinkConfig) -> ProcessedContent {
    let (text, anchors) = match kind {
        BodyType::Html => (html_to_text(content), extract_anchors(content)),
        BodyType::Plain => (content.trim().to_string(), Vec::new()),
    };

    let links = process_links(&anchors, Some(&text), cfg);
    let snippet = make_snippet(&text);
    let authored_body_size = text.len();

    ProcessedContent {
        body: BodyPart {
            body_type: kind,
            size_estimate: content.len(),
            amount_downloaded: content.len(),
            is_downloaded: true,
            content: content.to_string(),
            authored_body_size,
        },
        snippet,
        authored_body_size,
        links,
    }
}

/// Collapse whitespace and cut at [`SNIPPET_LEN`] characters.
pub fn make_snippet(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(SNIPPET_LEN).collect())
}

/// `(href, text)` for every anchor element.
pub fn extract_anchors(html: &str) -> Vec<(String, String)> {
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let href = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
            if href.is_empty() {
                return None;
            }
            let text = caps.get(3).map_or(String::new(), |m| html_to_text(m.as_str()));
            Some((decode_entities(href), text))
        })
        .collect()
}

/// Convert HTML to plain text, keeping block structure as line breaks.
pub fn html_to_text(html: &str) -> String {
    let text = DROPPED_BLOCK_RE.replace_all(html, "");
    let text = BLOCK_TAG_RE.replace_all(&text, "\n");

    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }
    let decoded = decode_entities(&stripped);

    // At most one blank line in a row.
    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_blank = false;
    for line in decoded.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !prev_blank {
                cleaned.push('\n');
            }
            prev_blank = true;
        } else {
            cleaned.push_str(line);
            cleaned.push('\n');
            prev_blank = false;
        }
    }
    cleaned.trim().to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_blocks_and_entities() {
        let html = "<div>Agenda</div><p>1 &amp; 2</p><script>evil()</script><br>Done &lt;ok&gt;";
        assert_eq!(html_to_text(html), "Agenda\n\n1 & 2\n\nDone <ok>");
    }

    #[test]
    fn test_extract_anchors() {
        let html = r#"Join <a class="x" href="https://example.com/a?x=1&amp;y=2">the <b>call</b></a>
                      or <A HREF='https://example.com/b'>here</A> <a href="">empty</a>"#;
        let anchors = extract_anchors(html);
        assert_eq!(
            anchors,
            vec![
                ("https://example.com/a?x=1&y=2".to_string(), "the call".to_string()),
                ("https://example.com/b".to_string(), "here".to_string()),
            ]
        );
    }

    #[test]
    fn test_snippet_is_collapsed_and_cut() {
        assert!(make_snippet("  \n ").is_none());
        assert_eq!(make_snippet("a \n\n b").as_deref(), Some("a b"));
        let long = "x".repeat(250);
        assert_eq!(make_snippet(&long).map(|s| s.len()), Some(SNIPPET_LEN));
    }

    #[test]
    fn test_process_html_content() {
        let cfg = LinkConfig::default();
        let html = r#"<p>Weekly sync</p><p><a href="https://acme.zoom.us/j/42">Join Zoom</a></p>"#;
        let out = process_event_content(html, BodyType::Html, &cfg);
        assert_eq!(out.snippet.as_deref(), Some("Weekly sync Join Zoom"));
        assert_eq!(out.links.len(), 1);
        assert!(out.body.is_downloaded);
        assert_eq!(out.body.size_estimate, html.len());
        assert_eq!(out.authored_body_size, "Weekly sync\n\nJoin Zoom".len());
    }

    #[test]
    fn test_process_plain_content() {
        let cfg = LinkConfig::default();
        let out = process_event_content("Notes at www.example.com/notes", BodyType::Plain, &cfg);
        assert_eq!(out.links[0].url, "https://www.example.com/notes");
        assert_eq!(out.body.body_type, BodyType::Plain);
    }
}
