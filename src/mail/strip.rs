//! Quote/signature stripping — recover the newly-authored part of a reply.
//!
//! Line-oriented, single forward pass: emit lines until the first recognized
//! quote or signature marker, then stop. Inherently heuristic — cutting real
//! content that happens to look like an attribution line, or missing an
//! unknown client's quote format, are accepted tradeoffs.

use std::sync::LazyLock;

use regex::Regex;

// Full-line "On ... wrote:" attribution (Gmail and friends).
static ON_WROTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^on\b.*wrote:$").expect("valid regex"));

// Start of an attribution line that a client split across multiple lines.
static ON_DATE_START_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^on\s+(mon|tue|wed|thu|fri|sat|sun|jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec|\d)",
    )
    .expect("valid regex")
});

// Forwarded/quoted header block (Outlook-style).
static FROM_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^From:\s*.+$").expect("valid regex"));

// Outlook separator: a long run of underscores or hyphens.
static OUTLOOK_RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(_{10,}|-{10,})$").expect("valid regex"));

static ORIGINAL_MESSAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^-+\s*original message\s*-+$").expect("valid regex"));

// Generic horizontal rule preceding a signature.
static HRULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-_=]{3,}$").expect("valid regex"));

static SENT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^sent from (my )?(iphone|ipad|android|galaxy|samsung|mobile|outlook)")
        .expect("valid regex")
});

static GET_OUTLOOK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^get outlook for (ios|android)").expect("valid regex"));

// Client-specific quoted-block containers: everything from the marker to the
// end of the document is history.
static QUOTE_CONTAINER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<div[^>]*(?:class|id)=["'][^"']*(?:gmail_quote|yahoo_quoted|protonmail_quote|moz-cite-prefix|divRplyFwdMsg)"#,
    )
    .expect("valid regex")
});

static BLOCKQUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<blockquote\b[^>]*>.*?</blockquote>").expect("valid regex"));

static LINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));

/// Extract the newly-authored reply from the best-available body content.
///
/// Prefers non-empty plain text; falls back to flattening the HTML body.
pub fn extract_reply_text(text: Option<&str>, html: Option<&str>) -> String {
    if let Some(text) = text
        && !text.trim().is_empty()
    {
        return strip_quoted_reply(text);
    }
    if let Some(html) = html {
        return strip_quoted_reply(&html_to_text(html));
    }
    String::new()
}

/// Truncate `text` at the first quoted-reply or signature marker.
///
/// Lines before the first trigger are retained verbatim (internal blank lines
/// included); trailing blank lines are dropped and the result is trimmed.
pub fn strip_quoted_reply(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut kept: Vec<&str> = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if is_quote_or_signature_start(line, &lines[i + 1..]) {
            break;
        }
        kept.push(line);
    }

    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }

    kept.join("\n").trim().to_string()
}

/// Does this line begin the quoted-history/signature tail of the message?
///
/// Triggers are checked in priority order; `rest` is used for the multi-line
/// attribution lookahead (clients wrap "On <date> Name <email> wrote:" across
/// up to three lines).
fn is_quote_or_signature_start(line: &str, rest: &[&str]) -> bool {
    let sig = line.trim_end();
    if sig == "--" || sig == "---" {
        return true;
    }

    let trimmed = line.trim();
    if ON_WROTE_RE.is_match(trimmed) {
        return true;
    }

    if ON_DATE_START_RE.is_match(trimmed) {
        let wraps_to_wrote = rest
            .iter()
            .take(3)
            .any(|l| l.trim_end().to_lowercase().ends_with("wrote:"));
        if wraps_to_wrote || (trimmed.contains('<') && trimmed.contains('@')) {
            return true;
        }
    }

    trimmed.starts_with('>')
        || FROM_HEADER_RE.is_match(trimmed)
        || OUTLOOK_RULE_RE.is_match(trimmed)
        || ORIGINAL_MESSAGE_RE.is_match(trimmed)
        || HRULE_RE.is_match(trimmed)
        || SENT_FROM_RE.is_match(trimmed)
        || GET_OUTLOOK_RE.is_match(trimmed)
}

/// Flatten an HTML body to plain text.
///
/// Quoted-block containers truncate everything from the marker to the end;
/// `<blockquote>` spans are dropped; line-break tags become newlines; all
/// remaining tags are stripped and the five standard entities decoded.
pub fn html_to_text(html: &str) -> String {
    let html = match QUOTE_CONTAINER_RE.find(html) {
        Some(m) => &html[..m.start()],
        None => html,
    };

    let html = BLOCKQUOTE_RE.replace_all(html, "");
    let html = LINE_BREAK_RE.replace_all(&html, "\n");
    let text = TAG_RE.replace_all(&html, "");

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
