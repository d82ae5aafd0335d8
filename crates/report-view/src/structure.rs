//! Structural scan of raw report markdown: headings, action markers and hyperlinks.
//!
//! Each pass is independent, line based and order preserving. Nothing here fails; lines that do
//! not parse are skipped.
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

/// Bare-URL labels longer than this many characters are cut and suffixed with `...`.
pub const LINK_LABEL_MAX: usize = 60;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heading {
    pub text: String,
    pub level: u8,
    /// Zero-based line in the raw markdown.
    pub raw_line: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Draft,
    Open,
    Configure,
    Play,
}

impl ActionKind {
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Draft => "Draft",
            ActionKind::Open => "Open",
            ActionKind::Configure => "Configure",
            ActionKind::Play => "Play",
        }
    }

    fn from_marker(marker: &str) -> Option<Self> {
        match marker.to_ascii_lowercase().as_str() {
            "draft" => Some(ActionKind::Draft),
            "open" => Some(ActionKind::Open),
            "configure" => Some(ActionKind::Configure),
            "play" => Some(ActionKind::Play),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    pub kind: ActionKind,
    pub description: String,
    /// URL, path or instruction from the trailing `(...)` segment; empty when there was none.
    pub target: String,
}

impl Action {
    /// Text handed to a generation provider or the clipboard for this action.
    pub fn instruction(&self) -> &str {
        if self.target.is_empty() {
            &self.description
        } else {
            &self.target
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkEntry {
    pub url: String,
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportStructure {
    pub headings: Vec<Heading>,
    pub actions: Vec<Action>,
    pub links: Vec<LinkEntry>,
}

pub fn parse_report(markdown: &str) -> ReportStructure {
    ReportStructure {
        headings: parse_headings(markdown),
        actions: parse_actions(markdown),
        links: parse_links(markdown),
    }
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("heading regex"))
}

fn action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[(draft|open|configure|play)\]").expect("action regex"))
}

fn markdown_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Destinations may hold one level of balanced parens, as in `wiki/Rust_(language)`.
        Regex::new(r#"\[([^\]]*)\]\(\s*((?:[^()\s]|\([^()\s]*\))+)(?:\s+"[^"]*")?\s*\)"#)
            .expect("link regex")
    })
}

fn bare_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"'`\]]+"#).expect("bare url regex"))
}

/// ATX headings outside fenced code blocks, in document order.
pub fn parse_headings(markdown: &str) -> Vec<Heading> {
    let mut fence = FenceTracker::default();
    let mut out = Vec::new();
    for (raw_line, line) in markdown.lines().enumerate() {
        if fence.consume(line) {
            continue;
        }
        let Some(caps) = heading_regex().captures(line) else {
            continue;
        };
        let level = caps[1].len() as u8;
        let text = strip_closing_hashes(caps[2].trim());
        if text.is_empty() {
            continue;
        }
        out.push(Heading {
            text: text.to_string(),
            level,
            raw_line,
        });
    }
    out
}

fn strip_closing_hashes(text: &str) -> &str {
    let stripped = text.trim_end_matches('#');
    if stripped.len() == text.len() {
        return text;
    }
    if stripped.is_empty() || stripped.ends_with(char::is_whitespace) {
        let stripped = stripped.trim_end();
        if !stripped.is_empty() {
            return stripped;
        }
    }
    text
}

/// Tracks ```` ``` ```` / `~~~` fences; `consume` reports whether the line belongs to a fence.
#[derive(Default)]
struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    fn consume(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        let fence = ['`', '~'].into_iter().find_map(|ch| {
            let run = trimmed.chars().take_while(|c| *c == ch).count();
            (run >= 3).then_some((ch, run))
        });
        match (self.open, fence) {
            (None, Some(f)) => {
                self.open = Some(f);
                true
            }
            (Some((ch, len)), Some((fch, flen))) if ch == fch && flen >= len => {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

/// First `[draft]`/`[open]`/`[configure]`/`[play]` marker on each line (case-insensitive).
pub fn parse_actions(markdown: &str) -> Vec<Action> {
    let mut out = Vec::new();
    for line in markdown.lines() {
        let Some(caps) = action_regex().captures(line) else {
            continue;
        };
        let (Some(marker), Some(whole)) = (caps.get(1), caps.get(0)) else {
            continue;
        };
        let Some(kind) = ActionKind::from_marker(marker.as_str()) else {
            continue;
        };
        let remainder = line[whole.end()..]
            .trim_start_matches(|c: char| c == '*' || c == '_' || c == ':' || c.is_whitespace())
            .trim_end();
        let (description, target) = split_target(remainder);
        out.push(Action {
            kind,
            description: description.to_string(),
            target: target.to_string(),
        });
    }
    out
}

/// Splits `desc (target)` at the balanced parenthesis group that closes the text.
///
/// Returns `(remainder, "")` when the text does not end with a closed group.
fn split_target(remainder: &str) -> (&str, &str) {
    if !remainder.ends_with(')') {
        return (remainder, "");
    }
    let mut depth = 0usize;
    for (idx, ch) in remainder.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let target = remainder[idx + 1..remainder.len() - 1].trim();
                    let description = remainder[..idx].trim_end();
                    return (description, target);
                }
            }
            _ => {}
        }
    }
    (remainder, "")
}

/// Markdown links first, then bare `http(s)://` URLs; deduplicated by URL in first-seen order.
pub fn parse_links(markdown: &str) -> Vec<LinkEntry> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    let mut covered: Vec<(usize, Range<usize>)> = Vec::new();
    for (line_idx, line) in markdown.lines().enumerate() {
        for caps in markdown_link_regex().captures_iter(line) {
            let (Some(whole), Some(dest)) = (caps.get(0), caps.get(2)) else {
                continue;
            };
            covered.push((line_idx, whole.range()));
            let url = dest.as_str().trim_matches(|c| c == '<' || c == '>');
            if url.is_empty() || !seen.insert(url.to_string()) {
                continue;
            }
            let label = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let label = if label.is_empty() { url } else { label };
            out.push(LinkEntry {
                url: url.to_string(),
                label: label.to_string(),
            });
        }
    }

    for (line_idx, line) in markdown.lines().enumerate() {
        for m in bare_url_regex().find_iter(line) {
            let inside_link = covered
                .iter()
                .any(|(l, r)| *l == line_idx && r.start <= m.start() && m.end() <= r.end);
            if inside_link {
                continue;
            }
            let url = trim_url_tail(m.as_str());
            if url.len() <= "https://".len() || !seen.insert(url.to_string()) {
                continue;
            }
            let url_range = m.start()..m.start() + url.len();
            out.push(LinkEntry {
                url: url.to_string(),
                label: bare_url_label(line, url_range, url),
            });
        }
    }
    out
}

/// Drops trailing sentence punctuation and closing parens that have no opener inside the URL.
pub(crate) fn trim_url_tail(url: &str) -> &str {
    let mut end = url.len();
    loop {
        let s = &url[..end];
        let Some(last) = s.chars().last() else {
            return s;
        };
        let trim = match last {
            '.' | ',' | ';' | ':' | '!' | '?' => true,
            ')' => s.matches(')').count() > s.matches('(').count(),
            _ => false,
        };
        if !trim {
            return s;
        }
        end -= last.len_utf8();
    }
}

fn bare_url_label(line: &str, url_range: Range<usize>, url: &str) -> String {
    let mut context = String::with_capacity(line.len());
    context.push_str(&line[..url_range.start]);
    context.push(' ');
    context.push_str(&line[url_range.end..]);

    let words: Vec<&str> = context.split_whitespace().collect();
    let mut text = words.join(" ");
    loop {
        let trimmed = text.trim_start_matches(['-', '*', '+', '>', ' ']);
        let after_digits = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
        let trimmed = if after_digits.len() < trimmed.len() {
            after_digits.strip_prefix(". ").unwrap_or(trimmed)
        } else {
            trimmed
        };
        if trimmed.len() == text.len() {
            break;
        }
        text = trimmed.to_string();
    }
    let text = text
        .trim_end_matches(|c: char| matches!(c, ':' | '-' | '(' | ')' | '—') || c.is_whitespace())
        .trim_start_matches(['(', ')', ' ']);

    if text.is_empty() {
        return url.to_string();
    }
    truncate_label(text)
}

fn truncate_label(text: &str) -> String {
    if text.chars().count() <= LINK_LABEL_MAX {
        return text.to_string();
    }
    let mut out: String = text.chars().take(LINK_LABEL_MAX).collect();
    out.push_str("...");
    out
}
