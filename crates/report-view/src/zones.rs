//! Per-frame click zones over URL occurrences in the visible text.
use crate::structure::LinkEntry;
use crate::structure::trim_url_tail;
use ratatui::buffer::Buffer;
use ratatui::text::Line;
use regex::Regex;
use report_view_core::render::col_of_byte;
use report_view_core::render::line_plain;
use report_view_core::render::render_hyperlink;
use std::ops::Range;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(pub u32);

/// One clickable URL occurrence on screen. Columns are absolute, `end_col` exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zone {
    pub id: ZoneId,
    pub url: String,
    pub row: u16,
    pub start_col: u16,
    pub end_col: u16,
}

impl Zone {
    pub fn contains(&self, col: u16, row: u16) -> bool {
        self.row == row && self.start_col <= col && col < self.end_col
    }
}

/// Zones of the last drawn frame. Rebuilt from scratch on every draw.
#[derive(Clone, Debug, Default)]
pub struct ZoneState {
    zones: Vec<Zone>,
    next_id: u32,
}

impl ZoneState {
    pub fn clear(&mut self) {
        self.zones.clear();
        self.next_id = 0;
    }

    pub fn push(&mut self, url: String, row: u16, start_col: u16, end_col: u16) -> ZoneId {
        let id = ZoneId(self.next_id);
        self.next_id += 1;
        self.zones.push(Zone {
            id,
            url,
            row,
            start_col,
            end_col,
        });
        id
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn url_at(&self, col: u16, row: u16) -> Option<&str> {
        self.zones
            .iter()
            .find(|z| z.contains(col, row))
            .map(|z| z.url.as_str())
    }

    /// Scans `rows` (screen row, line) for URLs and records a zone for each, clipped to
    /// `x..x + width`. Fragments are resolved against `links`.
    ///
    /// A known URL cut at the end of a row keeps going on the next screen row: the leading word
    /// there is zoned with the same full URL when it continues the missing remainder.
    pub fn rebuild<'a>(
        &mut self,
        rows: impl IntoIterator<Item = (u16, &'a Line<'static>)>,
        x: u16,
        width: u16,
        links: &[LinkEntry],
    ) {
        self.clear();
        // (screen row, full url, text still missing) for a URL cut at the end of a row.
        let mut carry: Option<(u16, String, String)> = None;
        for (row, line) in rows {
            let text = line_plain(line);
            let text_end = text.trim_end().len();
            let mut scan_from = 0;

            if let Some((prev_row, url, rest)) = carry.take()
                && prev_row + 1 == row
                && let Some(range) = continuation(&text, &rest)
            {
                let taken = range.len();
                scan_from = range.end;
                if range.end == text_end && taken < rest.len() {
                    carry = Some((row, url.clone(), rest[taken..].to_string()));
                }
                self.push_clipped(url, row, x, width, &text, range);
            }

            for m in find_urls(&text).into_iter().filter(|m| m.start >= scan_from) {
                let url = resolve_url(&m.fragment, links);
                if m.end == text_end && url.len() > m.fragment.len() && url.starts_with(&m.fragment) {
                    carry = Some((row, url.clone(), url[m.fragment.len()..].to_string()));
                }
                self.push_clipped(url, row, x, width, &text, m.start..m.end);
            }
        }
    }

    fn push_clipped(
        &mut self,
        url: String,
        row: u16,
        x: u16,
        width: u16,
        text: &str,
        bytes: Range<usize>,
    ) {
        let start = col_of_byte(text, bytes.start).min(u16::MAX as usize) as u16;
        if start >= width {
            return;
        }
        let end = (col_of_byte(text, bytes.end).min(u16::MAX as usize) as u16).min(width);
        self.push(url, row, x + start, x + end);
    }

    /// Wraps every zone's cells in OSC 8 escapes pointing at the resolved URL.
    pub fn apply_hyperlinks(&self, buf: &mut Buffer) {
        for z in &self.zones {
            render_hyperlink(buf, z.start_col, z.row, z.end_col - z.start_col, &z.url);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlMatch {
    pub start: usize,
    pub end: usize,
    pub fragment: String,
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:https?://|mailto:|www\.)[^\s\x1b)\]>"']+"#).expect("url regex")
    })
}

/// URL-shaped substrings of `text` with byte ranges. Trailing sentence punctuation is dropped.
pub fn find_urls(text: &str) -> Vec<UrlMatch> {
    url_regex()
        .find_iter(text)
        .filter_map(|m| {
            let fragment = trim_url_tail(m.as_str());
            let bare = fragment
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_start_matches("mailto:")
                .trim_start_matches("www.");
            if bare.is_empty() {
                return None;
            }
            Some(UrlMatch {
                start: m.start(),
                end: m.start() + fragment.len(),
                fragment: fragment.to_string(),
            })
        })
        .collect()
}

/// Byte range of the first word of `text` when it continues the URL remainder `rest`.
fn continuation(text: &str, rest: &str) -> Option<Range<usize>> {
    let start = text.len() - text.trim_start().len();
    let word = trim_url_tail(text[start..].split_whitespace().next()?);
    (!word.is_empty() && rest.starts_with(word)).then(|| start..start + word.len())
}

/// Full URL for a possibly truncated on-screen fragment.
///
/// Among known URLs that start with the fragment (an exact match included) the longest wins;
/// equal lengths keep first-occurrence order. Unknown fragments are returned unchanged.
pub fn resolve_url(fragment: &str, links: &[LinkEntry]) -> String {
    let mut best: Option<&LinkEntry> = None;
    for link in links.iter().filter(|l| l.url.starts_with(fragment)) {
        if best.is_none_or(|b| link.url.len() > b.url.len()) {
            best = Some(link);
        }
    }
    best.map_or_else(|| fragment.to_string(), |l| l.url.clone())
}

/// Whether the terminal is known to understand OSC 8 hyperlinks.
pub fn supports_hyperlinks() -> bool {
    hyperlinks_supported_by(|key| std::env::var(key).ok())
}

pub(crate) fn hyperlinks_supported_by(env: impl Fn(&str) -> Option<String>) -> bool {
    if let Some(forced) = env("FORCE_HYPERLINK") {
        return forced != "0";
    }
    if env("KITTY_WINDOW_ID").is_some() || env("WT_SESSION").is_some() {
        return true;
    }
    if let Some(program) = env("TERM_PROGRAM")
        && matches!(
            program.as_str(),
            "iTerm.app" | "WezTerm" | "vscode" | "ghostty" | "Hyper" | "rio"
        )
    {
        return true;
    }
    if let Some(vte) = env("VTE_VERSION")
        && vte.parse::<u32>().is_ok_and(|v| v >= 5000)
    {
        return true;
    }
    env("TERM").is_some_and(|term| {
        ["kitty", "alacritty", "foot", "wezterm", "ghostty"]
            .iter()
            .any(|t| term.contains(t))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::layout::Rect;
    use std::collections::HashMap;

    fn link(url: &str) -> LinkEntry {
        LinkEntry {
            url: url.into(),
            label: url.into(),
        }
    }

    #[test]
    fn longest_known_prefix_wins() {
        let links = vec![link("https://x.io/a"), link("https://x.io/abc")];
        assert_eq!(resolve_url("https://x.io/a", &links), "https://x.io/abc");
        assert_eq!(resolve_url("https://x.io/ab", &links), "https://x.io/abc");
        assert_eq!(resolve_url("https://y.io", &links), "https://y.io");
    }

    #[test]
    fn equal_length_candidates_keep_first_occurrence() {
        let links = vec![link("https://x.io/one"), link("https://x.io/two")];
        assert_eq!(resolve_url("https://x.io/", &links), "https://x.io/one");
    }

    #[test]
    fn scanning_stops_at_closing_brackets_and_punctuation() {
        let found = find_urls("filing (https://sec.gov/f/1), see [www.x.io] or https://a.io/b.");
        let frags: Vec<_> = found.iter().map(|m| m.fragment.as_str()).collect();
        assert_eq!(frags, vec!["https://sec.gov/f/1", "www.x.io", "https://a.io/b"]);
        assert_eq!(found[0].start, 8);
    }

    #[test]
    fn zones_map_screen_cells_to_resolved_urls() {
        let links = vec![link("https://x.io/reports/q3")];
        let lines = [Line::from("x"), Line::from("see https://x.io/rep")];
        let mut zones = ZoneState::default();
        zones.rebuild(lines.iter().enumerate().map(|(i, l)| (i as u16 + 1, l)), 2, 40, &links);
        assert_eq!(zones.zones().len(), 1);
        let z = &zones.zones()[0];
        assert_eq!((z.row, z.start_col, z.end_col), (2, 6, 22));
        assert_eq!(zones.url_at(6, 2), Some("https://x.io/reports/q3"));
        assert_eq!(zones.url_at(22, 2), None);
        assert_eq!(zones.url_at(6, 1), None);
        assert_eq!(zones.get(z.id), Some(z));
    }

    #[test]
    fn wrapped_url_tail_on_the_next_row_is_zoned() {
        let full = "https://example.com/reports/q3-summary";
        let lines = [
            Line::from("Revenue grew. See https://example.com/reports/"),
            Line::from("q3-summary for details."),
            Line::from("q3-summary again, not a link."),
        ];
        let mut zones = ZoneState::default();
        zones.rebuild(lines.iter().enumerate().map(|(i, l)| (i as u16, l)), 0, 60, &[link(full)]);

        assert_eq!(zones.zones().len(), 2);
        let tail = &zones.zones()[1];
        assert_eq!((tail.row, tail.start_col, tail.end_col), (1, 0, 10));
        assert_eq!(zones.url_at(3, 1), Some(full));
        assert_eq!(zones.url_at(12, 1), None);
        assert_eq!(zones.url_at(3, 2), None);
    }

    #[test]
    fn continuation_needs_the_next_screen_row() {
        let full = "https://example.com/reports/q3-summary";
        let head = Line::from("See https://example.com/reports/");
        let tail = Line::from("q3-summary");
        let mut zones = ZoneState::default();
        zones.rebuild([(0u16, &head), (2u16, &tail)], 0, 60, &[link(full)]);
        assert_eq!(zones.zones().len(), 1);
    }

    #[test]
    fn hyperlinks_keep_visible_text() {
        let area = Rect::new(0, 0, 10, 1);
        let mut buf = Buffer::empty(area);
        buf.set_string(0, 0, "www.x.io", ratatui::style::Style::default());
        let line = Line::from("www.x.io");
        let mut zones = ZoneState::default();
        zones.rebuild([(0u16, &line)], 0, 10, &[link("https://www.x.io")]);
        assert_eq!(zones.zones()[0].url, "www.x.io");
        zones.apply_hyperlinks(&mut buf);
        assert_eq!(buf[(0, 0)].symbol(), "\x1b]8;;www.x.io\x07ww\x1b]8;;\x07");
    }

    #[test]
    fn hyperlink_detection_reads_environment() {
        let env = |pairs: &[(&str, &str)]| {
            let map: HashMap<String, String> = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            move |key: &str| map.get(key).cloned()
        };
        assert!(hyperlinks_supported_by(env(&[("TERM_PROGRAM", "WezTerm")])));
        assert!(hyperlinks_supported_by(env(&[("VTE_VERSION", "6003")])));
        assert!(!hyperlinks_supported_by(env(&[("TERM", "xterm-256color")])));
        assert!(!hyperlinks_supported_by(env(&[
            ("FORCE_HYPERLINK", "0"),
            ("TERM_PROGRAM", "WezTerm")
        ])));
    }
}
