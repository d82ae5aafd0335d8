//! Heading positions in rendered output and the collapsible-section model built on them.
//!
//! Three coordinate systems meet here: raw markdown lines ([`Heading::raw_line`]), rendered
//! rows ([`Section::rendered_line`]) and visible rows (rendered rows minus collapsed ranges).
use crate::structure::Heading;
use ratatui::text::Line;
use ratatui::text::Span;
use regex::Regex;
use report_view_core::render::line_plain;
use std::sync::OnceLock;
use unicode_width::UnicodeWidthChar;

pub const EXPANDED_GLYPH: &str = "▼ ";
pub const COLLAPSED_GLYPH: &str = "▶ ";

/// How many rendered rows a wrapped heading may span and still be found.
const WRAPPED_HEADING_ROWS: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub heading: Heading,
    pub rendered_line: usize,
    /// Exclusive end of the collapse range: the next same-or-shallower heading, or the row count.
    pub end_line: usize,
    pub collapsed: bool,
}

impl Section {
    pub fn is_collapsible(&self) -> bool {
        self.heading.level >= 2
    }
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\((?:[^()]|\([^()]*\))*\)").expect("link regex"))
}

/// Heading text as it appears once rendered: emphasis/code markers removed, links reduced to labels.
pub fn search_key(text: &str) -> String {
    let text = link_regex().replace_all(text, "$1");
    strip_markers(&text).trim().to_string()
}

fn strip_markers(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`' | '~'))
        .collect()
}

/// Finds each heading in the rendered rows, searching forward only from the previous match.
///
/// Headings that cannot be found are dropped. `end_line` is filled in for every mapped heading.
pub fn map_headings(headings: &[Heading], rendered_plain: &[String]) -> Vec<Section> {
    let normalized: Vec<String> = rendered_plain.iter().map(|l| strip_markers(l)).collect();
    let mut cursor = 0usize;
    let mut sections: Vec<Section> = Vec::with_capacity(headings.len());

    for heading in headings {
        let key = search_key(&heading.text);
        if key.is_empty() {
            log::debug!("heading on raw line {} has no searchable text", heading.raw_line);
            continue;
        }
        match find_from(&normalized, cursor, &key) {
            Some(line) => {
                sections.push(Section {
                    heading: heading.clone(),
                    rendered_line: line,
                    end_line: rendered_plain.len(),
                    collapsed: false,
                });
                cursor = line + 1;
            }
            None => log::debug!(
                "heading {:?} (raw line {}) not found in rendered output",
                heading.text,
                heading.raw_line
            ),
        }
    }

    let total = rendered_plain.len();
    for i in 0..sections.len() {
        let level = sections[i].heading.level;
        sections[i].end_line = sections[i + 1..]
            .iter()
            .find(|s| s.heading.level <= level)
            .map(|s| s.rendered_line)
            .unwrap_or(total);
    }
    sections
}

/// Prefers a row that is the heading itself (or opens it, when wrapped) over a row that merely
/// mentions the text; the mention is the fallback.
fn find_from(lines: &[String], cursor: usize, key: &str) -> Option<usize> {
    let rows = cursor..lines.len();
    rows.clone()
        .find(|&i| {
            let row = lines[i].trim();
            row == key || (opens_wrapped(row, key) && joined_rows(lines, i).starts_with(key))
        })
        .or_else(|| {
            rows.clone().find(|&i| {
                lines[i].contains(key)
                    || (opens_wrapped(lines[i].trim(), key) && joined_rows(lines, i).contains(key))
            })
        })
}

fn opens_wrapped(row: &str, key: &str) -> bool {
    !row.is_empty() && row.len() < key.len() && key.starts_with(row)
}

/// Consecutive non-empty rows from `start`, rejoined the way the wrapper split them: a space
/// between words, nothing between wide characters.
fn joined_rows(lines: &[String], start: usize) -> String {
    let mut joined = String::new();
    for row in lines[start..].iter().take(WRAPPED_HEADING_ROWS).map(|l| l.trim()) {
        if row.is_empty() {
            break;
        }
        let wide_break = joined.chars().last().is_some_and(is_wide)
            && row.chars().next().is_some_and(is_wide);
        if !joined.is_empty() && !wide_break {
            joined.push(' ');
        }
        joined.push_str(row);
    }
    joined
}

fn is_wide(c: char) -> bool {
    UnicodeWidthChar::width(c).unwrap_or(0) > 1
}

/// Inserts `glyph` after the leading whitespace-only spans, styled like the first content span.
pub fn insert_indicator(line: &Line<'static>, glyph: &'static str) -> Line<'static> {
    let mut out = line.clone();
    let at = out
        .spans
        .iter()
        .position(|s| !s.content.trim().is_empty())
        .unwrap_or(out.spans.len());
    let style = out.spans.get(at).map(|s| s.style).unwrap_or(line.style);
    out.spans.insert(at, Span::styled(glyph, style));
    out
}

/// Rendered rows plus per-section collapsed state, with the visible rows kept up to date.
#[derive(Clone, Debug, Default)]
pub struct SectionModel {
    rendered: Vec<Line<'static>>,
    sections: Vec<Section>,
    visible: Vec<Line<'static>>,
    visible_plain: Vec<String>,
    visible_to_rendered: Vec<usize>,
    rendered_to_visible: Vec<Option<usize>>,
}

impl SectionModel {
    pub fn new(rendered: Vec<Line<'static>>, headings: &[Heading]) -> Self {
        let plain: Vec<String> = rendered.iter().map(line_plain).collect();
        let sections = map_headings(headings, &plain);
        let mut model = Self {
            rendered,
            sections,
            ..Self::default()
        };
        model.recompute();
        model
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn rendered_lines(&self) -> &[Line<'static>] {
        &self.rendered
    }

    pub fn visible_lines(&self) -> &[Line<'static>] {
        &self.visible
    }

    pub fn visible_plain(&self) -> &[String] {
        &self.visible_plain
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn visible_text(&self) -> String {
        self.visible_plain.join("\n")
    }

    pub fn visible_to_rendered(&self, visible_line: usize) -> Option<usize> {
        self.visible_to_rendered.get(visible_line).copied()
    }

    pub fn rendered_to_visible(&self, rendered_line: usize) -> Option<usize> {
        self.rendered_to_visible.get(rendered_line).copied().flatten()
    }

    /// Whether the section's heading row is inside a collapsed ancestor.
    pub fn is_hidden(&self, idx: usize) -> bool {
        self.sections
            .get(idx)
            .is_none_or(|s| self.rendered_to_visible(s.rendered_line).is_none())
    }

    pub fn visible_line_of(&self, idx: usize) -> Option<usize> {
        let section = self.sections.get(idx)?;
        self.rendered_to_visible(section.rendered_line)
    }

    /// Flips one section. Returns the heading's visible row, or `None` when nothing changed
    /// (level-1 heading, hidden inside a collapsed ancestor, or out of range).
    pub fn toggle(&mut self, idx: usize) -> Option<usize> {
        let collapsible = self.sections.get(idx)?.is_collapsible();
        if !collapsible || self.is_hidden(idx) {
            return None;
        }
        self.sections[idx].collapsed = !self.sections[idx].collapsed;
        self.recompute();
        self.visible_line_of(idx)
    }

    pub fn collapse_all(&mut self) {
        self.set_all(true);
    }

    pub fn expand_all(&mut self) {
        self.set_all(false);
    }

    fn set_all(&mut self, collapsed: bool) {
        for s in self.sections.iter_mut().filter(|s| s.is_collapsible()) {
            s.collapsed = collapsed;
        }
        self.recompute();
    }

    /// Raw lines of the collapsed headings, used to carry state across a re-render.
    pub fn collapsed_raw_lines(&self) -> Vec<usize> {
        self.sections
            .iter()
            .filter(|s| s.collapsed)
            .map(|s| s.heading.raw_line)
            .collect()
    }

    pub fn restore_collapsed(&mut self, raw_lines: &[usize]) {
        for s in self.sections.iter_mut().filter(|s| s.is_collapsible()) {
            s.collapsed = raw_lines.contains(&s.heading.raw_line);
        }
        self.recompute();
    }

    /// Last visible section whose heading row is at or above `visible_line`, else the first visible one.
    pub fn section_at(&self, visible_line: usize) -> Option<usize> {
        let mut current = None;
        for idx in 0..self.sections.len() {
            match self.visible_line_of(idx) {
                Some(v) if v <= visible_line => current = Some(idx),
                Some(_) if current.is_none() => return Some(idx),
                _ => {}
            }
        }
        current
    }

    /// Visible row of the first visible heading strictly below `visible_line`.
    pub fn next_heading_after(&self, visible_line: usize) -> Option<usize> {
        (0..self.sections.len())
            .filter_map(|idx| self.visible_line_of(idx))
            .find(|v| *v > visible_line)
    }

    /// Visible row of the last visible heading strictly above `visible_line`.
    pub fn prev_heading_before(&self, visible_line: usize) -> Option<usize> {
        (0..self.sections.len())
            .filter_map(|idx| self.visible_line_of(idx))
            .rfind(|v| *v < visible_line)
    }

    fn recompute(&mut self) {
        let total = self.rendered.len();
        let mut hidden = vec![false; total];
        for s in self.sections.iter().filter(|s| s.collapsed) {
            let start = (s.rendered_line + 1).min(total);
            let end = s.end_line.min(total);
            for h in hidden.iter_mut().take(end).skip(start) {
                *h = true;
            }
        }

        self.visible.clear();
        self.visible_plain.clear();
        self.visible_to_rendered.clear();
        self.rendered_to_visible = vec![None; total];

        let mut glyph_at: Vec<Option<&'static str>> = vec![None; total];
        for s in self.sections.iter().filter(|s| s.is_collapsible()) {
            if let Some(slot) = glyph_at.get_mut(s.rendered_line) {
                *slot = Some(if s.collapsed {
                    COLLAPSED_GLYPH
                } else {
                    EXPANDED_GLYPH
                });
            }
        }

        for (r, line) in self.rendered.iter().enumerate() {
            if hidden[r] {
                continue;
            }
            let line = match glyph_at[r] {
                Some(glyph) => insert_indicator(line, glyph),
                None => line.clone(),
            };
            self.rendered_to_visible[r] = Some(self.visible.len());
            self.visible_to_rendered.push(r);
            self.visible_plain.push(line_plain(&line));
            self.visible.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::parse_headings;
    use ratatui::style::Modifier;
    use ratatui::style::Style;

    const DOC: &str = "# Report\n\n## Alpha\n\ntext a\n\n### Inner\n\ntext i\n\n## Beta\n\ntext b\n";

    fn rows(lines: &[&str]) -> Vec<Line<'static>> {
        lines.iter().map(|l| Line::from(l.to_string())).collect()
    }

    fn doc_rows() -> Vec<Line<'static>> {
        rows(&[
            "Report", "", "Alpha", "", "text a", "", "Inner", "", "text i", "", "Beta", "",
            "text b",
        ])
    }

    fn model() -> SectionModel {
        SectionModel::new(doc_rows(), &parse_headings(DOC))
    }

    #[test]
    fn end_line_is_next_same_or_shallower_heading() {
        let m = model();
        let s = m.sections();
        assert_eq!(s.len(), 4);
        assert_eq!((s[1].heading.text.as_str(), s[1].rendered_line), ("Alpha", 2));
        assert_eq!(s[1].end_line, s[3].rendered_line);
        assert_eq!(s[2].end_line, s[3].rendered_line);
        assert_eq!(s[3].end_line, 13);
        assert_eq!(s[0].end_line, 13);
    }

    #[test]
    fn collapse_then_expand_restores_content() {
        let mut m = model();
        let expanded = m.visible_text();
        assert_eq!(m.toggle(1), Some(2));
        let collapsed = m.visible_text();
        assert!(collapsed.len() < expanded.len());
        assert_eq!(m.visible_len(), 13 - 7);
        assert_eq!(m.visible_plain()[2], "▶ Alpha");
        assert_eq!(m.visible_plain()[3], "▼ Beta");
        assert_eq!(m.toggle(1), Some(2));
        assert_eq!(m.visible_text(), expanded);
    }

    #[test]
    fn level_one_headings_do_not_toggle() {
        let mut m = model();
        let before = m.visible_text();
        assert_eq!(m.toggle(0), None);
        assert_eq!(m.visible_text(), before);
        assert!(!m.sections()[0].collapsed);
        assert_eq!(m.visible_plain()[0], "Report");
    }

    #[test]
    fn hidden_inner_section_cannot_toggle() {
        let mut m = model();
        m.toggle(1);
        assert!(m.is_hidden(2));
        assert_eq!(m.toggle(2), None);
        assert!(!m.sections()[2].collapsed);
        m.toggle(1);
        assert_eq!(m.toggle(2), Some(6));
        assert_eq!(m.visible_plain()[6], "▶ Inner");
    }

    #[test]
    fn collapse_all_then_expand_all() {
        let mut m = model();
        let expanded = m.visible_text();
        m.collapse_all();
        assert_eq!(m.visible_plain(), ["Report", "", "▶ Alpha", "▶ Beta"]);
        m.expand_all();
        assert_eq!(m.visible_text(), expanded);
    }

    #[test]
    fn coordinate_maps_agree() {
        let mut m = model();
        m.toggle(1);
        assert_eq!(m.visible_to_rendered(3), Some(10));
        assert_eq!(m.rendered_to_visible(10), Some(3));
        assert_eq!(m.rendered_to_visible(4), None);
    }

    #[test]
    fn repeated_heading_text_maps_forward() {
        let md = "## Summary\n\nx\n\n## Summary\n";
        let rendered = rows(&["Summary", "", "x", "", "Summary"]);
        let m = SectionModel::new(rendered, &parse_headings(md));
        let lines: Vec<_> = m.sections().iter().map(|s| s.rendered_line).collect();
        assert_eq!(lines, vec![0, 4]);
    }

    #[test]
    fn heading_row_wins_over_earlier_prose_mention() {
        let md = "# Report\n\nDetails are in Actions below.\n\n## Actions\n\n- first item\n";
        let rendered = rows(&[
            "Report",
            "",
            "Details are in Actions below.",
            "",
            "Actions",
            "",
            "• first item",
        ]);
        let m = SectionModel::new(rendered, &parse_headings(md));
        assert_eq!(m.sections()[1].rendered_line, 4);
        assert!(m.visible_text().contains("▼ Actions"));
        assert!(!m.visible_text().contains("▼ Details"));
    }

    #[test]
    fn wrapped_wide_heading_joins_without_space() {
        let md = "## 你好世界\n\ntext\n";
        let rendered = rows(&["你好世", "界", "", "text"]);
        let m = SectionModel::new(rendered, &parse_headings(md));
        assert_eq!(m.sections().len(), 1);
        assert_eq!(m.sections()[0].rendered_line, 0);
    }

    #[test]
    fn unmatched_headings_are_dropped() {
        let md = "## Present\n## Missing\n## Last\n";
        let rendered = rows(&["Present", "Last"]);
        let m = SectionModel::new(rendered, &parse_headings(md));
        let texts: Vec<_> = m.sections().iter().map(|s| s.heading.text.as_str()).collect();
        assert_eq!(texts, vec!["Present", "Last"]);
    }

    #[test]
    fn inline_markup_and_wrapping_still_match() {
        let md = "## The **bold** `plan` for [Q3](https://x.io)\n## A heading long enough to wrap around\n";
        let rendered = rows(&["The bold plan for Q3", "A heading long enough", "to wrap around"]);
        let m = SectionModel::new(rendered, &parse_headings(md));
        let lines: Vec<_> = m.sections().iter().map(|s| s.rendered_line).collect();
        assert_eq!(lines, vec![0, 1]);
    }

    #[test]
    fn indicator_goes_after_leading_whitespace_with_heading_style() {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let line = Line::from(vec![Span::raw("  "), Span::styled("Title", bold)]);
        let out = insert_indicator(&line, EXPANDED_GLYPH);
        assert_eq!(out.spans[0].content, "  ");
        assert_eq!(out.spans[1].content, EXPANDED_GLYPH);
        assert_eq!(out.spans[1].style, bold);
        assert_eq!(line_plain(&out), "  ▼ Title");
    }

    #[test]
    fn navigation_skips_hidden_headings() {
        let mut m = model();
        assert_eq!(m.next_heading_after(0), Some(2));
        assert_eq!(m.next_heading_after(2), Some(6));
        m.toggle(1);
        assert_eq!(m.next_heading_after(2), Some(3));
        assert_eq!(m.prev_heading_before(3), Some(2));
        assert_eq!(m.prev_heading_before(0), None);
        assert_eq!(m.section_at(3), Some(3));
    }

    #[test]
    fn collapsed_state_survives_rebuild() {
        let mut m = model();
        m.toggle(3);
        let carried = m.collapsed_raw_lines();
        let mut rebuilt = SectionModel::new(doc_rows(), &parse_headings(DOC));
        rebuilt.restore_collapsed(&carried);
        assert_eq!(rebuilt.visible_text(), m.visible_text());
    }
}
