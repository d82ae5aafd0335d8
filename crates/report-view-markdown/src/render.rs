use crate::RenderError;
use crate::StyledText;
use pulldown_cmark::Alignment;
use pulldown_cmark::CowStr;
use pulldown_cmark::Event;
use pulldown_cmark::HeadingLevel;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use pulldown_cmark::Tag;
use pulldown_cmark::TagEnd;
use ratatui::style::Modifier;
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::text::Span;
use report_view_core::theme::StyleVariant;
use report_view_core::theme::Theme;
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;
use url::Url;

#[derive(Clone, Copy, Debug, Default)]
struct InlineFlags {
    emphasis: bool,
    strong: bool,
    strike: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ProseStyle {
    #[default]
    Normal,
    Heading(u8),
    BlockQuote,
    List,
}

#[derive(Clone, Debug)]
struct Segment {
    text: String,
    style: ProseStyle,
    flags: InlineFlags,
    inline_code: bool,
    link: bool,
    muted: bool,
}

impl Segment {
    fn new(text: String, style: ProseStyle, flags: InlineFlags) -> Self {
        Self {
            text,
            style,
            flags,
            inline_code: false,
            link: false,
            muted: false,
        }
    }

    fn with_text(&self, text: &str) -> Self {
        let mut seg = self.clone();
        seg.text = text.to_string();
        seg
    }

    fn muted(text: impl Into<String>) -> Self {
        let mut seg = Self::new(text.into(), ProseStyle::Normal, InlineFlags::default());
        seg.muted = true;
        seg
    }
}

#[derive(Clone, Debug)]
struct ProseBlock {
    lines: Vec<Vec<Segment>>,
    initial_prefix: Vec<Segment>,
    subsequent_prefix: Vec<Segment>,
}

#[derive(Clone, Debug)]
struct CodeBlock {
    lines: Vec<String>,
    prefix: Vec<Segment>,
    indent: u16,
}

#[derive(Clone, Debug)]
struct TableBlock {
    aligns: Vec<Alignment>,
    head: Vec<Vec<Vec<Segment>>>,
    body: Vec<Vec<Vec<Segment>>>,
    prefix: Vec<Segment>,
}

#[derive(Clone, Debug)]
enum Block {
    Prose(ProseBlock),
    Code(CodeBlock),
    Table(TableBlock),
    Rule(Vec<Segment>),
    Blank(Vec<Segment>),
}

/// Layout switches for [`MarkdownRenderer`].
#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub wrap_prose: bool,
    /// Render `[label](url)` as `label (url)` so the destination is visible (and clickable).
    pub show_link_destinations: bool,
    pub show_heading_markers: bool,
    pub blockquote_prefix: String,
    pub code_block_indent: u16,
    pub base_url: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            wrap_prose: true,
            show_link_destinations: true,
            show_heading_markers: false,
            blockquote_prefix: "│ ".to_string(),
            code_block_indent: 2,
            base_url: None,
        }
    }
}

/// Markdown → styled, word-wrapped lines for one `(width, style variant)` pair.
///
/// Output is deterministic for identical input and keeps heading text verbatim (inline markup
/// removed), which is what heading lookup in the rendered output relies on.
#[derive(Clone, Debug)]
pub struct MarkdownRenderer {
    width: u16,
    variant: StyleVariant,
    theme: Theme,
    options: RenderOptions,
    parser_options: Options,
}

impl MarkdownRenderer {
    pub fn new(width: u16, variant: StyleVariant) -> Self {
        Self::with_options(width, variant, RenderOptions::default())
    }

    pub fn with_options(width: u16, variant: StyleVariant, options: RenderOptions) -> Self {
        let mut parser_options = Options::empty();
        parser_options.insert(Options::ENABLE_TABLES);
        parser_options.insert(Options::ENABLE_TASKLISTS);
        parser_options.insert(Options::ENABLE_FOOTNOTES);
        parser_options.insert(Options::ENABLE_STRIKETHROUGH);
        Self {
            width,
            variant,
            theme: Theme::for_variant(variant),
            options,
            parser_options,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn variant(&self) -> StyleVariant {
        self.variant
    }

    pub fn render(&self, markdown: &str) -> Result<StyledText, RenderError> {
        if self.width == 0 {
            return Err(RenderError::ZeroWidth);
        }
        let blocks = parse_blocks(markdown, self.parser_options, &self.options);
        let layout = Layout {
            width: self.width as usize,
            wrap_prose: self.options.wrap_prose,
            theme: &self.theme,
        };
        let lines = layout.lines(&blocks);
        Ok(StyledText::new(lines))
    }
}

/// Prefix contributed by one open container (list item, blockquote, footnote).
#[derive(Clone, Debug)]
struct IndentCtx {
    initial: Vec<Segment>,
    subsequent: Vec<Segment>,
    use_subsequent_for_initial: bool,
}

impl IndentCtx {
    fn uniform(prefix: Segment) -> Self {
        Self {
            initial: vec![prefix.clone()],
            subsequent: vec![prefix],
            use_subsequent_for_initial: false,
        }
    }

    /// `marker` on the first line, blanks of the same width after it.
    fn hanging(marker: String, inline: InlineFlags) -> Self {
        let pad = " ".repeat(UnicodeWidthStr::width(marker.as_str()));
        Self {
            initial: vec![Segment::new(marker, ProseStyle::List, inline)],
            subsequent: vec![Segment::new(pad, ProseStyle::List, inline)],
            use_subsequent_for_initial: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ListCtx {
    ordered: bool,
    index: u64,
}

#[derive(Clone, Copy, Debug)]
struct ItemCtx {
    has_block: bool,
    indent_idx: usize,
}

#[derive(Debug, Default)]
struct Paragraph {
    open: bool,
    style: ProseStyle,
    lines: Vec<Vec<Segment>>,
    current: Vec<Segment>,
    first_prefix: Vec<Segment>,
    rest_prefix: Vec<Segment>,
}

#[derive(Debug, Default)]
struct PendingCode {
    lines: Vec<String>,
    current: String,
    prefix: Vec<Segment>,
}

#[derive(Debug, Default)]
struct PendingTable {
    aligns: Vec<Alignment>,
    in_head: bool,
    cell: Option<Vec<Segment>>,
    row: Vec<Vec<Segment>>,
    head: Vec<Vec<Vec<Segment>>>,
    body: Vec<Vec<Vec<Segment>>>,
    prefix: Vec<Segment>,
}

#[derive(Debug)]
struct PendingLink {
    dest: String,
    text: String,
}

#[derive(Debug)]
struct PendingImage {
    dest: String,
    alt: String,
}

/// Folds pulldown-cmark events into [`Block`]s. Containers only contribute prefixes; every
/// leaf (paragraph, code, table, rule) becomes one block.
struct Builder<'a> {
    options: &'a RenderOptions,
    blocks: Vec<Block>,
    indents: Vec<IndentCtx>,
    lists: Vec<ListCtx>,
    items: Vec<ItemCtx>,
    quote_depth: usize,
    inline: InlineFlags,
    para: Paragraph,
    code: Option<PendingCode>,
    table: Option<PendingTable>,
    link: Option<PendingLink>,
    image: Option<PendingImage>,
    wants_blank: bool,
}

impl<'a> Builder<'a> {
    fn new(options: &'a RenderOptions) -> Self {
        Self {
            options,
            blocks: Vec::new(),
            indents: Vec::new(),
            lists: Vec::new(),
            items: Vec::new(),
            quote_depth: 0,
            inline: InlineFlags::default(),
            para: Paragraph::default(),
            code: None,
            table: None,
            link: None,
            image: None,
            wants_blank: false,
        }
    }

    /// (first-line prefix, continuation prefix) of the containers currently open.
    fn prefixes(&self) -> (Vec<Segment>, Vec<Segment>) {
        let mut first = Vec::new();
        let mut rest = Vec::new();
        for ctx in &self.indents {
            first.extend_from_slice(if ctx.use_subsequent_for_initial {
                &ctx.subsequent
            } else {
                &ctx.initial
            });
            rest.extend_from_slice(&ctx.subsequent);
        }
        (first, rest)
    }

    fn last_is_blank(&self) -> bool {
        matches!(self.blocks.last(), None | Some(Block::Blank(_)))
    }

    fn separate(&mut self) {
        if self.wants_blank && !self.last_is_blank() {
            let (_, rest) = self.prefixes();
            self.blocks.push(Block::Blank(rest));
        }
        self.wants_blank = false;
    }

    /// Loose list items put a blank row between their blocks.
    fn separate_in_item(&mut self) {
        if self.items.last().is_some_and(|item| item.has_block) && !self.last_is_blank() {
            let (_, rest) = self.prefixes();
            self.blocks.push(Block::Blank(rest));
        }
    }

    fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
        if let Some(item) = self.items.last_mut() {
            item.has_block = true;
            if let Some(ctx) = self.indents.get_mut(item.indent_idx) {
                ctx.use_subsequent_for_initial = true;
            }
        }
    }

    fn in_cell(&self) -> bool {
        self.table.as_ref().is_some_and(|t| t.cell.is_some())
    }

    fn open_paragraph(&mut self, style: ProseStyle) {
        self.close_code();
        self.close_paragraph();
        self.separate();
        let (first_prefix, rest_prefix) = self.prefixes();
        let style = match style {
            ProseStyle::Normal if self.quote_depth > 0 => ProseStyle::BlockQuote,
            other => other,
        };
        self.para = Paragraph {
            open: true,
            style,
            first_prefix,
            rest_prefix,
            ..Paragraph::default()
        };
    }

    fn close_paragraph(&mut self) {
        if !self.para.open {
            return;
        }
        let para = std::mem::take(&mut self.para);
        let mut lines = para.lines;
        if !para.current.is_empty() {
            lines.push(para.current);
        }
        if lines.is_empty() {
            return;
        }
        self.separate();
        self.push_block(Block::Prose(ProseBlock {
            lines,
            initial_prefix: para.first_prefix,
            subsequent_prefix: para.rest_prefix,
        }));
        self.wants_blank = self.lists.is_empty() && self.table.is_none();
    }

    fn close_code(&mut self) {
        let Some(mut code) = self.code.take() else {
            return;
        };
        if !code.current.is_empty() {
            code.lines.push(std::mem::take(&mut code.current));
        }
        if code.lines.last().is_some_and(String::is_empty) {
            code.lines.pop();
        }
        self.separate();
        self.push_block(Block::Code(CodeBlock {
            lines: code.lines,
            prefix: code.prefix,
            indent: self.options.code_block_indent,
        }));
        self.wants_blank = self.lists.is_empty() && self.table.is_none();
    }

    fn close_table(&mut self) {
        if self.table.is_none() {
            return;
        }
        self.close_paragraph();
        self.close_code();
        self.separate();
        let Some(table) = self.table.take() else {
            return;
        };
        self.push_block(Block::Table(TableBlock {
            aligns: table.aligns,
            head: table.head,
            body: table.body,
            prefix: table.prefix,
        }));
        self.wants_blank = self.lists.is_empty();
    }

    /// Closes whatever leaf is open before a new block-level element starts.
    fn close_leaf(&mut self) {
        self.close_paragraph();
        self.close_code();
        self.separate_in_item();
        self.separate();
    }

    /// A segment in the current inline style. Text outside any paragraph or cell opens one.
    fn segment(&mut self, text: impl Into<String>) -> Segment {
        if !self.in_cell() && !self.para.open {
            self.open_paragraph(ProseStyle::Normal);
        }
        Segment::new(text.into(), self.para.style, self.inline)
    }

    fn push_inline(&mut self, seg: Segment) {
        if let Some(cell) = self.table.as_mut().and_then(|t| t.cell.as_mut()) {
            cell.push(seg);
            return;
        }
        if !self.para.open {
            self.open_paragraph(ProseStyle::Normal);
        }
        self.para.current.push(seg);
    }

    fn push_text(&mut self, text: &str, inline_code: bool) {
        if let Some(image) = self.image.as_mut() {
            image.alt.push_str(text);
            return;
        }
        if let Some(link) = self.link.as_mut() {
            link.text.push_str(text);
        }
        let mut seg = self.segment(text);
        seg.inline_code = inline_code;
        seg.link = self.link.is_some();
        self.push_inline(seg);
    }

    fn push_code_text(&mut self, text: &str) {
        let Some(code) = self.code.as_mut() else {
            return;
        };
        for ch in text.chars() {
            match ch {
                '\n' => code.lines.push(std::mem::take(&mut code.current)),
                '\r' => {}
                '\t' => code.current.push_str("    "),
                other => code.current.push(other),
            }
        }
    }

    fn line_break(&mut self, hard: bool) {
        if let Some(code) = self.code.as_mut() {
            code.lines.push(std::mem::take(&mut code.current));
            return;
        }
        if let Some(link) = self.link.as_mut() {
            link.text.push(' ');
        }
        if self.in_cell() {
            let space = Segment::new(" ".to_string(), ProseStyle::Normal, self.inline);
            self.push_inline(space);
            return;
        }
        if !self.para.open {
            return;
        }
        if hard {
            let line = std::mem::take(&mut self.para.current);
            self.para.lines.push(line);
        } else {
            let space = Segment::new(" ".to_string(), self.para.style, self.inline);
            self.para.current.push(space);
        }
    }

    fn task_marker(&mut self, checked: bool) {
        let Some(ctx) = self.indents.last_mut() else {
            return;
        };
        let (Some(first), Some(rest)) = (ctx.initial.first_mut(), ctx.subsequent.first_mut()) else {
            return;
        };
        first.text = if checked { "[✓] " } else { "[ ] " }.to_string();
        rest.text = " ".repeat(UnicodeWidthStr::width(first.text.as_str()));
    }

    fn end_link(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        if !self.options.show_link_destinations {
            return;
        }
        let text = link.text.trim();
        let dest = link.dest.as_str();
        let redundant = text.is_empty()
            || dest.is_empty()
            || text == dest
            || dest.strip_prefix("mailto:") == Some(text);
        if !redundant {
            self.push_inline(Segment::muted(format!(" ({dest})")));
        }
    }

    fn end_image(&mut self) {
        let Some(image) = self.image.take() else {
            return;
        };
        let alt = match image.alt.trim() {
            "" => "[image]",
            alt => alt,
        };
        self.push_inline(Segment::muted("Image: "));
        let mut alt_seg = self.segment(alt);
        alt_seg.link = true;
        self.push_inline(alt_seg);
        if !image.dest.is_empty() {
            self.push_inline(Segment::muted(format!(" → {}", image.dest)));
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                self.separate_in_item();
                self.open_paragraph(ProseStyle::Normal);
            }
            Tag::Heading { level, .. } => {
                self.separate_in_item();
                let level = heading_level(level);
                self.open_paragraph(ProseStyle::Heading(level));
                if self.options.show_heading_markers {
                    let marker = format!("{} ", "#".repeat(level as usize));
                    let seg = self.segment(marker);
                    self.push_inline(seg);
                }
            }
            Tag::BlockQuote(_) => {
                self.close_leaf();
                self.quote_depth += 1;
                let prefix = Segment::new(
                    self.options.blockquote_prefix.clone(),
                    ProseStyle::BlockQuote,
                    self.inline,
                );
                self.indents.push(IndentCtx::uniform(prefix));
            }
            Tag::FootnoteDefinition(label) => {
                self.close_table();
                self.close_paragraph();
                self.close_code();
                self.separate();
                self.indents
                    .push(IndentCtx::hanging(format!("[^{label}]: "), self.inline));
            }
            Tag::List(start) => self.lists.push(ListCtx {
                ordered: start.is_some(),
                index: start.unwrap_or(1),
            }),
            Tag::Item => {
                self.close_code();
                self.close_paragraph();
                let Some(list) = self.lists.last().copied() else {
                    return;
                };
                let marker = if list.ordered {
                    format!("{}. ", list.index)
                } else {
                    "• ".to_string()
                };
                self.items.push(ItemCtx {
                    has_block: false,
                    indent_idx: self.indents.len(),
                });
                self.indents.push(IndentCtx::hanging(marker, self.inline));
            }
            Tag::Emphasis => self.inline.emphasis = true,
            Tag::Strong => self.inline.strong = true,
            Tag::Strikethrough => self.inline.strike = true,
            Tag::Link { dest_url, .. } => {
                self.link = Some(PendingLink {
                    dest: resolve_url(self.options.base_url.as_deref(), &dest_url),
                    text: String::new(),
                });
            }
            Tag::Image { dest_url, .. } => {
                self.image = Some(PendingImage {
                    dest: resolve_url(self.options.base_url.as_deref(), &dest_url),
                    alt: String::new(),
                });
            }
            Tag::CodeBlock(_) => {
                self.close_leaf();
                let (_, prefix) = self.prefixes();
                self.code = Some(PendingCode {
                    prefix,
                    ..PendingCode::default()
                });
            }
            Tag::Table(aligns) => {
                self.close_leaf();
                let (_, prefix) = self.prefixes();
                self.table = Some(PendingTable {
                    aligns,
                    prefix,
                    ..PendingTable::default()
                });
            }
            Tag::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = true;
                    table.row.clear();
                }
            }
            Tag::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    table.row.clear();
                }
            }
            Tag::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    table.cell = Some(Vec::new());
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph | TagEnd::Heading(_) => self.close_paragraph(),
            TagEnd::BlockQuote(_) => {
                self.close_paragraph();
                self.indents.pop();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            TagEnd::FootnoteDefinition => {
                self.close_paragraph();
                self.indents.pop();
            }
            TagEnd::List(_) => {
                self.close_paragraph();
                self.lists.pop();
                self.wants_blank = self.lists.is_empty() && self.table.is_none();
            }
            TagEnd::Item => {
                self.close_paragraph();
                if let Some(list) = self.lists.last_mut() {
                    list.index += 1;
                }
                self.items.pop();
                self.indents.pop();
            }
            TagEnd::Emphasis => self.inline.emphasis = false,
            TagEnd::Strong => self.inline.strong = false,
            TagEnd::Strikethrough => self.inline.strike = false,
            TagEnd::Link => self.end_link(),
            TagEnd::Image => self.end_image(),
            TagEnd::CodeBlock => self.close_code(),
            TagEnd::TableCell => {
                if let Some(table) = self.table.as_mut() {
                    let cell = table.cell.take().unwrap_or_default();
                    table.row.push(cell);
                }
            }
            TagEnd::TableRow => {
                if let Some(table) = self.table.as_mut() {
                    let row = std::mem::take(&mut table.row);
                    if table.in_head {
                        table.head.push(row);
                    } else {
                        table.body.push(row);
                    }
                }
            }
            TagEnd::TableHead => {
                if let Some(table) = self.table.as_mut() {
                    table.in_head = false;
                    if !table.row.is_empty() {
                        let row = std::mem::take(&mut table.row);
                        table.head.push(row);
                    }
                }
            }
            TagEnd::Table => self.close_table(),
            _ => {}
        }
    }

    fn event(&mut self, ev: Event<'_>) {
        match ev {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) if self.code.is_some() => self.push_code_text(&text),
            Event::Text(text) => self.push_text(&text, false),
            Event::Code(code) => self.push_text(&code, true),
            Event::SoftBreak => self.line_break(false),
            Event::HardBreak => self.line_break(true),
            Event::Rule => {
                self.close_leaf();
                let (_, prefix) = self.prefixes();
                self.push_block(Block::Rule(prefix));
                self.wants_blank = self.lists.is_empty();
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let text = html_to_text(&html);
                if !text.trim().is_empty() {
                    let mut seg = self.segment(text);
                    seg.muted = true;
                    self.push_inline(seg);
                }
            }
            Event::InlineMath(math) => {
                let mut seg = self.segment(format!("${math}$"));
                seg.inline_code = true;
                self.push_inline(seg);
            }
            Event::DisplayMath(math) => {
                self.open_paragraph(ProseStyle::Normal);
                let mut seg = self.segment(format!("$$ {math} $$"));
                seg.inline_code = true;
                self.push_inline(seg);
                self.close_paragraph();
            }
            Event::FootnoteReference(label) => {
                let mut seg = self.segment(format!("[^{label}]"));
                seg.link = true;
                self.push_inline(seg);
            }
            Event::TaskListMarker(checked) => self.task_marker(checked),
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.close_paragraph();
        self.close_code();
        self.close_table();
        while matches!(self.blocks.last(), Some(Block::Blank(_))) {
            self.blocks.pop();
        }
        self.blocks
    }
}

fn parse_blocks(input: &str, parser_options: Options, options: &RenderOptions) -> Vec<Block> {
    let mut builder = Builder::new(options);
    for ev in Parser::new_ext(input, parser_options) {
        builder.event(ev);
    }
    builder.finish()
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn html_to_text(html: &CowStr<'_>) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if in_tag => {}
            _ => out.push(ch),
        }
    }
    let decoded = out
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve_url(base_url: Option<&str>, dest: &str) -> String {
    let dest = dest.trim();
    if dest.is_empty() || is_absolute_url(dest) {
        return dest.to_string();
    }
    let Some(base) = base_url.map(str::trim).filter(|s| !s.is_empty()) else {
        return dest.to_string();
    };
    match Url::parse(base) {
        Ok(base) => base
            .join(dest)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| dest.to_string()),
        Err(_) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            dest.trim_start_matches("./").trim_start_matches('/')
        ),
    }
}

fn is_absolute_url(dest: &str) -> bool {
    dest.starts_with('#')
        || dest.starts_with('/')
        || dest.starts_with("mailto:")
        || dest.contains("://")
}

/// Lays blocks out as terminal rows at a fixed width.
struct Layout<'t> {
    width: usize,
    wrap_prose: bool,
    theme: &'t Theme,
}

impl Layout<'_> {
    fn lines(&self, blocks: &[Block]) -> Vec<Line<'static>> {
        let mut out = Vec::new();
        for block in blocks {
            match block {
                Block::Blank(prefix) => out.push(Line::from(self.spans(prefix))),
                Block::Rule(prefix) => {
                    let mut spans = self.spans(prefix);
                    let rule_cols = self.width.saturating_sub(cols_of(prefix)).max(1);
                    spans.push(Span::styled("─".repeat(rule_cols), self.theme.text_muted));
                    out.push(Line::from(spans));
                }
                Block::Code(code) => out.extend(self.code(code)),
                Block::Table(table) => out.extend(self.table(table)),
                Block::Prose(prose) => out.extend(self.prose(prose)),
            }
        }
        out
    }

    fn code(&self, code: &CodeBlock) -> Vec<Line<'static>> {
        let prefix = self.spans(&code.prefix);
        let indent = " ".repeat(code.indent as usize);
        code.lines
            .iter()
            .map(|text| {
                let mut spans = prefix.clone();
                if !indent.is_empty() {
                    spans.push(Span::raw(indent.clone()));
                }
                spans.push(Span::styled(text.clone(), self.theme.code_inline));
                Line::from(spans)
            })
            .collect()
    }

    fn prose(&self, prose: &ProseBlock) -> Vec<Line<'static>> {
        let mut out = Vec::new();
        for (i, logical) in prose.lines.iter().enumerate() {
            let first = if i == 0 {
                &prose.initial_prefix
            } else {
                &prose.subsequent_prefix
            };
            if self.wrap_prose {
                out.extend(self.wrap(first, &prose.subsequent_prefix, logical, self.width));
            } else {
                let mut spans = self.spans(first);
                spans.extend(self.spans(logical));
                out.push(Line::from(spans));
            }
        }
        out
    }

    /// Borderless grid: ` a │ b ` rows, a `─┼─` rule under the header. Tables too narrow for
    /// one column each are dropped.
    fn table(&self, table: &TableBlock) -> Vec<Line<'static>> {
        let width = self.width.saturating_sub(cols_of(&table.prefix));
        let rows = || table.head.iter().chain(&table.body);
        let ncols = rows().map(Vec::len).max().unwrap_or(0);
        if ncols == 0 {
            return Vec::new();
        }
        // One pad column each side of a cell plus one separator between cells.
        let chrome = 3 * ncols - 1;
        if chrome >= width {
            return Vec::new();
        }

        let mut widths = vec![1usize; ncols];
        for row in rows() {
            for (ci, cell) in row.iter().enumerate() {
                widths[ci] = widths[ci].max(cols_of(cell));
            }
        }
        fit_columns(&mut widths, width - chrome);

        let mut out = Vec::new();
        for row in &table.head {
            out.extend(self.table_row(row, &widths, &table.aligns, true));
        }
        if !table.head.is_empty() {
            let rule = widths
                .iter()
                .map(|w| "─".repeat(w + 2))
                .collect::<Vec<_>>()
                .join("┼");
            out.push(Line::from(Span::styled(rule, self.theme.text_muted)));
        }
        for row in &table.body {
            out.extend(self.table_row(row, &widths, &table.aligns, false));
        }

        let prefix = self.spans(&table.prefix);
        if prefix.is_empty() {
            return out;
        }
        out.into_iter()
            .map(|line| {
                let mut spans = prefix.clone();
                spans.extend(line.spans);
                Line::from(spans)
            })
            .collect()
    }

    fn table_row(
        &self,
        row: &[Vec<Segment>],
        widths: &[usize],
        aligns: &[Alignment],
        header: bool,
    ) -> Vec<Line<'static>> {
        let cells: Vec<Vec<Vec<Span<'static>>>> = widths
            .iter()
            .enumerate()
            .map(|(ci, &w)| {
                let cell = row.get(ci).map(Vec::as_slice).unwrap_or_default();
                let mut lines: Vec<_> = self
                    .wrap(&[], &[], cell, w)
                    .into_iter()
                    .map(|l| l.spans)
                    .collect();
                if lines.is_empty() {
                    lines.push(Vec::new());
                }
                lines
            })
            .collect();
        let height = cells.iter().map(Vec::len).max().unwrap_or(1);

        (0..height)
            .map(|li| {
                let mut spans = Vec::new();
                for (ci, cell) in cells.iter().enumerate() {
                    if ci > 0 {
                        spans.push(Span::styled("│", self.theme.text_muted));
                    }
                    let mut content = cell.get(li).cloned().unwrap_or_default();
                    if header {
                        for s in &mut content {
                            s.style = s.style.add_modifier(Modifier::BOLD);
                        }
                    }
                    let align = aligns.get(ci).copied().unwrap_or(Alignment::Left);
                    spans.push(Span::raw(" "));
                    spans.extend(pad_cell(content, widths[ci], align));
                    spans.push(Span::raw(" "));
                }
                Line::from(spans)
            })
            .collect()
    }

    /// Greedy word wrap to `width` columns. Words wider than a row are split, at URL punctuation
    /// when the word is a URL.
    fn wrap(
        &self,
        first_prefix: &[Segment],
        rest_prefix: &[Segment],
        segments: &[Segment],
        width: usize,
    ) -> Vec<Line<'static>> {
        if width == 0 {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut row: Vec<Segment> = Vec::new();
        let mut prefix = first_prefix;
        let mut used = cols_of(prefix);

        for word in segments.iter().flat_map(split_words) {
            let word_cols = str_cols(&word.text);
            let blank = is_blank(&word.text);
            if row.is_empty() && blank {
                continue;
            }
            if used + word_cols <= width {
                used += word_cols;
                row.push(word);
                continue;
            }
            if !row.is_empty() {
                out.push(self.finish_row(prefix, &mut row));
                prefix = rest_prefix;
                used = cols_of(prefix);
                if blank {
                    continue;
                }
            }

            let mut rest = word;
            while !is_blank(&rest.text) {
                let rest_cols = str_cols(&rest.text);
                if used + rest_cols <= width {
                    used += rest_cols;
                    row.push(rest);
                    break;
                }
                let (head, tail) = split_word(&rest, width.saturating_sub(used).max(1));
                row.push(head);
                out.push(self.finish_row(prefix, &mut row));
                prefix = rest_prefix;
                used = cols_of(prefix);
                rest = tail;
            }
        }

        if !row.is_empty() || !prefix.is_empty() {
            out.push(self.finish_row(prefix, &mut row));
        }
        out
    }

    fn finish_row(&self, prefix: &[Segment], row: &mut Vec<Segment>) -> Line<'static> {
        while row.last().is_some_and(|s| is_blank(&s.text)) {
            row.pop();
        }
        let mut spans = self.spans(prefix);
        spans.extend(self.spans(row));
        row.clear();
        Line::from(spans)
    }

    fn spans(&self, segments: &[Segment]) -> Vec<Span<'static>> {
        segments
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(|s| Span::styled(s.text.clone(), self.style(s)))
            .collect()
    }

    fn style(&self, seg: &Segment) -> Style {
        let theme = self.theme;
        let mut style = match seg.style {
            _ if seg.muted => theme.text_muted,
            ProseStyle::Normal => theme.text_primary,
            ProseStyle::Heading(1) => theme.heading_top,
            ProseStyle::Heading(_) => theme.heading,
            ProseStyle::BlockQuote | ProseStyle::List => theme.text_muted,
        };
        if seg.inline_code {
            style = style.patch(theme.code_inline);
        }
        if seg.link {
            style = theme.accent.add_modifier(Modifier::UNDERLINED);
        }
        if seg.flags.emphasis {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if seg.flags.strong {
            style = style.add_modifier(Modifier::BOLD);
        }
        if seg.flags.strike {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        style
    }
}

/// Shrinks the widest column one cell at a time until the row fits `available`.
fn fit_columns(widths: &mut [usize], available: usize) {
    if widths.len() > available {
        let each = (available / widths.len()).max(1);
        widths.fill(each);
        return;
    }
    let mut total: usize = widths.iter().sum();
    while total > available {
        let Some(widest) = widths.iter_mut().filter(|w| **w > 1).max_by_key(|w| **w) else {
            break;
        };
        *widest -= 1;
        total -= 1;
    }
}

fn pad_cell(mut spans: Vec<Span<'static>>, width: usize, align: Alignment) -> Vec<Span<'static>> {
    let used: usize = spans.iter().map(|s| str_cols(s.content.as_ref())).sum();
    let pad = width.saturating_sub(used);
    let (left, right) = match align {
        Alignment::Right => (pad, 0),
        Alignment::Center => (pad / 2, pad - pad / 2),
        Alignment::Left | Alignment::None => (0, pad),
    };
    if left > 0 {
        spans.insert(0, Span::raw(" ".repeat(left)));
    }
    if right > 0 {
        spans.push(Span::raw(" ".repeat(right)));
    }
    spans
}

/// Alternating whitespace and non-whitespace runs of one segment.
fn split_words(seg: &Segment) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<bool> = None;
    for (i, ch) in seg.text.char_indices() {
        let ws = ch.is_whitespace();
        if prev.is_some_and(|p| p != ws) {
            out.push(seg.with_text(&seg.text[start..i]));
            start = i;
        }
        prev = Some(ws);
    }
    if start < seg.text.len() {
        out.push(seg.with_text(&seg.text[start..]));
    }
    out
}

fn split_word(seg: &Segment, max_cols: usize) -> (Segment, Segment) {
    let at = url_break(&seg.text, max_cols).unwrap_or_else(|| width_break(&seg.text, max_cols));
    let (head, tail) = seg.text.split_at(at);
    (seg.with_text(head), seg.with_text(tail))
}

/// Byte index just past the last URL punctuation that fits in `max_cols`. Never inside the scheme,
/// so the head still looks like a URL.
fn url_break(text: &str, max_cols: usize) -> Option<usize> {
    let bare = text.trim_start_matches('(');
    if !(bare.starts_with("https://") || bare.starts_with("http://")) {
        return None;
    }
    let mut cols = 0;
    let mut best = None;
    for (i, ch) in text.char_indices() {
        cols += char_cols(ch);
        if cols > max_cols {
            break;
        }
        if i > 8 && matches!(ch, '/' | '.' | '-' | '_' | '~' | '?' | '&' | '#' | '=') {
            best = Some(i + ch.len_utf8());
        }
    }
    best
}

/// Byte index of the longest prefix that fits in `max_cols`; at least one char so wrapping
/// always advances.
fn width_break(text: &str, max_cols: usize) -> usize {
    let mut cols = 0;
    let mut end = 0;
    for (i, ch) in text.char_indices() {
        cols += char_cols(ch);
        if cols > max_cols {
            break;
        }
        end = i + ch.len_utf8();
    }
    if end == 0 {
        text.chars().next().map_or(0, char::len_utf8)
    } else {
        end
    }
}

fn char_cols(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

fn str_cols(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

fn cols_of(segments: &[Segment]) -> usize {
    segments.iter().map(|s| str_cols(&s.text)).sum()
}

fn is_blank(s: &str) -> bool {
    s.chars().all(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use report_view_core::render::line_plain;

    fn plain(md: &str, width: u16) -> Vec<String> {
        MarkdownRenderer::new(width, StyleVariant::Dark)
            .render(md)
            .expect("render")
            .lines()
            .iter()
            .map(line_plain)
            .collect()
    }

    #[test]
    fn zero_width_is_an_error() {
        let err = MarkdownRenderer::new(0, StyleVariant::Dark).render("# x").unwrap_err();
        assert!(matches!(err, RenderError::ZeroWidth));
    }

    #[test]
    fn heading_text_survives_inline_markup() {
        let lines = plain("# Title\n\n## The **bold** `plan`\n\nbody\n", 40);
        assert_eq!(lines[0], "Title");
        assert!(lines.contains(&"The bold plan".to_string()));
    }

    #[test]
    fn wraps_prose_to_width() {
        let lines = plain("one two three four five six\n", 10);
        assert!(lines.iter().all(|l| UnicodeWidthStr::width(l.as_str()) <= 10));
        assert_eq!(lines.join(" "), "one two three four five six");
    }

    #[test]
    fn link_destinations_are_shown_in_parens() {
        let lines = plain("See [filing](https://sec.gov/filing/123).\n", 80);
        assert_eq!(lines[0], "See filing (https://sec.gov/filing/123).");
    }

    #[test]
    fn long_urls_break_after_url_punctuation() {
        let lines = plain("https://example.com/reports/quarterly/summary\n", 30);
        assert!(lines.len() >= 2);
        assert!(lines[0].starts_with("https://example.com/"));
        assert_eq!(lines.concat(), "https://example.com/reports/quarterly/summary");
    }

    #[test]
    fn lists_quotes_and_code_keep_their_prefixes() {
        let md = "- one\n- two\n\n> quoted\n\n```\ncode line\n```\n";
        let lines = plain(md, 40);
        assert_eq!(lines[0], "• one");
        assert_eq!(lines[1], "• two");
        assert!(lines.contains(&"│ quoted".to_string()));
        assert!(lines.contains(&"  code line".to_string()));
    }

    #[test]
    fn tables_render_rows_with_separator() {
        let md = "| A | B |\n|---|---|\n| 1 | 2 |\n";
        let lines = plain(md, 40);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains('┼'));
        assert!(lines[2].contains('1') && lines[2].contains('2'));
    }

    #[test]
    fn rendering_is_deterministic() {
        let md = "# A\n\n## B\n\ntext with [x](https://x.io)\n";
        assert_eq!(plain(md, 33), plain(md, 33));
    }
}
