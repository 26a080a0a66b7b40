//! Renders assistant replies (markdown) into styled, width-wrapped lines.

use crate::theme::UiPalette;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use std::borrow::Cow;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

#[derive(Debug, Clone, Copy)]
pub struct MarkdownStyles {
    pub base: Style,
    pub heading: [Style; 3],
    pub link_color: Color,
    pub inline_code: Style,
    pub prefix: Style,
    pub rule: Style,
    pub code_block_bg: Option<Color>,
    pub code_border: Style,
    pub code_header: Style,
}

impl MarkdownStyles {
    pub fn from_palette(ui: &UiPalette) -> Self {
        let base = Style::default().fg(ui.base_fg);
        Self {
            base,
            heading: [
                base.fg(ui.accent).add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                base.fg(ui.accent).add_modifier(Modifier::BOLD),
                base.add_modifier(Modifier::BOLD),
            ],
            link_color: ui.accent,
            inline_code: Style::default()
                .fg(ui.base_fg)
                .bg(ui.code_bg.unwrap_or(Color::Reset)),
            prefix: Style::default().fg(ui.muted),
            rule: Style::default().fg(ui.border),
            code_block_bg: ui.code_bg,
            code_border: Style::default().fg(ui.border),
            code_header: Style::default().fg(ui.muted).add_modifier(Modifier::ITALIC),
        }
    }
}

/// Holds the syntect state needed for fenced code.
pub struct MarkdownRenderer {
    syntax_set: SyntaxSet,
    theme: Theme,
    styles: MarkdownStyles,
    tab_width: usize,
}

impl MarkdownRenderer {
    pub fn new(theme: Theme, styles: MarkdownStyles, tab_width: usize) -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
            styles,
            tab_width,
        }
    }

    /// Plain status text, wrapped but not parsed.
    pub fn render_plain(&self, text: &str, style: Style, width: u16) -> Vec<Line<'static>> {
        let width = width.max(1) as usize;
        normalize_line_endings(text)
            .split('\n')
            .flat_map(|line| {
                let line = Line::from(Span::styled(expand_tabs(line, self.tab_width), style));
                wrap_line(&line, width)
            })
            .collect()
    }

    pub fn render(&self, input: &str, width: u16) -> Vec<Line<'static>> {
        let raw = self.parse(input);
        let width = width.max(1) as usize;
        let mut out = Vec::with_capacity(raw.len());
        for line in &raw {
            let wrapped = wrap_line(line, width);
            if wrapped.is_empty() {
                out.push(Line::from(""));
            } else {
                out.extend(wrapped);
            }
        }
        while out.last().is_some_and(|l| line_to_plain(l).trim().is_empty()) {
            out.pop();
        }
        out
    }

    fn parse(&self, input: &str) -> Vec<Line<'static>> {
        let styles = &self.styles;
        let tab_width = self.tab_width;
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let normalized = normalize_line_endings(input);
        let parser = Parser::new_ext(normalized.as_ref(), options);

        let mut raw_lines: Vec<Line<'static>> = Vec::new();
        let mut line = LineBuilder::new();
        let mut heading: Option<(u8, String)> = None;
        let mut code_block: Option<CodeBlock> = None;
        let mut list_stack: Vec<ListKind> = Vec::new();
        let mut pending_list_prefix: Option<String> = None;
        let mut blockquote_level: usize = 0;
        let mut style_state = StyleState::new(styles.base, styles.link_color);

        for event in parser {
            let prefix = current_prefix(blockquote_level, pending_list_prefix.as_deref());
            match event {
                Event::Start(tag) => match tag {
                    Tag::Paragraph => line.ensure_prefix(&prefix, styles.prefix),
                    Tag::Heading { level, .. } => {
                        flush_line(&mut line, &mut raw_lines);
                        heading = Some((level as u8, String::new()));
                    }
                    Tag::CodeBlock(kind) => {
                        flush_line(&mut line, &mut raw_lines);
                        code_block = Some(CodeBlock::new(kind));
                    }
                    Tag::List(start) => list_stack.push(ListKind::from(start)),
                    Tag::Item => {
                        flush_line(&mut line, &mut raw_lines);
                        pending_list_prefix = Some(list_prefix(&mut list_stack));
                        line.ensure_prefix(
                            &current_prefix(blockquote_level, pending_list_prefix.as_deref()),
                            styles.prefix,
                        );
                    }
                    Tag::Emphasis => style_state.italic += 1,
                    Tag::Strong => style_state.bold += 1,
                    Tag::Strikethrough => style_state.strike += 1,
                    Tag::BlockQuote => {
                        blockquote_level += 1;
                        line.ensure_prefix(
                            &current_prefix(blockquote_level, pending_list_prefix.as_deref()),
                            styles.prefix,
                        );
                    }
                    Tag::Link { .. } => style_state.underline += 1,
                    _ => {}
                },
                Event::End(tag) => match tag {
                    TagEnd::Paragraph => {
                        flush_line(&mut line, &mut raw_lines);
                        if list_stack.is_empty() {
                            push_blank_line(&mut raw_lines);
                        }
                    }
                    TagEnd::Heading(_) => {
                        if let Some((level, text)) = heading.take() {
                            let idx = usize::from(level.clamp(1, 3)) - 1;
                            raw_lines.push(Line::from(Span::styled(
                                text.trim().to_string(),
                                styles.heading[idx],
                            )));
                            push_blank_line(&mut raw_lines);
                        }
                    }
                    TagEnd::CodeBlock => {
                        if let Some(block) = code_block.take() {
                            self.render_code_block(&block, &mut raw_lines);
                            push_blank_line(&mut raw_lines);
                        }
                    }
                    TagEnd::List(_) => {
                        list_stack.pop();
                        flush_line(&mut line, &mut raw_lines);
                        if list_stack.is_empty() {
                            push_blank_line(&mut raw_lines);
                        }
                    }
                    TagEnd::Item => {
                        pending_list_prefix = None;
                        flush_line(&mut line, &mut raw_lines);
                    }
                    TagEnd::Emphasis => style_state.italic = style_state.italic.saturating_sub(1),
                    TagEnd::Strong => style_state.bold = style_state.bold.saturating_sub(1),
                    TagEnd::Strikethrough => {
                        style_state.strike = style_state.strike.saturating_sub(1)
                    }
                    TagEnd::BlockQuote => {
                        blockquote_level = blockquote_level.saturating_sub(1);
                        flush_line(&mut line, &mut raw_lines);
                    }
                    TagEnd::Link => {
                        style_state.underline = style_state.underline.saturating_sub(1)
                    }
                    _ => {}
                },
                Event::Text(text) => {
                    if let Some((_, h)) = heading.as_mut() {
                        h.push_str(&text);
                    } else if let Some(block) = code_block.as_mut() {
                        block.text.push_str(&text);
                    } else {
                        line.ensure_prefix(&prefix, styles.prefix);
                        line.push_text(&text, style_state.current_style(), tab_width);
                    }
                }
                Event::Code(text) => {
                    if let Some((_, h)) = heading.as_mut() {
                        h.push_str(&text);
                    } else {
                        line.ensure_prefix(&prefix, styles.prefix);
                        line.push_text(&text, styles.inline_code, tab_width);
                    }
                }
                Event::SoftBreak => {
                    line.ensure_prefix(&prefix, styles.prefix);
                    line.push_text(" ", style_state.current_style(), tab_width);
                }
                Event::HardBreak => flush_line(&mut line, &mut raw_lines),
                Event::Rule => {
                    flush_line(&mut line, &mut raw_lines);
                    raw_lines.push(Line::from(Span::styled("─".repeat(24), styles.rule)));
                    push_blank_line(&mut raw_lines);
                }
                Event::TaskListMarker(checked) => {
                    let marker = if checked { "[x] " } else { "[ ] " };
                    line.ensure_prefix(&prefix, styles.prefix);
                    line.push_text(marker, styles.prefix, tab_width);
                }
                _ => {}
            }
        }

        flush_line(&mut line, &mut raw_lines);
        raw_lines
    }

    fn render_code_block(&self, block: &CodeBlock, raw_lines: &mut Vec<Line<'static>>) {
        let styles = &self.styles;
        let syntax = resolve_code_syntax(&self.syntax_set, block.language.as_deref());
        let mut highlighter = HighlightLines::new(syntax, &self.theme);
        let label = block.language.as_deref().unwrap_or("code");

        raw_lines.push(Line::from(vec![
            Span::styled("┌─ ", styles.code_border),
            Span::styled(label.to_string(), styles.code_header),
        ]));

        for text_line in LinesWithEndings::from(&block.text) {
            let ranges = match highlighter.highlight_line(text_line, &self.syntax_set) {
                Ok(r) => r,
                Err(err) => {
                    tracing::debug!(%err, "code block highlight failed");
                    vec![(syntect::highlighting::Style::default(), text_line)]
                }
            };
            let mut spans = vec![Span::styled("│ ", styles.code_border)];
            for (style, text) in ranges {
                let text = text.trim_end_matches('\n');
                if text.is_empty() {
                    continue;
                }
                spans.push(Span::styled(
                    expand_tabs(text, self.tab_width),
                    syntect_to_ratatui(style, styles.code_block_bg),
                ));
            }
            raw_lines.push(Line::from(spans));
        }

        raw_lines.push(Line::from(Span::styled("└─", styles.code_border)));
    }
}

fn normalize_line_endings(input: &str) -> Cow<'_, str> {
    if input.contains('\r') {
        Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(input)
    }
}

fn resolve_code_syntax<'a>(
    syntax_set: &'a SyntaxSet,
    lang: Option<&str>,
) -> &'a syntect::parsing::SyntaxReference {
    let Some(lang) = lang.map(str::trim).filter(|l| !l.is_empty()) else {
        return syntax_set.find_syntax_plain_text();
    };
    let token = lang.strip_prefix("language-").unwrap_or(lang);
    syntax_set
        .find_syntax_by_token(token)
        .or_else(|| syntax_set.find_syntax_by_extension(token))
        .unwrap_or_else(|| syntax_set.find_syntax_plain_text())
}

fn syntect_to_ratatui(style: syntect::highlighting::Style, code_bg: Option<Color>) -> Style {
    let mut out = Style::default()
        .fg(Color::Rgb(style.foreground.r, style.foreground.g, style.foreground.b));
    if let Some(bg) = code_bg {
        out = out.bg(bg);
    }
    if style.font_style.contains(FontStyle::BOLD) {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        out = out.add_modifier(Modifier::UNDERLINED);
    }
    out
}

fn wrap_line(line: &Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return vec![line.clone()];
    }

    let tokens = tokenize_line(line);
    if tokens.is_empty() {
        return vec![Line::from("")];
    }

    let mut out: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0usize;

    let push_current = |current: &mut Vec<Span<'static>>, out: &mut Vec<Line<'static>>| {
        trim_trailing_ws(current);
        out.push(Line::from(current.drain(..).collect::<Vec<_>>()));
    };

    for token in tokens {
        let token_width = UnicodeWidthStr::width(token.text.as_str());
        if token.is_whitespace {
            if current.is_empty() && !out.is_empty() {
                continue;
            }
            if current_width + token_width > width {
                push_current(&mut current, &mut out);
                current_width = 0;
                continue;
            }
            current.push(Span::styled(token.text, token.style));
            current_width += token_width;
            continue;
        }

        if token_width <= width {
            if current_width + token_width > width && !current.is_empty() {
                push_current(&mut current, &mut out);
                current_width = 0;
            }
            current.push(Span::styled(token.text, token.style));
            current_width += token_width;
            continue;
        }

        if !current.is_empty() {
            push_current(&mut current, &mut out);
            current_width = 0;
        }
        let mut buf = String::new();
        let mut buf_width = 0usize;
        for ch in token.text.chars() {
            let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
            if buf_width + ch_width > width && !buf.is_empty() {
                out.push(Line::from(Span::styled(std::mem::take(&mut buf), token.style)));
                buf_width = 0;
            }
            buf.push(ch);
            buf_width += ch_width;
        }
        if !buf.is_empty() {
            current.push(Span::styled(buf, token.style));
            current_width = buf_width;
        }
    }

    if !current.is_empty() {
        push_current(&mut current, &mut out);
    }
    out
}

fn trim_trailing_ws(spans: &mut Vec<Span<'static>>) {
    while let Some(last) = spans.last_mut() {
        let trimmed = last.content.trim_end_matches(' ');
        if trimmed.len() == last.content.len() {
            break;
        }
        if trimmed.is_empty() {
            spans.pop();
            continue;
        }
        last.content = trimmed.to_string().into();
        break;
    }
}

fn tokenize_line(line: &Line<'static>) -> Vec<Token> {
    let mut tokens = Vec::new();
    for span in &line.spans {
        let text = span.content.as_ref();
        let mut buf = String::new();
        let mut current_ws: Option<bool> = None;
        for ch in text.chars() {
            let is_ws = ch.is_whitespace();
            if current_ws.is_some_and(|ws| ws != is_ws) {
                tokens.push(Token {
                    text: std::mem::take(&mut buf),
                    style: span.style,
                    is_whitespace: !is_ws,
                });
            }
            current_ws = Some(is_ws);
            buf.push(ch);
        }
        if !buf.is_empty() {
            tokens.push(Token {
                text: buf,
                style: span.style,
                is_whitespace: current_ws.unwrap_or(false),
            });
        }
    }
    tokens
}

pub fn line_to_plain(line: &Line<'_>) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

struct StyleState {
    base: Style,
    link_color: Color,
    bold: u8,
    italic: u8,
    strike: u8,
    underline: u8,
}

impl StyleState {
    fn new(base: Style, link_color: Color) -> Self {
        Self {
            base,
            link_color,
            bold: 0,
            italic: 0,
            strike: 0,
            underline: 0,
        }
    }

    fn current_style(&self) -> Style {
        let mut style = self.base;
        if self.underline > 0 {
            style = style
                .fg(self.link_color)
                .add_modifier(Modifier::UNDERLINED);
        }
        if self.bold > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.italic > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.strike > 0 {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        style
    }
}

struct LineBuilder {
    spans: Vec<Span<'static>>,
    empty: bool,
}

impl LineBuilder {
    fn new() -> Self {
        Self {
            spans: Vec::new(),
            empty: true,
        }
    }

    fn ensure_prefix(&mut self, prefix: &str, style: Style) {
        if self.empty && !prefix.is_empty() {
            self.spans.push(Span::styled(prefix.to_string(), style));
            self.empty = false;
        }
    }

    fn push_text(&mut self, text: &str, style: Style, tab_width: usize) {
        if text.is_empty() {
            return;
        }
        self.spans.push(Span::styled(expand_tabs(text, tab_width), style));
        self.empty = false;
    }

    fn take_line(&mut self) -> Option<Line<'static>> {
        if self.empty {
            return None;
        }
        self.empty = true;
        Some(Line::from(self.spans.drain(..).collect::<Vec<_>>()))
    }
}

fn flush_line(builder: &mut LineBuilder, raw_lines: &mut Vec<Line<'static>>) {
    if let Some(line) = builder.take_line() {
        raw_lines.push(line);
    }
}

fn push_blank_line(raw_lines: &mut Vec<Line<'static>>) {
    raw_lines.push(Line::from(""));
}

fn list_prefix(stack: &mut [ListKind]) -> String {
    let depth = stack.len().max(1);
    let indent = "  ".repeat(depth.saturating_sub(1));
    let prefix = match stack.last_mut() {
        Some(ListKind::Bullet) => format!("{} ", bullet_for_depth(depth)),
        Some(ListKind::Ordered { next }) => {
            let current = *next;
            *next = next.saturating_add(1);
            format!("{current}. ")
        }
        None => "- ".to_string(),
    };
    format!("{indent}{prefix}")
}

fn current_prefix(blockquote_level: usize, list_prefix: Option<&str>) -> String {
    let mut out = "│ ".repeat(blockquote_level);
    if let Some(prefix) = list_prefix {
        out.push_str(prefix);
    }
    out
}

fn expand_tabs(text: &str, tab_width: usize) -> String {
    if !text.contains('\t') {
        return text.to_string();
    }
    text.replace('\t', &" ".repeat(tab_width.max(1)))
}

struct CodeBlock {
    language: Option<String>,
    text: String,
}

impl CodeBlock {
    fn new(kind: CodeBlockKind) -> Self {
        let language = match kind {
            CodeBlockKind::Fenced(lang) => Some(lang.trim().to_string()).filter(|l| !l.is_empty()),
            CodeBlockKind::Indented => None,
        };
        Self {
            language,
            text: String::new(),
        }
    }
}

struct Token {
    text: String,
    style: Style,
    is_whitespace: bool,
}

#[derive(Clone, Copy)]
enum ListKind {
    Bullet,
    Ordered { next: u64 },
}

impl ListKind {
    fn from(start: Option<u64>) -> Self {
        match start {
            Some(num) => Self::Ordered { next: num },
            None => Self::Bullet,
        }
    }
}

fn bullet_for_depth(depth: usize) -> &'static str {
    match depth % 3 {
        1 => "•",
        2 => "◦",
        _ => "▪",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syntect::highlighting::ThemeSet;

    fn renderer() -> MarkdownRenderer {
        let themes = ThemeSet::load_defaults();
        let theme = themes.themes["base16-ocean.dark"].clone();
        MarkdownRenderer::new(theme, MarkdownStyles::from_palette(&UiPalette::editor()), 4)
    }

    fn plain(lines: &[Line<'static>]) -> Vec<String> {
        lines.iter().map(line_to_plain).collect()
    }

    #[test]
    fn paragraphs_and_lists() {
        let out = plain(&renderer().render("Intro text.\n\n- one\n- two\n\n1. first\n2. second", 40));
        assert_eq!(out[0], "Intro text.");
        assert!(out.contains(&"• one".to_string()));
        assert!(out.contains(&"• two".to_string()));
        assert!(out.contains(&"1. first".to_string()));
        assert!(out.contains(&"2. second".to_string()));
    }

    #[test]
    fn code_block_keeps_code_and_label() {
        let out = plain(&renderer().render("```python\ndef f():\n    return 1\n```", 40));
        assert_eq!(out[0], "┌─ python");
        assert_eq!(out[1], "│ def f():");
        assert_eq!(out[2], "│     return 1");
        assert_eq!(out[3], "└─");
    }

    #[test]
    fn emphasis_is_styled() {
        let lines = renderer().render("a **bold** word", 40);
        let bold = lines[0]
            .spans
            .iter()
            .find(|s| s.content.as_ref() == "bold")
            .expect("bold span");
        assert!(bold.style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn headings_and_quotes() {
        let out = plain(&renderer().render("# Title\n\n> quoted", 40));
        assert_eq!(out[0], "Title");
        assert!(out.contains(&"│ quoted".to_string()));
    }

    #[test]
    fn long_lines_wrap_to_width() {
        let text = "alpha beta gamma delta epsilon";
        let out = plain(&renderer().render(text, 12));
        assert!(out.len() > 1);
        assert!(out.iter().all(|l| UnicodeWidthStr::width(l.as_str()) <= 12));
        assert_eq!(out.join(" "), text);
    }

    #[test]
    fn very_long_word_is_split() {
        let line = Line::from("abcdefghij");
        let out = plain(&wrap_line(&line, 4));
        assert_eq!(out, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn plain_text_keeps_blank_lines() {
        let out = plain(&renderer().render_plain("Asking Gemini...\n\nok", Style::default(), 40));
        assert_eq!(out, vec!["Asking Gemini...", "", "ok"]);
    }

    #[test]
    fn normalize_line_endings_converts_crlf_and_cr() {
        assert_eq!(normalize_line_endings("a\r\nb\rc"), "a\nb\nc");
        assert!(matches!(normalize_line_endings("a\nb"), Cow::Borrowed(_)));
    }
}
