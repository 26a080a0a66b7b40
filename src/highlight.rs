//! Rule-table syntax highlighting.
//!
//! Each language owns an ordered list of categories. A category is a set of
//! regular expressions sharing one style. Lines are highlighted in isolation:
//! every pattern of every category is run over the line and paints its
//! matches, later categories painting over earlier ones.

use crate::theme::palette;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    C,
    Cpp,
    Markdown,
}

impl Language {
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())?;
        match ext.as_str() {
            "py" => Some(Self::Python),
            "js" | "jsx" | "ts" | "tsx" => Some(Self::JavaScript),
            "c" => Some(Self::C),
            "cpp" | "cc" | "cxx" | "c++" | "hpp" | "hxx" => Some(Self::Cpp),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Markdown => "markdown",
        }
    }
}

/// Uncompiled category description.
#[derive(Debug, Clone)]
pub struct Rule {
    pub category: &'static str,
    pub patterns: Vec<String>,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
}

impl Rule {
    fn new(category: &'static str, patterns: Vec<String>, color: Color) -> Self {
        Self {
            category,
            patterns,
            color,
            bold: false,
            italic: false,
        }
    }

    fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    fn style(&self) -> Style {
        let mut style = Style::default().fg(self.color);
        if self.bold {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.italic {
            style = style.add_modifier(Modifier::ITALIC);
        }
        style
    }
}

struct Category {
    name: &'static str,
    patterns: Vec<Regex>,
    style: Style,
}

pub struct Highlighter {
    tables: HashMap<Language, Vec<Category>>,
    language: Option<Language>,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<(Language, Vec<Rule>)>) -> Self {
        let tables = rules
            .into_iter()
            .map(|(lang, rules)| {
                let categories = rules.iter().map(compile_category).collect();
                (lang, categories)
            })
            .collect();
        Self {
            tables,
            language: None,
        }
    }

    pub fn set_document_language(&mut self, filename: &str) {
        self.language = Language::from_filename(filename);
    }

    pub fn language(&self) -> Option<Language> {
        self.language
    }

    /// Byte ranges of `line` with the category painted last over them.
    pub fn categorize(&self, line: &str) -> Vec<(std::ops::Range<usize>, &'static str, Style)> {
        let Some(categories) = self.language.and_then(|l| self.tables.get(&l)) else {
            return Vec::new();
        };
        if line.is_empty() {
            return Vec::new();
        }

        let mut painted: Vec<Option<usize>> = vec![None; line.len()];
        for (idx, category) in categories.iter().enumerate() {
            for pattern in &category.patterns {
                for m in pattern.find_iter(line) {
                    for slot in &mut painted[m.start()..m.end()] {
                        *slot = Some(idx);
                    }
                }
            }
        }

        let mut out = Vec::new();
        let mut start = 0usize;
        while start < painted.len() {
            let current = painted[start];
            let mut end = start + 1;
            while end < painted.len() && painted[end] == current {
                end += 1;
            }
            if let Some(idx) = current {
                let category = &categories[idx];
                out.push((start..end, category.name, category.style));
            }
            start = end;
        }
        out
    }

    #[cfg(test)]
    pub fn category_at(&self, line: &str, byte: usize) -> Option<&'static str> {
        self.categorize(line)
            .into_iter()
            .find(|(range, _, _)| range.contains(&byte))
            .map(|(_, name, _)| name)
    }

    pub fn highlight_line(&self, line: &str, base: Style) -> Line<'static> {
        let ranges = self.categorize(line);
        if ranges.is_empty() {
            return Line::from(Span::styled(line.to_string(), base));
        }
        let mut spans = Vec::with_capacity(ranges.len() * 2 + 1);
        let mut pos = 0usize;
        for (range, _, style) in ranges {
            // matches land on char boundaries, so these slices are safe
            if range.start > pos {
                spans.push(Span::styled(line[pos..range.start].to_string(), base));
            }
            spans.push(Span::styled(
                line[range.start..range.end].to_string(),
                base.patch(style),
            ));
            pos = range.end;
        }
        if pos < line.len() {
            spans.push(Span::styled(line[pos..].to_string(), base));
        }
        Line::from(spans)
    }
}

fn compile_category(rule: &Rule) -> Category {
    let mut patterns = Vec::with_capacity(rule.patterns.len());
    for source in &rule.patterns {
        match Regex::new(source) {
            Ok(re) => patterns.push(re),
            Err(err) => {
                tracing::warn!(category = rule.category, pattern = %source, %err, "skipping highlight rule");
            }
        }
    }
    Category {
        name: rule.category,
        patterns,
        style: rule.style(),
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter()
        .map(|w| format!(r"\b{}\b", regex::escape(w)))
        .collect()
}

fn patterns(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

const PYTHON_KEYWORDS: &[&str] = &[
    "and", "as", "assert", "break", "class", "continue", "def", "del", "elif", "else", "except",
    "False", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "None",
    "nonlocal", "not", "or", "pass", "raise", "return", "True", "try", "while", "with", "yield",
];

const JS_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "finally", "for", "function", "if", "import", "in", "instanceof",
    "new", "return", "super", "switch", "this", "throw", "try", "typeof", "var", "void", "while",
    "with", "yield",
];

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "int", "long", "register", "return", "short",
    "signed", "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned", "void",
    "volatile", "while",
];

const CPP_EXTRA_KEYWORDS: &[&str] = &[
    "alignas", "alignof", "and", "and_eq", "asm", "bitand", "bitor", "bool", "catch", "char8_t",
    "char16_t", "char32_t", "class", "compl", "concept", "consteval", "constexpr", "const_cast",
    "co_await", "co_return", "co_yield", "decltype", "delete", "dynamic_cast", "explicit",
    "export", "false", "friend", "inline", "mutable", "namespace", "new", "noexcept", "not",
    "not_eq", "nullptr", "operator", "or", "or_eq", "private", "protected", "public",
    "reinterpret_cast", "requires", "static_assert", "static_cast", "template", "this",
    "thread_local", "throw", "true", "try", "typeid", "typename", "using", "virtual", "wchar_t",
    "xor", "xor_eq",
];

const C_TYPES: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
];

const CPP_EXTRA_TYPES: &[&str] = &["bool", "wchar_t", "char8_t", "char16_t", "char32_t"];

const DOUBLE_QUOTED: &str = r#""[^"\\]*(\\.[^"\\]*)*""#;
const SINGLE_QUOTED: &str = r"'[^'\\]*(\\.[^'\\]*)*'";
const BACKTICK_QUOTED: &str = r"`[^`\\]*(\\.[^`\\]*)*`";
const NUMBER: &str = r"\b[0-9]+\b";
const LINE_COMMENT: &str = r"//.*";
const BLOCK_COMMENT: &str = r"/\*.*?\*/";

pub fn default_rules() -> Vec<(Language, Vec<Rule>)> {
    let python = vec![
        Rule::new("keywords", words(PYTHON_KEYWORDS), palette::SPECIAL).bold(),
        Rule::new("strings", patterns(&[DOUBLE_QUOTED, SINGLE_QUOTED]), palette::YELLOW),
        Rule::new("numbers", patterns(&[NUMBER]), palette::PURPLE),
        Rule::new("comments", patterns(&[r"#.*"]), palette::COMMENT),
    ];

    let javascript = vec![
        Rule::new("keywords", words(JS_KEYWORDS), palette::SPECIAL).bold(),
        Rule::new(
            "strings",
            patterns(&[DOUBLE_QUOTED, SINGLE_QUOTED, BACKTICK_QUOTED]),
            palette::YELLOW,
        ),
        Rule::new("numbers", patterns(&[NUMBER]), palette::PURPLE),
        Rule::new("comments", patterns(&[LINE_COMMENT, BLOCK_COMMENT]), palette::COMMENT),
    ];

    let c_family = |keywords: Vec<String>, types: Vec<String>| {
        vec![
            Rule::new("keywords", keywords, palette::SPECIAL).bold(),
            Rule::new("types", types, palette::BLUE),
            Rule::new("strings", patterns(&[DOUBLE_QUOTED]), palette::YELLOW),
            Rule::new("numbers", patterns(&[NUMBER]), palette::PURPLE),
            Rule::new("comments", patterns(&[LINE_COMMENT, BLOCK_COMMENT]), palette::COMMENT),
            Rule::new("preprocessor", patterns(&[r"#.*"]), palette::INFO),
        ]
    };

    let mut cpp_keywords: Vec<&str> = C_KEYWORDS.to_vec();
    for kw in CPP_EXTRA_KEYWORDS {
        if !cpp_keywords.contains(kw) {
            cpp_keywords.push(*kw);
        }
    }
    let mut cpp_types: Vec<&str> = C_TYPES.to_vec();
    cpp_types.extend_from_slice(CPP_EXTRA_TYPES);

    let markdown = vec![
        Rule::new("bold", patterns(&[r"\*\*.*?\*\*", r"__.*?__"]), palette::FG).bold(),
        Rule::new("italic", patterns(&[r"\*.*?\*", r"_.*?_"]), palette::FG).italic(),
        Rule::new("code", patterns(&[r"`.*?`"]), palette::YELLOW),
        Rule::new("links", patterns(&[r"\[.*?\]\(.*?\)"]), palette::BLUE),
    ];

    vec![
        (Language::Python, python),
        (Language::JavaScript, javascript),
        (Language::C, c_family(words(C_KEYWORDS), words(C_TYPES))),
        (Language::Cpp, c_family(words(&cpp_keywords), words(&cpp_types))),
        (Language::Markdown, markdown),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlighter_for(name: &str) -> Highlighter {
        let mut h = Highlighter::new();
        h.set_document_language(name);
        h
    }

    #[test]
    fn language_from_extension() {
        assert_eq!(Language::from_filename("main.py"), Some(Language::Python));
        assert_eq!(Language::from_filename("App.TSX"), Some(Language::JavaScript));
        assert_eq!(Language::from_filename("x.c"), Some(Language::C));
        assert_eq!(Language::from_filename("x.hpp"), Some(Language::Cpp));
        assert_eq!(Language::from_filename("README.markdown"), Some(Language::Markdown));
        assert_eq!(Language::from_filename("Makefile"), None);
        assert_eq!(Language::from_filename("notes.txt"), None);
    }

    #[test]
    fn python_keywords_get_a_stable_style() {
        let h = highlighter_for("a.py");
        let expected = Style::default()
            .fg(palette::SPECIAL)
            .add_modifier(Modifier::BOLD);
        for kw in PYTHON_KEYWORDS {
            let ranges = h.categorize(kw);
            assert_eq!(ranges.len(), 1, "keyword {kw}");
            assert_eq!(ranges[0].0, 0..kw.len());
            assert_eq!(ranges[0].1, "keywords");
            assert_eq!(ranges[0].2, expected);
        }
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let h = highlighter_for("a.py");
        assert_eq!(h.category_at("print(x)", 2), None);
        assert_eq!(h.category_at("x in y", 2), Some("keywords"));
    }

    #[test]
    fn comments_paint_over_earlier_categories() {
        let h = highlighter_for("a.py");
        let line = "x = 1  # return \"s\" 42";
        let hash = line.find('#').unwrap();
        assert_eq!(h.category_at(line, hash + 3), Some("comments"));
        assert_eq!(h.category_at(line, line.len() - 1), Some("comments"));
        assert_eq!(h.category_at(line, 4), Some("numbers"));
    }

    #[test]
    fn strings_handle_escapes() {
        let h = highlighter_for("a.js");
        let line = r#"let s = "a\"b"; let t = `x`;"#;
        let start = line.find('"').unwrap();
        assert_eq!(h.category_at(line, start + 3), Some("strings"));
        let tick = line.find('`').unwrap();
        assert_eq!(h.category_at(line, tick + 1), Some("strings"));
    }

    #[test]
    fn c_preprocessor_and_types() {
        let h = highlighter_for("main.c");
        assert_eq!(h.category_at("#include <stdio.h>", 3), Some("preprocessor"));
        // types come after keywords, so `int` ends up painted as a type
        assert_eq!(h.category_at("int main() {", 0), Some("types"));
        assert_eq!(h.category_at("    return 0;", 5), Some("keywords"));
    }

    #[test]
    fn cpp_has_extra_keywords() {
        let h = highlighter_for("main.cpp");
        assert_eq!(h.category_at("namespace foo", 0), Some("keywords"));
        let c = highlighter_for("main.c");
        assert_eq!(c.category_at("namespace foo", 0), None);
    }

    #[test]
    fn markdown_rules() {
        let h = highlighter_for("README.md");
        let line = "see `code` and [link](http://x)";
        assert_eq!(h.category_at(line, 5), Some("code"));
        assert_eq!(h.category_at(line, line.len() - 2), Some("links"));
    }

    #[test]
    fn unknown_language_is_plain() {
        let h = highlighter_for("notes.txt");
        assert!(h.categorize("if x return 1").is_empty());
        let line = h.highlight_line("if x", Style::default());
        assert_eq!(line.spans.len(), 1);
    }

    #[test]
    fn bad_pattern_is_skipped_but_category_survives() {
        let rules = vec![(
            Language::Python,
            vec![Rule::new(
                "keywords",
                vec!["(unclosed".to_string(), r"\bdef\b".to_string()],
                palette::SPECIAL,
            )],
        )];
        let mut h = Highlighter::with_rules(rules);
        h.set_document_language("x.py");
        assert_eq!(h.category_at("def f():", 0), Some("keywords"));
    }

    #[test]
    fn highlight_line_preserves_text() {
        let h = highlighter_for("a.py");
        let text = "def greet(name):  # hi ü";
        let line = h.highlight_line(text, Style::default());
        let joined: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(joined, text);
    }
}
