//! Per-line markers shown in the gutter: a heuristic lint pass and a scraper
//! for compiler/interpreter output.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn glyph(self) -> &'static str {
        match self {
            Severity::Error => "✗",
            Severity::Warning => "⚠",
            Severity::Info => "ℹ",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
        }
    }
}

/// Markers keyed by 1-based line number, one map per severity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    errors: BTreeMap<usize, String>,
    warnings: BTreeMap<usize, String>,
    info: BTreeMap<usize, String>,
}

impl Diagnostics {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.info.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.warnings.clear();
        self.info.clear();
    }

    pub fn push(&mut self, severity: Severity, line: usize, message: impl Into<String>) {
        self.map_mut(severity).insert(line, message.into());
    }

    pub fn lines(&self, severity: Severity) -> Vec<usize> {
        self.map(severity).keys().copied().collect()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.map(severity).len()
    }

    /// The marker painted in the gutter: errors beat warnings beat info.
    pub fn marker(&self, line: usize) -> Option<Severity> {
        [Severity::Error, Severity::Warning, Severity::Info]
            .into_iter()
            .find(|sev| self.map(*sev).contains_key(&line))
    }

    pub fn tooltip(&self, line: usize) -> Option<String> {
        let severity = self.marker(line)?;
        let message = self.map(severity).get(&line)?;
        Some(format!("{}: {message}", severity.label()))
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("Linting complete:\n");
        let _ = writeln!(out, "Errors: {}", self.count(Severity::Error));
        let _ = writeln!(out, "Warnings: {}", self.count(Severity::Warning));
        let _ = writeln!(out, "Info: {}", self.count(Severity::Info));
        out.push('\n');
        for (label, severity) in [
            ("Errors", Severity::Error),
            ("Warnings", Severity::Warning),
            ("Info", Severity::Info),
        ] {
            let lines: Vec<String> = self.lines(severity).iter().map(|l| l.to_string()).collect();
            if lines.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{label} on lines: {}", lines.join(", "));
        }
        out
    }

    fn map(&self, severity: Severity) -> &BTreeMap<usize, String> {
        match severity {
            Severity::Error => &self.errors,
            Severity::Warning => &self.warnings,
            Severity::Info => &self.info,
        }
    }

    fn map_mut(&mut self, severity: Severity) -> &mut BTreeMap<usize, String> {
        match severity {
            Severity::Error => &mut self.errors,
            Severity::Warning => &mut self.warnings,
            Severity::Info => &mut self.info,
        }
    }
}

/// Heuristic style checks over the buffer text.
pub fn lint(text: &str) -> Diagnostics {
    let mut out = Diagnostics::default();
    let lines: Vec<&str> = text.split('\n').collect();

    for (idx, line) in lines.iter().enumerate() {
        let number = idx + 1;
        if line.contains("import") && !line.contains("from") && !line.contains("import os") {
            out.push(
                Severity::Warning,
                number,
                "Consider using 'from module import name' instead of 'import module'",
            );
        }
        if line.contains("print(") && !line.contains("f\"") && !line.contains('\'') {
            out.push(
                Severity::Info,
                number,
                "Consider using f-strings for better readability",
            );
        }
        if line.contains("TODO") || line.contains("FIXME") {
            out.push(Severity::Error, number, "TODO or FIXME found");
        }
        if line.contains("    ") && !line.trim().starts_with('#') {
            let opens_block = idx > 0 && lines[idx - 1].trim().ends_with(':');
            if idx > 0 && !opens_block {
                out.push(Severity::Warning, number, "Potential indentation issue");
            }
        }
    }
    out
}

fn error_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"File ".*", line (\d+): (.*)"#,
            r#"File ".*", line (\d+), (.*)"#,
            r".*\.py:(\d+): (.*)",
            r".*\.js:(\d+): (.*)",
            r".*\.java:(\d+): (.*)",
            r".*\.c:(\d+): (.*)",
            r".*\.cpp:(\d+): (.*)",
            r"line (\d+): (.*)",
            r"Line (\d+): (.*)",
            r".*\.(?:c|cc|cpp|h|hpp|java|js|py):(\d+):\d+: (.*)",
        ]
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(pattern = %p, %err, "invalid error pattern");
                None
            }
        })
        .collect()
    })
}

/// Scrapes `line -> message` pairs out of compiler or interpreter stderr.
pub fn parse_error_lines(output: &str) -> BTreeMap<usize, String> {
    let mut found = BTreeMap::new();
    for line in output.lines() {
        for pattern in error_patterns() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let (Some(number), Some(message)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if let Ok(number) = number.as_str().parse::<usize>() {
                found.insert(number, message.as_str().to_string());
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "import sys\nfrom os import path\nprint(x)\n# TODO: tidy\ndef f():\n    return 1\nx = 1\n    y = 2";

    #[test]
    fn lint_assigns_categories_per_line() {
        let d = lint(SAMPLE);
        assert_eq!(d.lines(Severity::Warning), vec![1, 8]);
        assert_eq!(d.lines(Severity::Info), vec![3]);
        assert_eq!(d.lines(Severity::Error), vec![4]);
    }

    #[test]
    fn lint_is_deterministic() {
        assert_eq!(lint(SAMPLE), lint(SAMPLE));
    }

    #[test]
    fn lint_exemptions() {
        let d = lint("import os\nprint(f\"{x}\")\nprint('x')\n    # indented comment");
        assert!(d.is_empty());
    }

    #[test]
    fn indentation_after_colon_is_fine() {
        let d = lint("if x:\n    y()");
        assert_eq!(d.count(Severity::Warning), 0);
    }

    #[test]
    fn first_line_indentation_is_not_flagged() {
        let d = lint("    x = 1");
        assert_eq!(d.count(Severity::Warning), 0);
    }

    #[test]
    fn later_warning_replaces_message_on_same_line() {
        let d = lint("x = 1\n    import sys");
        assert_eq!(d.count(Severity::Warning), 1);
        assert_eq!(
            d.tooltip(2).as_deref(),
            Some("Warning: Potential indentation issue")
        );
    }

    #[test]
    fn marker_precedence() {
        let mut d = Diagnostics::default();
        d.push(Severity::Info, 3, "i");
        d.push(Severity::Warning, 3, "w");
        assert_eq!(d.marker(3), Some(Severity::Warning));
        d.push(Severity::Error, 3, "e");
        assert_eq!(d.marker(3), Some(Severity::Error));
        assert_eq!(d.tooltip(3).as_deref(), Some("Error: e"));
        assert_eq!(d.marker(4), None);
        assert_eq!(Severity::Error.glyph(), "✗");
    }

    #[test]
    fn summary_lists_lines() {
        let summary = lint(SAMPLE).summary();
        assert!(summary.starts_with("Linting complete:\nErrors: 1\nWarnings: 2\nInfo: 1\n\n"));
        assert!(summary.contains("Errors on lines: 4\n"));
        assert!(summary.contains("Warnings on lines: 1, 8\n"));
        assert!(summary.contains("Info on lines: 3\n"));
    }

    #[test]
    fn parses_python_traceback() {
        let out = "Traceback (most recent call last):\n  File \"/tmp/x/main.py\", line 3: in <module>\nNameError: name 'y' is not defined";
        let found = parse_error_lines(out);
        assert_eq!(found.get(&3).map(String::as_str), Some("in <module>"));
    }

    #[test]
    fn parses_real_traceback_frame() {
        let out = "  File \"/tmp/x/main.py\", line 2, in <module>";
        let found = parse_error_lines(out);
        assert_eq!(found.get(&2).map(String::as_str), Some("in <module>"));
    }

    #[test]
    fn parses_gcc_output() {
        let out = "/tmp/vimai-1/testing.c:4:5: error: expected ';' before 'return'";
        let found = parse_error_lines(out);
        assert_eq!(
            found.get(&4).map(String::as_str),
            Some("error: expected ';' before 'return'")
        );
    }

    #[test]
    fn parses_javac_output() {
        let out = "Main.java:7: error: cannot find symbol\n1 error";
        let found = parse_error_lines(out);
        assert_eq!(found.len(), 1);
        assert!(found[&7].contains("cannot find symbol"));
    }

    #[test]
    fn ignores_unrelated_output() {
        assert!(parse_error_lines("Hello, C World!\nall good").is_empty());
    }
}
