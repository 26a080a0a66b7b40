use crate::ai::{self, AiEvent, AiService, GeminiClient};
use crate::config::Config;
use crate::diagnostics::{self, Diagnostics, Severity};
use crate::editor::{Action, Command, Editor, Mode};
use crate::highlight::Highlighter;
use crate::markdown::{MarkdownRenderer, MarkdownStyles};
use crate::runner::{self, RunEvent, Toolchain};
use crate::theme::{palette, ThemeManager, UiPalette};
use crate::vfs::{NodeId, VirtualFs};
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, ExecutableCommand};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, List, ListItem, ListState, Paragraph};
use ratatui::Terminal;
use std::collections::HashSet;
use std::io::{self, Stdout};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthChar;

pub fn run_app(config: Config, open: Option<String>) -> Result<()> {
    let theme_manager = ThemeManager::load(&config)?;
    let mut app = App::new(config, &theme_manager)?;
    if let Some(name) = open {
        app.open_by_name(&name);
    }

    let mut terminal = setup_terminal()?;
    let _guard = TerminalGuard;

    let tick_rate = Duration::from_millis(50);

    loop {
        let size = terminal.size()?;
        let layout = app.layout(size);
        app.ensure_cursor_visible(layout.editor_height);

        terminal.draw(|f| ui(f, &mut app, &layout))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && app.handle_key(key, layout.assistant_height) {
                    break;
                }
            }
        }

        app.tick(Instant::now());
    }

    tracing::info!("exiting");
    Ok(())
}

struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = stdout.execute(LeaveAlternateScreen);
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Fires once after a quiet period.
#[derive(Default)]
struct Debounce {
    pending: bool,
    deadline: Option<Instant>,
}

impl Debounce {
    fn schedule(&mut self, now: Instant, delay: Duration) {
        self.pending = true;
        self.deadline = Some(now + delay);
    }

    fn take_due(&mut self, now: Instant) -> bool {
        if !self.pending {
            return false;
        }
        if self.deadline.is_some_and(|deadline| now < deadline) {
            return false;
        }
        self.pending = false;
        self.deadline = None;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Editor,
    Tree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TreePrompt {
    NewFile(String),
    NewDir(String),
    Rename(String),
    ConfirmDelete,
}

impl TreePrompt {
    fn label(&self) -> String {
        match self {
            TreePrompt::NewFile(buf) => format!("New file: {buf}"),
            TreePrompt::NewDir(buf) => format!("New folder: {buf}"),
            TreePrompt::Rename(buf) => format!("Rename to: {buf}"),
            TreePrompt::ConfirmDelete => "Delete? (y/n)".to_string(),
        }
    }

    fn buffer_mut(&mut self) -> Option<&mut String> {
        match self {
            TreePrompt::NewFile(buf) | TreePrompt::NewDir(buf) | TreePrompt::Rename(buf) => Some(buf),
            TreePrompt::ConfirmDelete => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PanelEntry {
    Note(String),
    Reply(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermKind {
    Output,
    Error,
    Info,
}

struct LayoutInfo {
    tree: Option<Rect>,
    editor: Rect,
    assistant: Rect,
    terminal: Rect,
    status: Rect,
    editor_height: u16,
    assistant_width: u16,
    assistant_height: u16,
}

const MAX_TERMINAL_LINES: usize = 2000;

struct App {
    config: Config,
    ui: UiPalette,
    base_style: Style,
    vfs: VirtualFs,
    expanded: HashSet<NodeId>,
    current: Option<NodeId>,
    editor: Editor,
    highlighter: Highlighter,
    diagnostics: Diagnostics,
    renderer: MarkdownRenderer,
    ai: AiService,
    tools: Toolchain,
    job: Option<Receiver<RunEvent>>,
    panel: Vec<PanelEntry>,
    panel_scroll: usize,
    terminal_lines: Vec<(TermKind, String)>,
    focus: Focus,
    tree_selected: usize,
    prompt: Option<TreePrompt>,
    status: Option<String>,
    edit_scroll: usize,
    lint: Debounce,
    last_revision: u64,
    last_autosave: Instant,
}

impl App {
    fn new(config: Config, theme_manager: &ThemeManager) -> Result<Self> {
        let theme = theme_manager
            .get(&config.theme)
            .cloned()
            .context("No syntax themes available")?;
        let ui = UiPalette::editor();
        let base_style = Style::default().fg(ui.base_fg).bg(ui.base_bg.unwrap_or(palette::BG));
        let mut styles = MarkdownStyles::from_palette(&ui);
        if let Some(bg) = theme_manager.code_bg(&config.theme) {
            styles.code_block_bg = Some(bg);
        }
        let renderer = MarkdownRenderer::new(theme, styles, config.tab_width);
        let ai = AiService::new(GeminiClient::from_config(&config));
        let tools = Toolchain::from_config(&config);

        let vfs = VirtualFs::seeded();
        let mut expanded = HashSet::new();
        expanded.insert(vfs.root());
        let editor = Editor::new(config.tab_width);
        let last_revision = editor.revision();

        let greeting = if ai.is_connected() {
            "Gemini is ready. Try :ai, :fix, :explain, :opt or :test.".to_string()
        } else {
            format!("Gemini AI not available (set {})", config.ai_api_key_env)
        };

        Ok(Self {
            config,
            ui,
            base_style,
            vfs,
            expanded,
            current: None,
            editor,
            highlighter: Highlighter::new(),
            diagnostics: Diagnostics::default(),
            renderer,
            ai,
            tools,
            job: None,
            panel: vec![PanelEntry::Note(greeting)],
            panel_scroll: 0,
            terminal_lines: Vec::new(),
            focus: Focus::Editor,
            tree_selected: 0,
            prompt: None,
            status: None,
            edit_scroll: 0,
            lint: Debounce::default(),
            last_revision,
            last_autosave: Instant::now(),
        })
    }

    fn layout(&self, size: Rect) -> LayoutInfo {
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(self.config.terminal_height),
                Constraint::Length(1),
            ])
            .split(size);
        let main = vertical[0];
        let terminal = vertical[1];
        let status = vertical[2];

        let tree_width = if self.config.show_tree {
            self.config.tree_width.min(main.width.saturating_sub(40))
        } else {
            0
        };
        let assistant_width = self
            .config
            .ai_panel_width
            .min(main.width.saturating_sub(tree_width).saturating_sub(20));
        let horiz = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(tree_width),
                Constraint::Min(20),
                Constraint::Length(assistant_width),
            ])
            .split(main);

        let tree = (tree_width > 0).then_some(horiz[0]);
        let editor = horiz[1];
        let assistant = horiz[2];

        LayoutInfo {
            tree,
            editor,
            assistant,
            terminal,
            status,
            editor_height: editor.height.saturating_sub(2).max(1),
            assistant_width: assistant.width.saturating_sub(2).max(1),
            assistant_height: assistant.height.saturating_sub(2).max(1),
        }
    }

    fn current_name(&self) -> Option<String> {
        self.current
            .and_then(|id| self.vfs.name(id))
            .map(str::to_string)
    }

    fn set_panel(&mut self, entry: PanelEntry) {
        self.panel.clear();
        self.panel.push(entry);
        self.panel_scroll = 0;
    }

    fn append_panel(&mut self, entry: PanelEntry) {
        self.panel.push(entry);
    }

    fn note(&mut self, text: impl Into<String>) {
        self.set_panel(PanelEntry::Note(text.into()));
    }

    fn term(&mut self, kind: TermKind, text: impl Into<String>) {
        self.terminal_lines.push((kind, text.into()));
        if self.terminal_lines.len() > MAX_TERMINAL_LINES {
            let excess = self.terminal_lines.len() - MAX_TERMINAL_LINES;
            self.terminal_lines.drain(..excess);
        }
    }

    fn open_node(&mut self, id: NodeId) {
        let Ok(content) = self.vfs.content(id).map(str::to_string) else {
            return;
        };
        if self.current != Some(id) && self.editor.is_dirty() {
            self.commit_buffer();
        }
        let name = self.vfs.name(id).unwrap_or_default().to_string();
        self.editor.load(&content);
        self.last_revision = self.editor.revision();
        self.current = Some(id);
        self.highlighter.set_document_language(&name);
        self.diagnostics.clear();
        self.lint = Debounce::default();
        self.edit_scroll = 0;
        self.reveal(id);
        tracing::info!(file = %self.vfs.path(id), "opened");
    }

    fn open_by_name(&mut self, name: &str) {
        match self.vfs.find_file(name) {
            Some(id) => self.open_node(id),
            None => self.note(format!("File not found: {name}")),
        }
    }

    /// Expands every ancestor of `id` so it shows up in the tree.
    fn reveal(&mut self, id: NodeId) {
        let mut cursor = self.vfs.parent(id);
        while let Some(dir) = cursor {
            self.expanded.insert(dir);
            cursor = self.vfs.parent(dir);
        }
        let rows = self.vfs.visible_rows(&self.expanded);
        if let Some(pos) = rows.iter().position(|r| r.id == id) {
            self.tree_selected = pos;
        }
    }

    /// Writes the buffer into its tree node. Returns the file name on success.
    fn commit_buffer(&mut self) -> Option<String> {
        let id = self.current?;
        let text = self.editor.text();
        match self.vfs.set_content(id, &text) {
            Ok(()) => {
                self.editor.mark_saved();
                self.vfs.name(id).map(str::to_string)
            }
            Err(err) => {
                tracing::warn!(%err, "save failed");
                self.status = Some(format!("Save failed: {err}"));
                None
            }
        }
    }

    fn save_current(&mut self) {
        if self.current.is_none() {
            self.status = Some("No file open".to_string());
            return;
        }
        if let Some(name) = self.commit_buffer() {
            self.note(format!("Saved {name}"));
        }
    }

    fn handle_key(&mut self, key: KeyEvent, panel_height: u16) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && key.code == KeyCode::Char('e') && self.prompt.is_none() && self.editor.mode() != Mode::Command {
            self.focus = match self.focus {
                Focus::Editor => Focus::Tree,
                Focus::Tree => Focus::Editor,
            };
            return false;
        }

        if self.focus == Focus::Tree {
            self.handle_tree_key(key);
            return false;
        }

        if self.editor.mode() == Mode::Normal {
            let page = usize::from(panel_height.max(1));
            match key.code {
                KeyCode::PageDown => {
                    self.panel_scroll = self.panel_scroll.saturating_add(page);
                    return false;
                }
                KeyCode::PageUp => {
                    self.panel_scroll = self.panel_scroll.saturating_sub(page);
                    return false;
                }
                _ => {}
            }
        }

        self.status = None;
        let quit = match self.editor.handle_key(key) {
            Action::None => false,
            Action::Save => {
                self.save_current();
                false
            }
            Action::Complete => {
                self.request_completion();
                false
            }
            Action::Command(cmd) => self.execute_command(cmd),
        };
        self.after_edit(Instant::now());
        quit
    }

    fn after_edit(&mut self, now: Instant) {
        let revision = self.editor.revision();
        if revision != self.last_revision {
            self.last_revision = revision;
            if self.current.is_some() {
                self.lint
                    .schedule(now, Duration::from_millis(self.config.auto_lint_ms));
            }
        }
    }

    fn execute_command(&mut self, command: Command) -> bool {
        tracing::debug!(?command, "command");
        match command {
            Command::Write => self.save_current(),
            Command::WriteQuit => {
                self.save_current();
                return true;
            }
            Command::Quit => return true,
            Command::Edit(name) => self.open_by_name(&name),
            Command::Ai(prompt) => {
                let context = self.editor.text();
                self.ask(&prompt, &context);
            }
            Command::Fix => {
                let context = self.editor.text();
                self.ask(ai::FIX_PROMPT, &context);
            }
            Command::Explain => {
                let context = self.editor.current_line();
                self.ask(ai::EXPLAIN_PROMPT, &context);
            }
            Command::Optimize => {
                let context = self.editor.text();
                self.ask(ai::OPTIMIZE_PROMPT, &context);
            }
            Command::Test => {
                let context = self.editor.text();
                self.ask(ai::TEST_PROMPT, &context);
            }
            Command::Run => self.run_current(),
            Command::Lint => self.lint_current(true),
            Command::NewFile(name) => {
                let dir = self.command_target_dir();
                self.create_file(dir, &name);
            }
            Command::NewDir(name) => {
                let dir = self.command_target_dir();
                self.create_dir(dir, &name);
            }
            Command::Rename(name) => match self.current {
                Some(id) => self.rename_node(id, &name),
                None => self.status = Some("No file open".to_string()),
            },
            Command::Remove => match self.current {
                Some(id) => self.remove_node(id),
                None => self.status = Some("No file open".to_string()),
            },
            Command::Shell(line) => self.run_shell(&line),
            Command::ClearTerminal => self.terminal_lines.clear(),
            Command::Unknown(text) => self.note(format!("Unknown command: {text}")),
        }
        false
    }

    fn ask(&mut self, prompt: &str, context: &str) {
        match self.ai.ask(prompt, context) {
            Ok(()) => self.note("Asking Gemini..."),
            Err(err) => self.note(ai::failure_text(&err)),
        }
    }

    fn request_completion(&mut self) {
        let context = self.editor.context_before_cursor();
        match self.ai.complete(&context) {
            Ok(true) => self.status = Some("Asking Gemini for suggestions...".to_string()),
            Ok(false) => {}
            Err(err) => self.status = Some(ai::failure_text(&err)),
        }
    }

    fn lint_current(&mut self, announce: bool) {
        if self.current.is_none() {
            if announce {
                self.note("No file open to lint");
            }
            return;
        }
        self.diagnostics = diagnostics::lint(&self.editor.text());
        if announce {
            let summary = self.diagnostics.summary();
            self.note(summary);
        }
    }

    fn run_current(&mut self) {
        if self.job.is_some() {
            self.term(TermKind::Error, "A process is already running");
            return;
        }
        let Some(name) = self.current_name() else {
            self.term(TermKind::Error, "No file open to run");
            return;
        };
        self.commit_buffer();
        self.diagnostics.clear();
        self.terminal_lines.clear();
        self.term(TermKind::Info, format!("Running {name}..."));
        match runner::spawn_file(&name, &self.editor.text(), &self.tools) {
            Ok(rx) => self.job = Some(rx),
            Err(err) => self.term(TermKind::Error, format!("Error: {err}")),
        }
    }

    fn run_shell(&mut self, line: &str) {
        if self.job.is_some() {
            self.term(TermKind::Error, "A process is already running");
            return;
        }
        self.term(TermKind::Info, format!("$ {line}"));
        match runner::spawn_shell(line, None) {
            Ok(rx) => self.job = Some(rx),
            Err(err) => self.term(TermKind::Error, format!("Error: {err}")),
        }
    }

    fn command_target_dir(&self) -> NodeId {
        self.current
            .map(|id| self.vfs.containing_dir(id))
            .unwrap_or_else(|| self.vfs.root())
    }

    fn create_file(&mut self, dir: NodeId, name: &str) {
        match self.vfs.add_file(dir, name, "") {
            Ok(id) => {
                self.expanded.insert(dir);
                self.open_node(id);
                self.status = Some(format!("Created {}", self.vfs.path(id)));
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn create_dir(&mut self, dir: NodeId, name: &str) {
        match self.vfs.add_directory(dir, name) {
            Ok(id) => {
                self.expanded.insert(dir);
                self.expanded.insert(id);
                self.status = Some(format!("Created {}", self.vfs.path(id)));
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn rename_node(&mut self, id: NodeId, name: &str) {
        match self.vfs.rename(id, name) {
            Ok(()) => {
                if self.current == Some(id) {
                    self.highlighter.set_document_language(name.trim());
                }
                self.status = Some(format!("Renamed to {}", self.vfs.path(id)));
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn remove_node(&mut self, id: NodeId) {
        let path = self.vfs.path(id);
        match self.vfs.remove(id) {
            Ok(()) => {
                if self.current.is_some_and(|cur| !self.vfs.contains(cur)) {
                    self.current = None;
                    self.editor.clear();
                    self.last_revision = self.editor.revision();
                    self.diagnostics.clear();
                    self.lint = Debounce::default();
                }
                self.expanded.retain(|dir| self.vfs.contains(*dir));
                let rows = self.vfs.visible_rows(&self.expanded).len();
                self.tree_selected = self.tree_selected.min(rows.saturating_sub(1));
                self.status = Some(format!("Deleted {path}"));
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn handle_tree_key(&mut self, key: KeyEvent) {
        if let Some(prompt) = self.prompt.take() {
            self.handle_prompt_key(prompt, key);
            return;
        }

        let rows = self.vfs.visible_rows(&self.expanded);
        let selected = rows.get(self.tree_selected).cloned();
        match key.code {
            KeyCode::Esc => self.focus = Focus::Editor,
            KeyCode::Char('j') | KeyCode::Down => {
                if self.tree_selected + 1 < rows.len() {
                    self.tree_selected += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.tree_selected = self.tree_selected.saturating_sub(1);
            }
            KeyCode::Enter => {
                let Some(row) = selected else {
                    return;
                };
                if row.is_dir {
                    if !self.expanded.remove(&row.id) {
                        self.expanded.insert(row.id);
                    }
                } else {
                    self.open_node(row.id);
                    self.focus = Focus::Editor;
                }
            }
            KeyCode::Char('n') => self.prompt = Some(TreePrompt::NewFile(String::new())),
            KeyCode::Char('N') => self.prompt = Some(TreePrompt::NewDir(String::new())),
            KeyCode::Char('r') => {
                if let Some(row) = selected {
                    self.prompt = Some(TreePrompt::Rename(row.name));
                }
            }
            KeyCode::Char('d') => {
                if selected.is_some() {
                    self.prompt = Some(TreePrompt::ConfirmDelete);
                }
            }
            _ => {}
        }
    }

    fn selected_node(&self) -> Option<NodeId> {
        self.vfs
            .visible_rows(&self.expanded)
            .get(self.tree_selected)
            .map(|row| row.id)
    }

    fn selected_dir(&self) -> NodeId {
        match self.selected_node() {
            Some(id) if self.vfs.is_dir(id) => id,
            Some(id) => self.vfs.containing_dir(id),
            None => self.vfs.root(),
        }
    }

    fn handle_prompt_key(&mut self, mut prompt: TreePrompt, key: KeyEvent) {
        if prompt == TreePrompt::ConfirmDelete {
            if key.code == KeyCode::Char('y') {
                if let Some(id) = self.selected_node() {
                    self.remove_node(id);
                }
            } else {
                self.status = Some("Delete cancelled".to_string());
            }
            return;
        }

        match key.code {
            KeyCode::Esc => {}
            KeyCode::Enter => {
                let dir = self.selected_dir();
                match prompt {
                    TreePrompt::NewFile(name) => {
                        self.create_file(dir, &name);
                        if self.current.is_some_and(|id| self.vfs.name(id) == Some(name.trim())) {
                            self.focus = Focus::Editor;
                        }
                    }
                    TreePrompt::NewDir(name) => self.create_dir(dir, &name),
                    TreePrompt::Rename(name) => {
                        if let Some(id) = self.selected_node() {
                            self.rename_node(id, &name);
                        }
                    }
                    TreePrompt::ConfirmDelete => {}
                }
            }
            KeyCode::Backspace => {
                if let Some(buf) = prompt.buffer_mut() {
                    buf.pop();
                }
                self.prompt = Some(prompt);
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(buf) = prompt.buffer_mut() {
                    buf.push(c);
                }
                self.prompt = Some(prompt);
            }
            _ => self.prompt = Some(prompt),
        }
    }

    /// Drains background channels and fires timers.
    fn tick(&mut self, now: Instant) {
        self.drain_job();
        self.drain_ai();

        if self.lint.take_due(now) {
            self.lint_current(false);
        }

        let every = Duration::from_secs(self.config.auto_save_secs);
        if self.config.auto_save_secs > 0 && now.duration_since(self.last_autosave) >= every {
            self.last_autosave = now;
            if self.current.is_some() && self.editor.is_dirty() && self.commit_buffer().is_some() {
                tracing::debug!("auto-saved");
                self.append_panel(PanelEntry::Note("Auto-saved file".to_string()));
            }
        }
    }

    fn drain_job(&mut self) {
        let Some(rx) = self.job.take() else {
            return;
        };
        let mut finished = false;
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    finished |= event.is_terminal();
                    self.on_run_event(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            }
        }
        if !finished {
            self.job = Some(rx);
        }
    }

    fn on_run_event(&mut self, event: RunEvent) {
        match event {
            RunEvent::Output(line) => self.term(TermKind::Output, line),
            RunEvent::Error(line) => {
                for (number, message) in diagnostics::parse_error_lines(&line) {
                    self.diagnostics.push(Severity::Error, number, message);
                }
                self.term(TermKind::Error, line);
            }
            RunEvent::Info(text) => self.term(TermKind::Info, text),
            RunEvent::Finished(code) => {
                self.term(TermKind::Info, format!("Process finished with exit code {code}"));
            }
            RunEvent::CompileFailed(code) => {
                self.term(
                    TermKind::Error,
                    format!("Compilation failed with exit code {code}"),
                );
            }
            RunEvent::Failed(message) => self.term(TermKind::Error, message),
        }
    }

    fn drain_ai(&mut self) {
        for event in self.ai.drain() {
            match event {
                AiEvent::Answer(text) => self.set_panel(PanelEntry::Reply(text)),
                AiEvent::Suggestions(text) => self.note(text),
                AiEvent::Failed(err) => self.note(ai::failure_text(&err)),
                AiEvent::CompletionFailed(err) => {
                    self.status = Some(ai::failure_text(&err));
                }
            }
        }
    }

    fn ensure_cursor_visible(&mut self, height: u16) {
        let (line, _) = self.editor.cursor_line_col();
        let height = height.max(1) as usize;
        if line < self.edit_scroll {
            self.edit_scroll = line;
        } else if line >= self.edit_scroll + height {
            self.edit_scroll = line + 1 - height;
        }
    }

    fn gutter_width(&self) -> usize {
        let digits = self.editor.line_count().to_string().len().max(3);
        digits + 3
    }

    fn editor_text(&self, height: u16) -> Text<'static> {
        if self.current.is_none() {
            return Text::from(vec![
                Line::from(""),
                Line::from(Span::styled(
                    "  No file open. Press ctrl+e to browse, or :e <name>.",
                    Style::default().fg(palette::COMMENT),
                )),
            ]);
        }

        let digits = self.gutter_width() - 3;
        let (cursor_line, _) = self.editor.cursor_line_col();
        let end = (self.edit_scroll + height as usize).min(self.editor.line_count());
        let mut lines = Vec::with_capacity(end.saturating_sub(self.edit_scroll));
        for idx in self.edit_scroll..end {
            let number_style = if idx == cursor_line {
                Style::default().fg(palette::YELLOW)
            } else {
                Style::default().fg(palette::LINENR)
            };
            let mut spans = vec![Span::styled(format!("{:>digits$} ", idx + 1), number_style)];
            match self.diagnostics.marker(idx + 1) {
                Some(severity) => spans.push(Span::styled(
                    format!("{} ", severity.glyph()),
                    Style::default().fg(severity_color(severity)),
                )),
                None => spans.push(Span::raw("  ")),
            }
            let text = self.editor.line_text(idx);
            let highlighted = self.highlighter.highlight_line(&text, self.base_style);
            spans.extend(highlighted.spans);
            lines.push(Line::from(spans));
        }
        Text::from(lines)
    }

    fn panel_lines(&self, width: u16) -> Vec<Line<'static>> {
        let note_style = Style::default().fg(palette::FG);
        let mut out = Vec::new();
        for (idx, entry) in self.panel.iter().enumerate() {
            if idx > 0 {
                out.push(Line::from(""));
            }
            match entry {
                PanelEntry::Note(text) => out.extend(self.renderer.render_plain(text, note_style, width)),
                PanelEntry::Reply(text) => out.extend(self.renderer.render(text, width)),
            }
        }
        out
    }

    fn status_line(&self) -> Line<'static> {
        if self.focus == Focus::Editor && self.editor.mode() == Mode::Command {
            return Line::from(vec![
                Span::styled(":", Style::default().fg(self.ui.accent)),
                Span::styled(
                    self.editor.command_line().trim_start_matches(':').to_string(),
                    self.base_style,
                ),
            ]);
        }
        if let Some(prompt) = &self.prompt {
            return Line::from(Span::styled(prompt.label(), Style::default().fg(palette::YELLOW)));
        }

        let sep = || Span::styled(" | ", Style::default().fg(self.ui.muted));
        let mode = self.editor.mode();
        let (label, bg) = match self.focus {
            Focus::Tree => ("FILES", palette::PURPLE),
            Focus::Editor => {
                let bg = match mode {
                    Mode::Normal => palette::MENU_SEL,
                    Mode::Insert => palette::HINT,
                    Mode::Command => palette::ERROR,
                };
                (mode.label(), bg)
            }
        };
        let mut parts = vec![Span::styled(
            format!(" {label} "),
            Style::default()
                .fg(palette::BG)
                .bg(bg)
                .add_modifier(Modifier::BOLD),
        )];
        parts.push(Span::raw(" "));

        match self.current_name() {
            Some(name) => {
                parts.push(Span::styled(name, self.base_style));
                if self.editor.is_dirty() {
                    parts.push(Span::styled(" [modified]", Style::default().fg(palette::WARNING)));
                }
            }
            None => parts.push(Span::styled("No file open", Style::default().fg(self.ui.muted))),
        }
        if let Some(language) = self.highlighter.language() {
            parts.push(sep());
            parts.push(Span::styled(language.label(), Style::default().fg(self.ui.muted)));
        }

        parts.push(sep());
        let (mark, color) = if self.ai.is_connected() {
            ("AI: ✓", palette::HINT)
        } else {
            ("AI: ✗", palette::ERROR)
        };
        parts.push(Span::styled(mark, Style::default().fg(color)));
        if self.ai.is_busy() {
            parts.push(Span::styled(" …", Style::default().fg(palette::SPECIAL)));
        }

        let (line, col) = self.editor.cursor_line_col();
        parts.push(sep());
        parts.push(Span::styled(
            format!("Ln {}, Col {}", line + 1, col + 1),
            Style::default().fg(self.ui.muted),
        ));

        let message = self
            .status
            .clone()
            .or_else(|| self.diagnostics.tooltip(line + 1));
        if let Some(msg) = message {
            parts.push(sep());
            parts.push(Span::styled(msg, Style::default().fg(self.ui.accent)));
        }
        Line::from(parts)
    }

    fn cursor_screen_position(&self, layout: &LayoutInfo) -> Option<(u16, u16)> {
        if self.focus != Focus::Editor || self.editor.mode() == Mode::Command || self.current.is_none() {
            return None;
        }
        let (line, col) = self.editor.cursor_line_col();
        if line < self.edit_scroll {
            return None;
        }
        let visible_line = line - self.edit_scroll;
        if visible_line >= layout.editor_height as usize {
            return None;
        }

        let width: usize = self
            .editor
            .line_text(line)
            .chars()
            .take(col)
            .map(|ch| UnicodeWidthChar::width(ch).unwrap_or(0))
            .sum();
        let max_x = layout.editor.width.saturating_sub(2) as usize;
        let x = layout
            .editor
            .x
            .saturating_add(1)
            .saturating_add((self.gutter_width() + width).min(max_x).try_into().ok()?);
        let y = layout
            .editor
            .y
            .saturating_add(1)
            .saturating_add(visible_line.try_into().ok()?);
        Some((x, y))
    }
}

fn severity_color(severity: Severity) -> ratatui::style::Color {
    match severity {
        Severity::Error => palette::ERROR,
        Severity::Warning => palette::WARNING,
        Severity::Info => palette::INFO,
    }
}

fn bordered(title: String, focused: bool, app: &App) -> Block<'static> {
    let border = if focused { app.ui.accent } else { app.ui.border };
    Block::bordered()
        .title(title)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(border))
        .style(app.base_style)
}

fn ui(f: &mut ratatui::Frame, app: &mut App, layout: &LayoutInfo) {
    f.render_widget(
        Paragraph::new(app.status_line()).style(Style::default().bg(palette::STATUSLINE).fg(palette::FG)),
        layout.status,
    );

    if let Some(tree_area) = layout.tree {
        let rows = app.vfs.visible_rows(&app.expanded);
        let items: Vec<ListItem> = rows
            .iter()
            .map(|row| {
                let indent = "  ".repeat(row.depth);
                let icon = match (row.is_dir, row.expanded) {
                    (true, true) => "▾ ",
                    (true, false) => "▸ ",
                    (false, _) => "  ",
                };
                let style = if Some(row.id) == app.current {
                    Style::default().fg(palette::BLUE).add_modifier(Modifier::BOLD)
                } else if row.is_dir {
                    Style::default().fg(palette::PURPLE)
                } else {
                    app.base_style
                };
                ListItem::new(Line::from(Span::styled(format!("{indent}{icon}{}", row.name), style)))
            })
            .collect();
        let mut state = ListState::default();
        if app.focus == Focus::Tree {
            state.select(Some(app.tree_selected.min(rows.len().saturating_sub(1))));
        }
        let list = List::new(items)
            .block(bordered(" Files ".to_string(), app.focus == Focus::Tree, app))
            .style(app.base_style)
            .highlight_style(Style::default().bg(palette::SELECTION));
        f.render_stateful_widget(list, tree_area, &mut state);
    }

    let title = match app.current.map(|id| app.vfs.path(id)) {
        Some(path) if app.editor.is_dirty() => format!(" *{path} "),
        Some(path) => format!(" {path} "),
        None => " vimai ".to_string(),
    };
    let editor_paragraph = Paragraph::new(app.editor_text(layout.editor_height))
        .block(bordered(title, app.focus == Focus::Editor, app))
        .style(app.base_style);
    f.render_widget(editor_paragraph, layout.editor);

    let panel = app.panel_lines(layout.assistant_width);
    let max_scroll = panel.len().saturating_sub(layout.assistant_height as usize);
    app.panel_scroll = app.panel_scroll.min(max_scroll);
    let assistant = Paragraph::new(Text::from(panel))
        .block(bordered(" Gemini ".to_string(), false, app))
        .style(app.base_style)
        .scroll((app.panel_scroll.min(u16::MAX as usize) as u16, 0));
    f.render_widget(assistant, layout.assistant);

    let term_height = layout.terminal.height.saturating_sub(2) as usize;
    let skip = app.terminal_lines.len().saturating_sub(term_height);
    let term_lines: Vec<Line> = app.terminal_lines[skip..]
        .iter()
        .map(|(kind, text)| {
            let color = match kind {
                TermKind::Output => palette::FG,
                TermKind::Error => palette::ERROR,
                TermKind::Info => palette::INFO,
            };
            Line::from(Span::styled(text.clone(), Style::default().fg(color)))
        })
        .collect();
    let running = if app.job.is_some() { " Terminal (running) " } else { " Terminal " };
    f.render_widget(
        Paragraph::new(Text::from(term_lines))
            .block(bordered(running.to_string(), false, app).border_style(Style::default().fg(palette::VERTSPLIT)))
            .style(app.base_style),
        layout.terminal,
    );

    if let Some((x, y)) = app.cursor_screen_position(layout) {
        f.set_cursor(x, y);
    }
}
