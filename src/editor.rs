//! Text buffer and the modal key dispatcher.
//!
//! The editor owns text, cursor, mode and undo history. It never performs
//! side effects beyond its own buffer: saving, opening files, running code and
//! talking to the assistant are returned to the caller as [`Action`]s.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ropey::Rope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Insert,
    Command,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Insert => "INSERT",
            Mode::Command => "COMMAND",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Write,
    Quit,
    WriteQuit,
    Edit(String),
    Ai(String),
    Fix,
    Explain,
    Optimize,
    Test,
    Run,
    Lint,
    NewFile(String),
    NewDir(String),
    Rename(String),
    Remove,
    Shell(String),
    ClearTerminal,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Save,
    Complete,
    Command(Command),
}

pub fn parse_command(input: &str) -> Command {
    let cmd = input.trim().trim_start_matches(':').trim();
    let (head, rest) = match cmd.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (cmd, ""),
    };

    if let Some(shell) = cmd.strip_prefix('!') {
        let shell = shell.trim();
        if !shell.is_empty() {
            return Command::Shell(shell.to_string());
        }
    }

    match (head, rest.is_empty()) {
        ("wq" | "x", true) => Command::WriteQuit,
        ("w" | "write", true) => Command::Write,
        ("q" | "quit" | "q!" | "quit!", true) => Command::Quit,
        ("e" | "edit", false) => Command::Edit(rest.to_string()),
        ("ai", false) => Command::Ai(rest.to_string()),
        ("fix", true) => Command::Fix,
        ("explain", true) => Command::Explain,
        ("opt", true) => Command::Optimize,
        ("test", true) => Command::Test,
        ("run", true) => Command::Run,
        ("lint", _) => Command::Lint,
        ("new", false) => Command::NewFile(rest.to_string()),
        ("mkdir", false) => Command::NewDir(rest.to_string()),
        ("rename", false) => Command::Rename(rest.to_string()),
        ("rm", true) => Command::Remove,
        ("clear", true) => Command::ClearTerminal,
        _ => Command::Unknown(format!(":{cmd}")),
    }
}

pub struct Editor {
    rope: Rope,
    saved: String,
    cursor_char: usize,
    preferred_col: Option<usize>,
    mode: Mode,
    last_key: Option<char>,
    undo_stack: Vec<Rope>,
    redo_stack: Vec<Rope>,
    command_buffer: String,
    dirty: bool,
    revision: u64,
    tab_width: usize,
}

impl Editor {
    pub fn new(tab_width: usize) -> Self {
        Self {
            rope: Rope::new(),
            saved: String::new(),
            cursor_char: 0,
            preferred_col: None,
            mode: Mode::Normal,
            last_key: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            command_buffer: String::new(),
            dirty: false,
            revision: 0,
            tab_width: tab_width.max(1),
        }
    }

    /// Replaces the buffer and forgets all history.
    pub fn load(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
        self.saved = text.to_string();
        self.cursor_char = 0;
        self.preferred_col = None;
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.last_key = None;
        self.dirty = false;
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn clear(&mut self) {
        self.load("");
        self.mode = Mode::Normal;
        self.command_buffer.clear();
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn mark_saved(&mut self) {
        self.saved = self.rope.to_string();
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped on every change to the text.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn command_line(&self) -> String {
        format!(":{}", self.command_buffer)
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    pub fn cursor_line_col(&self) -> (usize, usize) {
        let line = self.rope.char_to_line(self.cursor_char);
        let line_start = self.rope.line_to_char(line);
        (line, self.cursor_char.saturating_sub(line_start))
    }

    pub fn line_text(&self, line: usize) -> String {
        if line >= self.rope.len_lines() {
            return String::new();
        }
        let mut s = self.rope.line(line).to_string();
        if s.ends_with('\n') {
            s.pop();
            if s.ends_with('\r') {
                s.pop();
            }
        }
        s
    }

    pub fn current_line(&self) -> String {
        self.line_text(self.cursor_line_col().0)
    }

    /// Text of the current line up to the cursor.
    pub fn context_before_cursor(&self) -> String {
        let (line, col) = self.cursor_line_col();
        self.line_text(line).chars().take(col).collect()
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        match self.mode {
            Mode::Normal => self.handle_normal_mode(key),
            Mode::Insert => self.handle_insert_mode(key),
            Mode::Command => self.handle_command_mode(key),
        }
    }

    fn handle_normal_mode(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let previous = self.last_key.take();
        if ctrl {
            if key.code == KeyCode::Char('r') {
                self.redo();
            }
            return Action::None;
        }

        let mut record = match key.code {
            KeyCode::Char(c) => Some(c),
            _ => None,
        };

        match key.code {
            KeyCode::Char('h') | KeyCode::Left => self.move_cursor_left(),
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor_down(),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor_up(),
            KeyCode::Char('l') | KeyCode::Right => self.move_cursor_right(),
            KeyCode::Char('i') => self.enter_insert_mode(),
            KeyCode::Char('a') => {
                if !self.is_at_line_end() {
                    self.move_cursor_right();
                }
                self.enter_insert_mode();
            }
            KeyCode::Char('x') => self.delete_char_under_cursor(),
            KeyCode::Char('d') if previous == Some('d') => {
                self.delete_line();
                record = None;
            }
            KeyCode::Char('g') if previous == Some('g') => {
                self.move_cursor_file_start();
                record = None;
            }
            KeyCode::Char('G') => self.move_cursor_file_end(),
            KeyCode::Char('u') => self.undo(),
            KeyCode::Char(':') => {
                self.mode = Mode::Command;
                self.command_buffer.clear();
                record = None;
            }
            KeyCode::Esc => record = None,
            _ => {}
        }

        self.last_key = record;
        Action::None
    }

    fn handle_insert_mode(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('s') => Action::Save,
                KeyCode::Char('r') => {
                    self.redo();
                    Action::None
                }
                KeyCode::Char(' ') | KeyCode::Char('n') => Action::Complete,
                _ => Action::None,
            };
        }

        match key.code {
            KeyCode::Esc => self.exit_insert_mode(),
            KeyCode::Left => self.move_cursor_left(),
            KeyCode::Right => self.move_cursor_right(),
            KeyCode::Up => self.move_cursor_up(),
            KeyCode::Down => self.move_cursor_down(),
            KeyCode::Home => self.move_cursor_line_start(),
            KeyCode::End => self.move_cursor_line_end(),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Enter => self.insert_str("\n"),
            KeyCode::Tab => {
                let spaces = " ".repeat(self.tab_width);
                self.insert_str(&spaces);
            }
            KeyCode::Char(c) => {
                let mut buf = [0u8; 4];
                self.insert_str(c.encode_utf8(&mut buf));
            }
            _ => {}
        }
        Action::None
    }

    fn handle_command_mode(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Esc => self.leave_command_mode(),
            KeyCode::Enter => {
                let input = std::mem::take(&mut self.command_buffer);
                self.leave_command_mode();
                return Action::Command(parse_command(&input));
            }
            KeyCode::Backspace => {
                if self.command_buffer.pop().is_none() {
                    self.leave_command_mode();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.command_buffer.push(c);
            }
            _ => {}
        }
        Action::None
    }

    fn leave_command_mode(&mut self) {
        self.command_buffer.clear();
        self.mode = Mode::Normal;
    }

    fn enter_insert_mode(&mut self) {
        if self.mode != Mode::Insert {
            self.push_undo();
        }
        self.mode = Mode::Insert;
    }

    fn exit_insert_mode(&mut self) {
        // an insert session that changed nothing leaves no undo step
        if self.undo_stack.last() == Some(&self.rope) {
            self.undo_stack.pop();
        }
        self.mode = Mode::Normal;
        self.last_key = None;
    }

    fn push_undo(&mut self) {
        self.undo_stack.push(self.rope.clone());
    }

    pub fn undo(&mut self) {
        if let Some(prev) = self.undo_stack.pop() {
            self.redo_stack.push(self.rope.clone());
            self.rope = prev;
            self.after_history_jump();
        }
    }

    pub fn redo(&mut self) {
        if let Some(next) = self.redo_stack.pop() {
            let in_insert = self.mode == Mode::Insert;
            // drop the untouched insert-session snapshot; it is re-taken below
            if in_insert && self.undo_stack.last() == Some(&self.rope) {
                self.undo_stack.pop();
            }
            self.undo_stack.push(self.rope.clone());
            self.rope = next;
            self.after_history_jump();
            if in_insert {
                self.push_undo();
            }
        }
    }

    fn after_history_jump(&mut self) {
        self.cursor_char = self.cursor_char.min(self.rope.len_chars());
        self.preferred_col = None;
        self.dirty = self.rope != self.saved.as_str();
        self.revision = self.revision.wrapping_add(1);
    }

    fn mark_changed(&mut self) {
        self.redo_stack.clear();
        self.dirty = true;
        self.revision = self.revision.wrapping_add(1);
    }

    fn insert_str(&mut self, text: &str) {
        self.rope.insert(self.cursor_char, text);
        self.cursor_char += text.chars().count();
        self.preferred_col = None;
        self.mark_changed();
    }

    fn backspace(&mut self) {
        if self.cursor_char == 0 {
            return;
        }
        let prev = self.cursor_char - 1;
        self.rope.remove(prev..self.cursor_char);
        self.cursor_char = prev;
        self.preferred_col = None;
        self.mark_changed();
    }

    fn delete(&mut self) {
        if self.cursor_char >= self.rope.len_chars() {
            return;
        }
        self.rope.remove(self.cursor_char..self.cursor_char + 1);
        self.preferred_col = None;
        self.mark_changed();
    }

    fn delete_char_under_cursor(&mut self) {
        if self.is_at_line_end() {
            return;
        }
        self.push_undo();
        self.rope.remove(self.cursor_char..self.cursor_char + 1);
        self.mark_changed();
    }

    fn delete_line(&mut self) {
        if self.rope.len_chars() == 0 {
            return;
        }
        let line = self.rope.char_to_line(self.cursor_char);
        let start = self.rope.line_to_char(line);
        let end = if line + 1 >= self.rope.len_lines() {
            self.rope.len_chars()
        } else {
            self.rope.line_to_char(line + 1)
        };
        // last line: take the newline before it instead
        let start = if end == self.rope.len_chars() && start > 0 && line + 1 >= self.rope.len_lines() {
            start - 1
        } else {
            start
        };
        if start == end {
            return;
        }
        self.push_undo();
        self.rope.remove(start..end);
        let target = line.min(self.rope.len_lines().saturating_sub(1));
        self.cursor_char = self.rope.line_to_char(target);
        self.preferred_col = None;
        self.mark_changed();
    }

    fn is_at_line_end(&self) -> bool {
        let (line, col) = self.cursor_line_col();
        col >= line_len_chars(&self.rope, line)
    }

    fn move_cursor_left(&mut self) {
        if self.cursor_char > 0 {
            self.cursor_char -= 1;
        }
        self.preferred_col = None;
    }

    fn move_cursor_right(&mut self) {
        if self.cursor_char < self.rope.len_chars() {
            self.cursor_char += 1;
        }
        self.preferred_col = None;
    }

    fn move_cursor_up(&mut self) {
        let (line, col) = self.cursor_line_col();
        if line == 0 {
            return;
        }
        self.move_cursor_to_line(line - 1, col);
    }

    fn move_cursor_down(&mut self) {
        let (line, col) = self.cursor_line_col();
        if line + 1 >= self.rope.len_lines() {
            return;
        }
        self.move_cursor_to_line(line + 1, col);
    }

    fn move_cursor_to_line(&mut self, target_line: usize, col: usize) {
        let desired = self.preferred_col.unwrap_or(col);
        let target_col = desired.min(line_len_chars(&self.rope, target_line));
        self.cursor_char = self.rope.line_to_char(target_line) + target_col;
        self.preferred_col = Some(desired);
    }

    fn move_cursor_line_start(&mut self) {
        let (line, _) = self.cursor_line_col();
        self.cursor_char = self.rope.line_to_char(line);
        self.preferred_col = None;
    }

    fn move_cursor_line_end(&mut self) {
        let (line, _) = self.cursor_line_col();
        self.cursor_char = self.rope.line_to_char(line) + line_len_chars(&self.rope, line);
        self.preferred_col = None;
    }

    fn move_cursor_file_start(&mut self) {
        self.cursor_char = 0;
        self.preferred_col = None;
    }

    fn move_cursor_file_end(&mut self) {
        self.cursor_char = self.rope.len_chars();
        self.preferred_col = None;
    }
}

fn line_len_chars(rope: &Rope, line: usize) -> usize {
    if line >= rope.len_lines() {
        return 0;
    }
    let slice = rope.line(line);
    let mut len = slice.len_chars();
    if len > 0 && slice.char(len - 1) == '\n' {
        len -= 1;
        if len > 0 && slice.char(len - 1) == '\r' {
            len -= 1;
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn code(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn editor_with(text: &str) -> Editor {
        let mut ed = Editor::new(4);
        ed.load(text);
        ed
    }

    fn feed(ed: &mut Editor, keys: &str) -> Action {
        let mut last = Action::None;
        for c in keys.chars() {
            last = ed.handle_key(key(c));
        }
        last
    }

    #[test]
    fn redo_survives_an_empty_insert_session() {
        let mut ed = editor_with("abc");
        feed(&mut ed, "xu");
        assert_eq!(ed.text(), "abc");
        ed.handle_key(key('i'));
        ed.handle_key(code(KeyCode::Esc));
        ed.handle_key(ctrl('r'));
        assert_eq!(ed.text(), "bc");
    }

    #[test]
    fn ctrl_r_redoes_inside_insert_mode() {
        let mut ed = editor_with("abc");
        feed(&mut ed, "xui");
        ed.handle_key(ctrl('r'));
        assert_eq!(ed.text(), "bc");
        ed.handle_key(code(KeyCode::Esc));
        ed.handle_key(key('u'));
        assert_eq!(ed.text(), "abc");
    }

    #[test]
    fn typing_after_undo_discards_redo() {
        let mut ed = editor_with("abc");
        feed(&mut ed, "xu");
        feed(&mut ed, "iz");
        ed.handle_key(code(KeyCode::Esc));
        ed.handle_key(ctrl('r'));
        assert_eq!(ed.text(), "zabc");
    }

    #[test]
    fn insert_and_escape_round_trip() {
        let mut ed = editor_with("abc");
        assert_eq!(ed.mode(), Mode::Normal);
        ed.handle_key(key('i'));
        assert_eq!(ed.mode(), Mode::Insert);
        ed.handle_key(code(KeyCode::Esc));
        assert_eq!(ed.mode(), Mode::Normal);
        assert_eq!(ed.text(), "abc");
        assert!(!ed.is_dirty());
    }

    #[test]
    fn typing_in_insert_mode_edits_buffer() {
        let mut ed = editor_with("world");
        feed(&mut ed, "ihello ");
        ed.handle_key(code(KeyCode::Esc));
        assert_eq!(ed.text(), "hello world");
        assert!(ed.is_dirty());
    }

    #[test]
    fn single_d_does_not_delete() {
        let mut ed = editor_with("one\ntwo\nthree");
        feed(&mut ed, "d");
        assert_eq!(ed.text(), "one\ntwo\nthree");
        feed(&mut ed, "d");
        assert_eq!(ed.text(), "two\nthree");
    }

    #[test]
    fn interrupted_d_sequence_does_not_delete_line() {
        let mut ed = editor_with("one\ntwo");
        feed(&mut ed, "dld");
        assert_eq!(ed.text(), "one\ntwo");
        let mut ed = editor_with("abc\ndef");
        ed.handle_key(key('d'));
        ed.handle_key(code(KeyCode::Esc));
        ed.handle_key(key('d'));
        assert_eq!(ed.text(), "abc\ndef");
    }

    #[test]
    fn triple_d_deletes_one_line() {
        let mut ed = editor_with("a\nb\nc");
        feed(&mut ed, "ddd");
        assert_eq!(ed.text(), "b\nc");
    }

    #[test]
    fn dd_on_last_line_removes_preceding_newline() {
        let mut ed = editor_with("a\nb");
        feed(&mut ed, "jdd");
        assert_eq!(ed.text(), "a");
        assert_eq!(ed.cursor_line_col(), (0, 0));
    }

    #[test]
    fn x_deletes_under_cursor_but_not_newline() {
        let mut ed = editor_with("ab\ncd");
        feed(&mut ed, "x");
        assert_eq!(ed.text(), "b\ncd");
        feed(&mut ed, "lx");
        assert_eq!(ed.text(), "b\ncd");
    }

    #[test]
    fn undo_and_redo() {
        let mut ed = editor_with("abc");
        feed(&mut ed, "x");
        assert_eq!(ed.text(), "bc");
        feed(&mut ed, "u");
        assert_eq!(ed.text(), "abc");
        assert!(!ed.is_dirty());
        ed.handle_key(ctrl('r'));
        assert_eq!(ed.text(), "bc");
        assert!(ed.is_dirty());
    }

    #[test]
    fn insert_session_is_one_undo_step() {
        let mut ed = editor_with("");
        feed(&mut ed, "iabc");
        ed.handle_key(code(KeyCode::Esc));
        feed(&mut ed, "u");
        assert_eq!(ed.text(), "");
    }

    #[test]
    fn empty_insert_session_leaves_no_undo_step() {
        let mut ed = editor_with("abc");
        feed(&mut ed, "x");
        feed(&mut ed, "i");
        ed.handle_key(code(KeyCode::Esc));
        feed(&mut ed, "u");
        assert_eq!(ed.text(), "abc");
    }

    #[test]
    fn gg_and_g_jump() {
        let mut ed = editor_with("one\ntwo\nthree");
        feed(&mut ed, "G");
        assert_eq!(ed.cursor_line_col(), (2, 5));
        feed(&mut ed, "g");
        assert_eq!(ed.cursor_line_col(), (2, 5));
        feed(&mut ed, "g");
        assert_eq!(ed.cursor_line_col(), (0, 0));
    }

    #[test]
    fn hjkl_movement_keeps_column() {
        let mut ed = editor_with("abcd\nx\nabcd");
        feed(&mut ed, "lll");
        assert_eq!(ed.cursor_line_col(), (0, 3));
        feed(&mut ed, "j");
        assert_eq!(ed.cursor_line_col(), (1, 1));
        feed(&mut ed, "j");
        assert_eq!(ed.cursor_line_col(), (2, 3));
        feed(&mut ed, "kh");
        assert_eq!(ed.cursor_line_col(), (1, 0));
    }

    #[test]
    fn append_moves_right_before_inserting() {
        let mut ed = editor_with("ac");
        feed(&mut ed, "ab");
        assert_eq!(ed.text(), "abc");
    }

    #[test]
    fn command_mode_returns_parsed_command() {
        let mut ed = editor_with("x");
        feed(&mut ed, ":");
        assert_eq!(ed.mode(), Mode::Command);
        feed(&mut ed, "wq");
        assert_eq!(ed.command_line(), ":wq");
        let action = ed.handle_key(code(KeyCode::Enter));
        assert_eq!(action, Action::Command(Command::WriteQuit));
        assert_eq!(ed.mode(), Mode::Normal);
    }

    #[test]
    fn command_mode_backspace_on_empty_cancels() {
        let mut ed = editor_with("x");
        feed(&mut ed, ":a");
        ed.handle_key(code(KeyCode::Backspace));
        assert_eq!(ed.mode(), Mode::Command);
        ed.handle_key(code(KeyCode::Backspace));
        assert_eq!(ed.mode(), Mode::Normal);
    }

    #[test]
    fn insert_mode_chords() {
        let mut ed = editor_with("");
        feed(&mut ed, "i");
        assert_eq!(ed.handle_key(ctrl('s')), Action::Save);
        assert_eq!(ed.handle_key(ctrl(' ')), Action::Complete);
        assert_eq!(ed.mode(), Mode::Insert);
    }

    #[test]
    fn tab_inserts_spaces() {
        let mut ed = editor_with("");
        feed(&mut ed, "i");
        ed.handle_key(code(KeyCode::Tab));
        assert_eq!(ed.text(), "    ");
    }

    #[test]
    fn context_before_cursor() {
        let mut ed = editor_with("def greet(name):");
        feed(&mut ed, "llll");
        assert_eq!(ed.context_before_cursor(), "def ");
        assert_eq!(ed.current_line(), "def greet(name):");
    }

    #[test]
    fn parse_command_table() {
        assert_eq!(parse_command("w"), Command::Write);
        assert_eq!(parse_command(":w"), Command::Write);
        assert_eq!(parse_command("wq"), Command::WriteQuit);
        assert_eq!(parse_command("q"), Command::Quit);
        assert_eq!(parse_command("e main.py"), Command::Edit("main.py".into()));
        assert_eq!(parse_command("ai  what is this? "), Command::Ai("what is this?".into()));
        assert_eq!(parse_command("fix"), Command::Fix);
        assert_eq!(parse_command("explain"), Command::Explain);
        assert_eq!(parse_command("opt"), Command::Optimize);
        assert_eq!(parse_command("test"), Command::Test);
        assert_eq!(parse_command("run"), Command::Run);
        assert_eq!(parse_command("lint"), Command::Lint);
        assert_eq!(parse_command("new a.js"), Command::NewFile("a.js".into()));
        assert_eq!(parse_command("mkdir lib"), Command::NewDir("lib".into()));
        assert_eq!(parse_command("rename b.py"), Command::Rename("b.py".into()));
        assert_eq!(parse_command("rm"), Command::Remove);
        assert_eq!(parse_command("! ls -la"), Command::Shell("ls -la".into()));
        assert_eq!(parse_command("clear"), Command::ClearTerminal);
    }

    #[test]
    fn parse_command_rejects_malformed() {
        assert_eq!(parse_command("e"), Command::Unknown(":e".into()));
        assert_eq!(parse_command("ai"), Command::Unknown(":ai".into()));
        assert_eq!(parse_command("fix now"), Command::Unknown(":fix now".into()));
        assert_eq!(parse_command("frobnicate"), Command::Unknown(":frobnicate".into()));
    }
}
