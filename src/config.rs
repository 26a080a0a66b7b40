use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub theme: String,
    pub theme_dir: Option<PathBuf>,
    pub show_tree: bool,
    pub tree_width: u16,
    pub ai_panel_width: u16,
    pub terminal_height: u16,
    pub tab_width: usize,
    pub auto_save_secs: u64,
    pub auto_lint_ms: u64,
    pub ai_model: String,
    pub ai_endpoint: String,
    pub ai_api_key_env: String,
    pub python: String,
    pub node: String,
    pub javac: String,
    pub java: String,
    pub gcc: String,
    pub gxx: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "base16-ocean.dark".to_string(),
            theme_dir: crate::theme::default_theme_dir(),
            show_tree: true,
            tree_width: 24,
            ai_panel_width: 40,
            terminal_height: 8,
            tab_width: 4,
            auto_save_secs: 30,
            auto_lint_ms: 1000,
            ai_model: "gemini-2.0-flash".to_string(),
            ai_endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            ai_api_key_env: "GEMINI_API_KEY".to_string(),
            python: "python".to_string(),
            node: "node".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
            gcc: "gcc".to_string(),
            gxx: "g++".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PartialConfig {
    theme: Option<String>,
    theme_dir: Option<PathBuf>,
    show_tree: Option<bool>,
    tree_width: Option<u16>,
    ai_panel_width: Option<u16>,
    terminal_height: Option<u16>,
    tab_width: Option<usize>,
    auto_save_secs: Option<u64>,
    auto_lint_ms: Option<u64>,
    ai_model: Option<String>,
    ai_endpoint: Option<String>,
    ai_api_key_env: Option<String>,
    python: Option<String>,
    node: Option<String>,
    javac: Option<String>,
    java: Option<String>,
    gcc: Option<String>,
    gxx: Option<String>,
}

fn fill<T>(value: Option<T>, default: T, changed: &mut bool) -> T {
    match value {
        Some(v) => v,
        None => {
            *changed = true;
            default
        }
    }
}

impl PartialConfig {
    fn apply_defaults(self) -> (Config, bool) {
        let defaults = Config::default();
        let mut changed = false;

        let theme_dir = match self.theme_dir {
            Some(v) => Some(v),
            None => {
                changed = true;
                defaults.theme_dir
            }
        };

        let config = Config {
            theme: fill(self.theme, defaults.theme, &mut changed),
            theme_dir,
            show_tree: fill(self.show_tree, defaults.show_tree, &mut changed),
            tree_width: fill(self.tree_width, defaults.tree_width, &mut changed),
            ai_panel_width: fill(self.ai_panel_width, defaults.ai_panel_width, &mut changed),
            terminal_height: fill(self.terminal_height, defaults.terminal_height, &mut changed),
            tab_width: fill(self.tab_width, defaults.tab_width, &mut changed),
            auto_save_secs: fill(self.auto_save_secs, defaults.auto_save_secs, &mut changed),
            auto_lint_ms: fill(self.auto_lint_ms, defaults.auto_lint_ms, &mut changed),
            ai_model: fill(self.ai_model, defaults.ai_model, &mut changed),
            ai_endpoint: fill(self.ai_endpoint, defaults.ai_endpoint, &mut changed),
            ai_api_key_env: fill(self.ai_api_key_env, defaults.ai_api_key_env, &mut changed),
            python: fill(self.python, defaults.python, &mut changed),
            node: fill(self.node, defaults.node, &mut changed),
            javac: fill(self.javac, defaults.javac, &mut changed),
            java: fill(self.java, defaults.java, &mut changed),
            gcc: fill(self.gcc, defaults.gcc, &mut changed),
            gxx: fill(self.gxx, defaults.gxx, &mut changed),
        };

        (config, changed)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    Ok(base.join("vimai").join("config.toml"))
}

pub fn ensure_config_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        write_config_to(&cfg, path)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let partial: PartialConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let (cfg, changed) = partial.apply_defaults();
    if changed {
        tracing::info!(path = %path.display(), "filling missing config keys");
        write_config_to(&cfg, path)?;
    }
    Ok(cfg)
}

pub fn write_config_to(cfg: &Config, path: &Path) -> Result<()> {
    ensure_config_dir(path)?;
    let text = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn open_config_in_editor() -> Result<()> {
    let path = config_path()?;
    if !path.exists() {
        write_config_to(&Config::default(), &path)?;
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "nvim".to_string());
    let mut parts = match shell_words::split(&editor) {
        Ok(p) if !p.is_empty() => p,
        _ => vec![editor],
    };
    let cmd = parts.remove(0);
    let status = Command::new(cmd)
        .args(parts)
        .arg(&path)
        .status()
        .with_context(|| format!("Failed to launch editor for {}", path.display()))?;
    if !status.success() {
        anyhow::bail!("Editor exited with status {}", status);
    }
    Ok(())
}
