use crate::config::Config;
use anyhow::{Context, Result};
use ratatui::style::Color;
use std::path::PathBuf;
use syntect::highlighting::{Theme, ThemeSet};

/// Editor palette. The highlighter and the gutter paint with these directly;
/// the syntect theme only drives code blocks in assistant replies.
pub mod palette {
    use ratatui::style::Color;

    pub const BG: Color = Color::Rgb(0x1e, 0x1e, 0x2e);
    pub const FG: Color = Color::Rgb(0xcd, 0xd6, 0xf4);
    pub const COMMENT: Color = Color::Rgb(0x6c, 0x70, 0x86);
    pub const SELECTION: Color = Color::Rgb(0x45, 0x47, 0x5a);
    pub const STATUSLINE: Color = Color::Rgb(0x18, 0x18, 0x25);
    pub const LINENR: Color = Color::Rgb(0x6c, 0x70, 0x86);
    pub const ERROR: Color = Color::Rgb(0xf3, 0x8b, 0xa8);
    pub const WARNING: Color = Color::Rgb(0xfa, 0xb3, 0x87);
    pub const INFO: Color = Color::Rgb(0x89, 0xb4, 0xfa);
    pub const HINT: Color = Color::Rgb(0xa6, 0xe3, 0xa1);
    pub const MENU: Color = Color::Rgb(0x31, 0x32, 0x44);
    pub const MENU_SEL: Color = Color::Rgb(0x58, 0x5b, 0x70);
    pub const SPECIAL: Color = Color::Rgb(0xf5, 0xc2, 0xe7);
    pub const VERTSPLIT: Color = Color::Rgb(0x31, 0x32, 0x44);
    pub const YELLOW: Color = Color::Rgb(0xf9, 0xe2, 0xaf);
    pub const PURPLE: Color = Color::Rgb(0xcb, 0xa6, 0xf7);
    pub const BLUE: Color = Color::Rgb(0x89, 0xb4, 0xfa);
}

pub struct ThemeManager {
    theme_set: ThemeSet,
    theme_names: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct UiPalette {
    pub base_fg: Color,
    pub base_bg: Option<Color>,
    pub accent: Color,
    pub muted: Color,
    pub code_bg: Option<Color>,
    pub border: Color,
}

impl UiPalette {
    pub fn editor() -> Self {
        Self {
            base_fg: palette::FG,
            base_bg: Some(palette::BG),
            accent: palette::BLUE,
            muted: palette::COMMENT,
            code_bg: Some(palette::MENU),
            border: palette::VERTSPLIT,
        }
    }
}

impl ThemeManager {
    pub fn load(config: &Config) -> Result<Self> {
        let mut theme_set = ThemeSet::load_defaults();

        if let Some(dir) = &config.theme_dir {
            if dir.exists() {
                let extra = ThemeSet::load_from_folder(dir)
                    .with_context(|| format!("Failed to load themes from {}", dir.display()))?;
                theme_set.themes.extend(extra.themes);
            }
        }

        let mut theme_names: Vec<String> = theme_set.themes.keys().cloned().collect();
        theme_names.sort();

        Ok(Self {
            theme_set,
            theme_names,
        })
    }

    pub fn theme_names(&self) -> &[String] {
        &self.theme_names
    }

    /// Falls back to the first known theme; `None` only for an empty set.
    pub fn get(&self, name: &str) -> Option<&Theme> {
        self.theme_set
            .themes
            .get(name)
            .or_else(|| self.theme_set.themes.get(self.fallback_name()))
            .or_else(|| self.theme_set.themes.values().next())
    }

    pub fn fallback_name(&self) -> &str {
        self.theme_names
            .first()
            .map(|s| s.as_str())
            .unwrap_or("base16-ocean.dark")
    }

    pub fn code_bg(&self, name: &str) -> Option<Color> {
        let settings = &self.get(name)?.settings;
        settings
            .line_highlight
            .or(settings.background)
            .map(to_ratatui)
    }
}

pub fn default_theme_dir() -> Option<PathBuf> {
    let base = dirs::config_dir()?;
    Some(base.join("vimai").join("themes"))
}

fn to_ratatui(color: syntect::highlighting::Color) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_theme_falls_back() {
        let cfg = Config {
            theme_dir: None,
            ..Config::default()
        };
        let manager = ThemeManager::load(&cfg).expect("default themes");
        assert!(!manager.theme_names().is_empty());
        assert!(manager.get("no-such-theme").is_some());
        assert!(manager.get("base16-ocean.dark").is_some());
    }
}
