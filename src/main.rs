mod ai;
mod app;
mod config;
mod diagnostics;
mod editor;
mod error;
mod highlight;
mod logging;
mod markdown;
mod runner;
mod theme;
mod vfs;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vimai", version, about = "Modal code editor with a Gemini assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Workspace file to open on start (e.g. main.py)
    file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the config file in $EDITOR (default: nvim)
    Config,
    /// List syntax themes available for assistant code blocks
    Themes,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = cli.command {
        return match command {
            Commands::Config => config::open_config_in_editor(),
            Commands::Themes => {
                let cfg = config::load_config()?;
                let manager = theme::ThemeManager::load(&cfg)?;
                for name in manager.theme_names() {
                    let marker = if *name == cfg.theme { " (current)" } else { "" };
                    println!("{name}{marker}");
                }
                Ok(())
            }
        };
    }

    let _logging = logging::init();
    let cfg = config::load_config()?;
    tracing::info!(theme = %cfg.theme, model = %cfg.ai_model, "starting vimai");
    app::run_app(cfg, cli.file)
}
