mod app;

use anyhow::Result;
use app::App;
use app::config::ConfigStore;
use app::shell::SystemRunner;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};
use std::fs::File;
use std::io;

/// The TUI owns the terminal, so logs go to a file. Level comes from
/// ADDON_PANEL_LOG, default info.
fn init_logging() {
    let level = std::env::var("ADDON_PANEL_LOG")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(LevelFilter::Info);
    if let Ok(file) = File::create("/tmp/addon-panel.log") {
        let _ = WriteLogger::init(level, Config::default(), file);
    }
}

fn main() -> Result<()> {
    init_logging();

    let mut app = App::new(Box::new(SystemRunner), ConfigStore::default())?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app.run(&mut terminal);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}
