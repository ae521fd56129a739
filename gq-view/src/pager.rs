use std::io::{self, Stdout};

use color_eyre::eyre::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Modifier, Style},
    widgets::{List, ListItem, Paragraph},
};

/// Holds terminal control for the lifetime of the view and restores the
/// screen on every exit path, including errors.
struct TerminalGuard;

impl TerminalGuard {
    fn acquire() -> Result<Self> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(TerminalGuard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

/// Pages the captured command output in an alternate-screen list view.
pub fn run(title: &str, lines: &[String]) -> Result<()> {
    let _guard = TerminalGuard::acquire()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;
    run_view(&mut terminal, title, lines)
}

fn run_view(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    title: &str,
    lines: &[String],
) -> Result<()> {
    let mut offset: usize = 0;
    let mut page: usize = 1;

    loop {
        terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(1), Constraint::Min(0)])
                .split(frame.area());
            page = chunks[1].height.max(1) as usize;

            let shown = if lines.is_empty() {
                100
            } else {
                ((offset + page).min(lines.len()) * 100) / lines.len()
            };
            let header = Paragraph::new(format!("{title}   [{shown}%]  (q to quit)"))
                .style(Style::default().add_modifier(Modifier::REVERSED));
            frame.render_widget(header, chunks[0]);

            let items: Vec<ListItem> = lines
                .iter()
                .skip(offset)
                .take(page)
                .map(|line| ListItem::new(line.as_str()))
                .collect();
            frame.render_widget(List::new(items), chunks[1]);
        })?;

        let max_offset = lines.len().saturating_sub(page);

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Up | KeyCode::Char('k') => offset = offset.saturating_sub(1),
                KeyCode::Down | KeyCode::Char('j') => offset = (offset + 1).min(max_offset),
                KeyCode::PageUp => offset = offset.saturating_sub(page),
                KeyCode::PageDown => offset = (offset + page).min(max_offset),
                KeyCode::Home | KeyCode::Char('g') => offset = 0,
                KeyCode::End | KeyCode::Char('G') => offset = max_offset,
                _ => {}
            }
        }
    }
}
