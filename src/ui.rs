use crate::control::{ControlFile, ToggleCommand};
use crate::process::{ProcessRecord, ProcessScanner, RunState};
use crate::toggle::Coordinator;
use std::io::stdout;
use std::time::{Duration, Instant};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    execute,
};
use log::debug;
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};

use ratatui::{
    backend::{Backend, CrosstermBackend},
    widgets::{Block, Borders, Paragraph, Table, Row, Cell},
    layout::{Layout, Constraint, Direction, Alignment, Rect},
    style::{Style, Modifier, Color},
    text::{Line, Span},
    Frame, Terminal,
};

pub type AclCoordinator = Coordinator<ProcessScanner, ControlFile>;

const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

// What a key press asks the main loop to do
#[derive(PartialEq)]
enum Action {
    Nothing,
    Quit,
    Rescan,
    Toggle(ToggleCommand),
}

struct App {
    coordinator: AclCoordinator,
    system: System,
    members: Vec<ProcessRecord>,
    host: String,
    pending: Option<String>,
    last_refresh: Instant,
}

impl App {
    fn new(coordinator: AclCoordinator) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let mut app = Self {
            coordinator,
            system: System::new(),
            members: Vec::new(),
            host,
            pending: None,
            last_refresh: Instant::now(),
        };
        app.refresh();
        app
    }

    // Rebuild the member table; the status itself only changes on requests
    fn refresh(&mut self) {
        self.members = self.coordinator.probe().scan();
        self.system.refresh_processes();
        self.last_refresh = Instant::now();
    }

    fn toggle(&mut self, command: ToggleCommand) {
        match command {
            ToggleCommand::Stop => self.coordinator.request_stop(),
            ToggleCommand::Start => self.coordinator.request_start(),
        };
        self.pending = None;
        self.refresh();
    }
}

pub fn ui_renderer(mut coordinator: AclCoordinator) -> Result<()> {
    coordinator.detect();

    // Terminal initialization
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(coordinator);

    let result = run(&mut terminal, &mut app);

    // Cleanup and restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        if app.last_refresh.elapsed() >= REFRESH_INTERVAL {
            app.refresh();
        }

        terminal.draw(|f| draw(f, app))?;

        match handle_events()? {
            Action::Quit => return Ok(()),
            Action::Rescan => {
                app.coordinator.detect();
                app.refresh();
            }
            Action::Toggle(command) => {
                app.pending = Some(match command {
                    ToggleCommand::Stop => "Stopping ACL...".to_string(),
                    ToggleCommand::Start => "Starting ACL...".to_string(),
                });
                // Show the pending message before the request blocks
                terminal.draw(|f| draw(f, app))?;
                app.toggle(command);
            }
            Action::Nothing => {}
        }
    }
}

fn draw(f: &mut Frame, app: &App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),  // Title
            Constraint::Length(3),  // Status
            Constraint::Min(5),     // Group members
            Constraint::Length(3),  // Commands
            Constraint::Length(4),  // Instructions
        ])
        .split(size);

    let title = Paragraph::new(vec![
        Line::from(Span::styled("ACL Manager", Style::default().fg(Color::White).add_modifier(Modifier::BOLD))),
        Line::from(Span::styled(
            format!("Android Compatibility Layer Control @ {}", app.host),
            Style::default().fg(Color::Gray),
        )),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    draw_status(f, chunks[1], app);
    draw_members(f, chunks[2], app);

    let commands = Paragraph::new(Line::from(vec![
        Span::styled("Commands: ", Style::default().fg(Color::White)),
        Span::styled("[s] Stop ACL  ", Style::default().fg(Color::Red)),
        Span::styled("[r] Start ACL  ", Style::default().fg(Color::Green)),
        Span::styled("[F5] Rescan  ", Style::default().fg(Color::Cyan)),
        Span::styled("[q/Esc] Exit", Style::default().fg(Color::Blue)),
    ]))
    .block(Block::default().borders(Borders::ALL))
    .alignment(Alignment::Left);
    f.render_widget(commands, chunks[3]);

    let instructions = Paragraph::new(vec![
        Line::from("Stop ACL before running apps with compatibility issues"),
        Line::from("Start ACL again when done to restore Android app support"),
    ])
    .style(Style::default().fg(Color::Gray))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(instructions, chunks[4]);
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let status = app.coordinator.status();
    let line = match &app.pending {
        Some(msg) => Line::from(Span::styled(msg.as_str(), Style::default().fg(Color::Yellow))),
        None => {
            let color = if status.running { Color::Green } else { Color::Red };
            Line::from(vec![
                Span::styled(status.message.as_str(), Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::styled(
                    format!("  ({})", status.updated_at.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        }
    };
    let widget = Paragraph::new(line)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(format!("Status: {:?}", status.state)));
    f.render_widget(widget, area);
}

fn draw_members(f: &mut Frame, area: Rect, app: &App) {
    let headers = ["PID", "PROGRAM", "STATE", "CPU%", "MEM(MB)"];
    let header_cells = headers
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::Blue))
        .height(1);

    let rows: Vec<Row> = app
        .members
        .iter()
        .map(|record| {
            let usage = app.system.process(Pid::from_u32(record.pid as u32));
            let cpu = usage.map(|p| format!("{:.1}%", p.cpu_usage())).unwrap_or_else(|| "-".to_string());
            let memory = usage
                .map(|p| format!("{}", p.memory() / (1024 * 1024)))
                .unwrap_or_else(|| "-".to_string());

            Row::new(vec![
                Cell::from(record.pid.to_string()).style(Style::default().fg(Color::Cyan)),
                Cell::from(record.program()).style(Style::default().fg(Color::Green)),
                Cell::from(record.state_name()).style(get_state_style(record.state)),
                Cell::from(cpu),
                Cell::from(memory),
            ])
        })
        .collect();

    let title = if app.members.is_empty() {
        "ACL processes (none found)".to_string()
    } else {
        format!("ACL processes ({})", app.members.len())
    };
    let table = Table::new(rows)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .widths(&[
            Constraint::Length(8),   // PID
            Constraint::Length(24),  // PROGRAM
            Constraint::Length(12),  // STATE
            Constraint::Length(8),   // CPU%
            Constraint::Length(10),  // MEM(MB)
        ]);
    f.render_widget(table, area);
}

fn get_state_style(state: RunState) -> Style {
    match state {
        RunState::Running => Style::default().fg(Color::Green),
        RunState::Stopped => Style::default().fg(Color::Yellow),
        RunState::Unknown => Style::default().fg(Color::White),
    }
}

fn handle_events() -> Result<Action> {
    if event::poll(Duration::from_millis(100))? {
        if let Event::Key(key) = event::read()? {
            return Ok(key_action(key));
        }
    }
    Ok(Action::Nothing)
}

fn key_action(key: KeyEvent) -> Action {
    let action = match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
        KeyCode::Char('s') | KeyCode::Char('S') => Action::Toggle(ToggleCommand::Stop),
        KeyCode::Char('r') | KeyCode::Char('R') => Action::Toggle(ToggleCommand::Start),
        KeyCode::F(5) => Action::Rescan,
        _ => Action::Nothing,
    };
    if action != Action::Nothing {
        debug!("key {:?}", key.code);
    }
    action
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_key_bindings() {
        assert!(key_action(key(KeyCode::Char('s'))) == Action::Toggle(ToggleCommand::Stop));
        assert!(key_action(key(KeyCode::Char('r'))) == Action::Toggle(ToggleCommand::Start));
        assert!(key_action(key(KeyCode::Esc)) == Action::Quit);
        assert!(key_action(key(KeyCode::Char('q'))) == Action::Quit);
        assert!(key_action(key(KeyCode::F(5))) == Action::Rescan);
        assert!(key_action(key(KeyCode::Char('x'))) == Action::Nothing);
    }
}
