use anyhow::Result;
use crossterm::{
    event::{
        self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;
use tokio::sync::watch;

use crate::models::TimerMode;
use crate::service::{ServiceHandle, Snapshot, UserCommand};

mod form;
mod icon;

pub use form::{SettingsForm, FIELD_LABELS};
pub use icon::render_icon;

/// 菜单层级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Main,
    Modes,
    Tasks,
    TaskActions(usize),
}

/// 对话框类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    None,
    AddTask(String),
    Settings(SettingsForm),
    Help,
}

/// 菜单项被激活时的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    Send(UserCommand),
    Open(View),
    PromptTask,
    OpenSettings,
    Back,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: String,
    pub action: MenuAction,
}

impl MenuEntry {
    fn new(label: impl Into<String>, action: MenuAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// 构建当前层级的菜单项
pub fn menu_entries(snapshot: &Snapshot, view: View) -> Vec<MenuEntry> {
    match view {
        View::Main => vec![
            MenuEntry::new("Start", MenuAction::Send(UserCommand::Start)),
            MenuEntry::new("Pause", MenuAction::Send(UserCommand::Pause)),
            MenuEntry::new("Reset", MenuAction::Send(UserCommand::Reset)),
            MenuEntry::new("Mode ▸", MenuAction::Open(View::Modes)),
            MenuEntry::new(
                format!("Tasks ({}) ▸", snapshot.tasks.len()),
                MenuAction::Open(View::Tasks),
            ),
            MenuEntry::new("Settings...", MenuAction::OpenSettings),
            MenuEntry::new("Quit", MenuAction::Quit),
        ],
        View::Modes => {
            let mut entries: Vec<MenuEntry> = TimerMode::ALL
                .iter()
                .map(|&mode| {
                    let marker = if mode == snapshot.mode { "• " } else { "  " };
                    MenuEntry::new(
                        format!("{}{}", marker, mode.label()),
                        MenuAction::Send(UserCommand::SetMode(mode)),
                    )
                })
                .collect();
            entries.push(MenuEntry::new("◂ Back", MenuAction::Back));
            entries
        }
        View::Tasks => {
            let mut entries = vec![MenuEntry::new("Add Task...", MenuAction::PromptTask)];
            entries.extend(snapshot.tasks.iter().enumerate().map(|(i, task)| {
                let prefix = if task.completed { "✓ " } else { "○ " };
                MenuEntry::new(
                    format!("{}{}", prefix, task.name),
                    MenuAction::Open(View::TaskActions(i)),
                )
            }));
            entries.push(MenuEntry::new("◂ Back", MenuAction::Back));
            entries
        }
        View::TaskActions(index) => vec![
            MenuEntry::new(
                "Complete/Uncomplete",
                MenuAction::Send(UserCommand::ToggleTask(index)),
            ),
            MenuEntry::new("Delete", MenuAction::Send(UserCommand::DeleteTask(index))),
            MenuEntry::new("◂ Back", MenuAction::Back),
        ],
    }
}

/// 应用状态
pub struct App {
    pub snapshot: Snapshot,
    pub view: View,
    pub menu_state: ListState,
    pub dialog: Dialog,
    pub error: Option<String>,
    pub status_message: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(snapshot: Snapshot) -> Self {
        let mut menu_state = ListState::default();
        menu_state.select(Some(0));

        Self {
            snapshot,
            view: View::Main,
            menu_state,
            dialog: Dialog::None,
            error: None,
            status_message: None,
            should_quit: false,
        }
    }

    pub fn entries(&self) -> Vec<MenuEntry> {
        menu_entries(&self.snapshot, self.view)
    }

    /// 服务发布了新状态
    pub fn sync(&mut self, snapshot: Snapshot) {
        self.snapshot = snapshot;

        if let View::TaskActions(index) = self.view {
            if index >= self.snapshot.tasks.len() {
                self.enter(View::Tasks);
            }
        }

        let len = self.entries().len();
        if let Some(i) = self.menu_state.selected() {
            if i >= len {
                self.menu_state.select(Some(len.saturating_sub(1)));
            }
        }
    }

    pub fn next_entry(&mut self) {
        let len = self.entries().len();
        if len == 0 {
            return;
        }
        let i = match self.menu_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.menu_state.select(Some(i));
    }

    pub fn previous_entry(&mut self) {
        let len = self.entries().len();
        if len == 0 {
            return;
        }
        let i = match self.menu_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.menu_state.select(Some(i));
    }

    fn enter(&mut self, view: View) {
        self.view = view;
        self.menu_state.select(Some(0));
    }

    fn back(&mut self) {
        match self.view {
            View::Main => {}
            View::Modes | View::Tasks => self.enter(View::Main),
            View::TaskActions(_) => self.enter(View::Tasks),
        }
    }

    fn quit(&mut self) -> Option<UserCommand> {
        self.should_quit = true;
        Some(UserCommand::Quit)
    }

    fn prompt_task(&mut self) {
        self.dialog = Dialog::AddTask(String::new());
    }

    fn open_settings(&mut self) {
        self.dialog = Dialog::Settings(SettingsForm::from_settings(&self.snapshot.settings));
    }

    /// 激活选中的菜单项, 需要发给服务的命令作为返回值
    pub fn activate(&mut self) -> Option<UserCommand> {
        let entry = self
            .menu_state
            .selected()
            .and_then(|i| self.entries().into_iter().nth(i))?;

        match entry.action {
            MenuAction::Send(command) => {
                match self.view {
                    View::Modes => self.enter(View::Main),
                    View::TaskActions(_) => self.enter(View::Tasks),
                    View::Main | View::Tasks => {}
                }
                Some(command)
            }
            MenuAction::Open(view) => {
                self.enter(view);
                None
            }
            MenuAction::PromptTask => {
                self.prompt_task();
                None
            }
            MenuAction::OpenSettings => {
                self.open_settings();
                None
            }
            MenuAction::Back => {
                self.back();
                None
            }
            MenuAction::Quit => self.quit(),
        }
    }
}

/// 运行菜单界面, 直到用户退出或服务结束
pub fn run_app(handle: &ServiceHandle) -> Result<()> {
    // 设置终端
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, event::EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut snapshots = handle.snapshots();
    let mut app = App::new(snapshots.borrow_and_update().clone());

    // 主循环
    let res = run_ui_loop(&mut terminal, &mut app, handle, &mut snapshots);

    // 恢复终端
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        event::DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

/// UI主循环
fn run_ui_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    handle: &ServiceHandle,
    snapshots: &mut watch::Receiver<Snapshot>,
) -> Result<()> {
    loop {
        match snapshots.has_changed() {
            Ok(true) => app.sync(snapshots.borrow_and_update().clone()),
            Ok(false) => {}
            Err(_) => {
                tracing::warn!("Timer service went away, closing menu");
                break;
            }
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            let command = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key_event(app, key),
                Event::Mouse(mouse) => {
                    handle_mouse_event(app, mouse);
                    None
                }
                _ => None,
            };

            if let Some(command) = command {
                if !handle.send(command) {
                    tracing::warn!("Timer service is not accepting commands");
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// 处理键盘事件
pub fn handle_key_event(app: &mut App, key: KeyEvent) -> Option<UserCommand> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return app.quit();
    }

    // 错误提示是模态的, 任意键关闭后回到原对话框
    if app.error.is_some() {
        app.error = None;
        return None;
    }

    match app.dialog {
        Dialog::AddTask(_) => handle_prompt_key(app, key.code),
        Dialog::Settings(_) => handle_form_key(app, key.code),
        Dialog::Help => {
            app.dialog = Dialog::None;
            None
        }
        Dialog::None => handle_menu_key(app, key.code),
    }
}

fn handle_menu_key(app: &mut App, key: KeyCode) -> Option<UserCommand> {
    app.status_message = None;

    match key {
        KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),

        KeyCode::Down | KeyCode::Char('j') => {
            app.next_entry();
            None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.previous_entry();
            None
        }
        KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') => {
            app.activate()
        }
        KeyCode::Esc | KeyCode::Left | KeyCode::Char('h') | KeyCode::Backspace => {
            app.back();
            None
        }

        // 快捷键
        KeyCode::Char('s') => Some(UserCommand::Start),
        KeyCode::Char('p') => Some(UserCommand::Pause),
        KeyCode::Char('r') => Some(UserCommand::Reset),
        KeyCode::Char('1') => Some(UserCommand::SetMode(TimerMode::Pomodoro)),
        KeyCode::Char('2') => Some(UserCommand::SetMode(TimerMode::ShortBreak)),
        KeyCode::Char('3') => Some(UserCommand::SetMode(TimerMode::LongBreak)),
        KeyCode::Char('a') | KeyCode::Char('n') => {
            app.prompt_task();
            None
        }
        KeyCode::Char('o') | KeyCode::Char(',') => {
            app.open_settings();
            None
        }
        KeyCode::Char('?') => {
            app.dialog = Dialog::Help;
            None
        }
        _ => None,
    }
}

fn handle_prompt_key(app: &mut App, key: KeyCode) -> Option<UserCommand> {
    let Dialog::AddTask(input) = &mut app.dialog else {
        return None;
    };

    match key {
        KeyCode::Esc => {
            app.dialog = Dialog::None;
            None
        }
        KeyCode::Enter => {
            let name = std::mem::take(input);
            app.dialog = Dialog::None;
            if name.trim().is_empty() {
                return None;
            }
            app.status_message = Some(format!("Added task: {}", name.trim()));
            Some(UserCommand::AddTask(name))
        }
        KeyCode::Char(c) => {
            input.push(c);
            None
        }
        KeyCode::Backspace => {
            input.pop();
            None
        }
        _ => None,
    }
}

fn handle_form_key(app: &mut App, key: KeyCode) -> Option<UserCommand> {
    let current = app.snapshot.settings;
    let Dialog::Settings(form) = &mut app.dialog else {
        return None;
    };

    match key {
        KeyCode::Esc => {
            app.dialog = Dialog::None;
            None
        }
        KeyCode::Enter => match form.parse(&current) {
            Ok(settings) => {
                app.dialog = Dialog::None;
                app.status_message = Some("Settings saved".to_string());
                Some(UserCommand::SaveSettings(settings))
            }
            Err(e) => {
                app.error = Some(format!(
                    "Please enter valid numbers for all settings.\n{}",
                    e
                ));
                None
            }
        },
        KeyCode::Tab | KeyCode::Down => {
            form.next_field();
            None
        }
        KeyCode::BackTab | KeyCode::Up => {
            form.previous_field();
            None
        }
        KeyCode::Char(c) => {
            form.push(c);
            None
        }
        KeyCode::Backspace => {
            form.pop();
            None
        }
        _ => None,
    }
}

/// 处理鼠标事件
fn handle_mouse_event(app: &mut App, mouse: MouseEvent) {
    if app.dialog != Dialog::None {
        return;
    }
    match mouse.kind {
        MouseEventKind::ScrollDown => app.next_entry(),
        MouseEventKind::ScrollUp => app.previous_entry(),
        _ => {}
    }
}

/// 渲染UI
fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // 标题
            Constraint::Min(0),    // 菜单
            Constraint::Length(1), // 状态栏
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_menu(f, app, chunks[1]);
    render_status_bar(f, app, chunks[2]);

    match &app.dialog {
        Dialog::None => {}
        Dialog::AddTask(input) => render_prompt(f, input),
        Dialog::Settings(form) => render_settings(f, form),
        Dialog::Help => render_help(f),
    }

    if let Some(error) = &app.error {
        render_error(f, error);
    }
}

/// 渲染标题: 模式图标, 剩余时间, 进度
fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let snapshot = &app.snapshot;
    let icon = render_icon(snapshot.mode);

    let state_text = if snapshot.running {
        "▶ running"
    } else {
        "⏸ paused"
    };

    let filled = ((snapshot.progress / 5.0) as usize).min(20);
    let progress_bar = format!(
        "[{}{}] {:.0}%",
        "█".repeat(filled),
        " ".repeat(20 - filled),
        snapshot.progress
    );

    let content = vec![
        Line::from(vec![
            Span::styled(icon.glyph, Style::default().fg(icon.color)),
            Span::raw(" "),
            Span::styled(
                snapshot.title(),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(state_text, Style::default().fg(Color::Yellow)),
            Span::raw(format!("  🍅 x{}", snapshot.settings.pomodoro_count)),
        ]),
        Line::from(progress_bar),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default().borders(Borders::ALL).title("Pomodoro"))
        .alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn render_menu(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .entries()
        .into_iter()
        .map(|entry| ListItem::new(entry.label))
        .collect();

    let title = match app.view {
        View::Main => "Menu".to_string(),
        View::Modes => "Mode".to_string(),
        View::Tasks => format!("Tasks ({})", app.snapshot.tasks.len()),
        View::TaskActions(i) => app
            .snapshot
            .tasks
            .get(i)
            .map(|task| format!("Task: {}", task.name))
            .unwrap_or_else(|| "Task".to_string()),
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .title_bottom("j/k:move | Enter:select | Esc:back | ?:help"),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    f.render_stateful_widget(list, area, &mut app.menu_state);
}

/// 渲染状态栏
fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let status = app
        .status_message
        .clone()
        .unwrap_or_else(|| "s:start | p:pause | r:reset | 1/2/3:mode | a:add task | q:quit".to_string());

    let status_bar = Paragraph::new(status)
        .style(Style::default().bg(Color::DarkGray).fg(Color::White))
        .block(Block::default());
    f.render_widget(status_bar, area);
}

fn render_prompt(f: &mut Frame, input: &str) {
    let content = vec![
        Line::from(""),
        Line::from("Enter a new task:"),
        Line::from(""),
        Line::from(Span::styled(input, Style::default().fg(Color::Yellow))),
        Line::from(""),
        Line::from("Enter:confirm | Esc:cancel"),
    ];
    render_dialog(f, "Add Task", content, 60, 40);
}

fn render_settings(f: &mut Frame, form: &SettingsForm) {
    let mut content = vec![Line::from("")];
    for (i, label) in FIELD_LABELS.iter().enumerate() {
        let style = if i == form.focus {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        content.push(Line::from(vec![
            Span::raw(format!("{:<24}", label)),
            Span::styled(format!("[{:>6}]", form.fields[i]), style),
        ]));
    }
    content.push(Line::from(""));
    content.push(Line::from("Tab:next field | Enter:save | Esc:cancel"));

    render_dialog(f, "Settings", content, 60, 50);
}

fn render_help(f: &mut Frame) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let content = vec![
        Line::from(""),
        Line::from(Span::styled("Menu", bold)),
        Line::from("  j/k, ↓/↑  : move"),
        Line::from("  Enter/l   : select"),
        Line::from("  Esc/h     : back"),
        Line::from(""),
        Line::from(Span::styled("Timer", bold)),
        Line::from("  s / p / r : start / pause / reset"),
        Line::from("  1 / 2 / 3 : pomodoro / short break / long break"),
        Line::from(""),
        Line::from(Span::styled("Other", bold)),
        Line::from("  a         : add task"),
        Line::from("  o         : settings"),
        Line::from("  q         : quit"),
        Line::from(""),
        Line::from("Press any key to close"),
    ];
    render_dialog(f, "Keys", content, 60, 70);
}

fn render_error(f: &mut Frame, message: &str) {
    let mut content = vec![Line::from("")];
    content.extend(message.lines().map(|line| {
        Line::from(Span::styled(
            line.to_string(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ))
    }));
    content.push(Line::from(""));
    content.push(Line::from("Press any key to continue"));
    render_dialog(f, "Error", content, 50, 30);
}

/// 渲染对话框
fn render_dialog(f: &mut Frame, title: &str, content: Vec<Line>, percent_x: u16, percent_y: u16) {
    let area = centered_rect(percent_x, percent_y, f.area());

    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .style(Style::default().bg(Color::Black).fg(Color::White));

    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}

/// 居中矩形
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
