use anyhow::Result;
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use household_registry::{
    auth, handlers, AppConfig, Classification, Education, ExportFormat, Household, HouseholdForm,
    ImportReport, Occupation, Role, SavedHousehold, Session, SqliteStore, TierCounts, UserSummary,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    AddRecord,
    Import,
    ExportExcel,
    ExportPdf,
    Users,
    Logout,
}

impl Page {
    /// Menu entries visible to a session
    pub fn menu(is_admin: bool) -> Vec<Page> {
        let mut pages = vec![
            Page::Dashboard,
            Page::AddRecord,
            Page::Import,
            Page::ExportExcel,
            Page::ExportPdf,
        ];
        if is_admin {
            pages.push(Page::Users);
        }
        pages.push(Page::Logout);
        pages
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::AddRecord => "Add Record",
            Page::Import => "Import",
            Page::ExportExcel => "Export Excel",
            Page::ExportPdf => "Export PDF",
            Page::Users => "Users",
            Page::Logout => "Logout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Menu,
    Content,
}

#[derive(Debug, Default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub on_password: bool,
}

pub const ADD_FIELDS: [&str; 7] = [
    "Name",
    "Address",
    "Education",
    "Children",
    "Monthly income",
    "Occupation",
    "Photo (png/jpg path)",
];

const EDUCATION_FIELD: usize = 2;
const OCCUPATION_FIELD: usize = 5;

#[derive(Debug, Default)]
pub struct AddForm {
    pub name: String,
    pub address: String,
    pub education: usize,
    pub children: String,
    pub income: String,
    pub occupation: usize,
    pub photo: String,
    pub field: usize,
    pub last_saved: Option<SavedHousehold>,
}

impl AddForm {
    fn text_mut(&mut self) -> Option<&mut String> {
        match self.field {
            0 => Some(&mut self.name),
            1 => Some(&mut self.address),
            3 => Some(&mut self.children),
            4 => Some(&mut self.income),
            6 => Some(&mut self.photo),
            _ => None,
        }
    }

    fn value(&self, field: usize) -> String {
        match field {
            0 => self.name.clone(),
            1 => self.address.clone(),
            EDUCATION_FIELD => format!("◀ {} ▶", Education::ALL[self.education].label()),
            3 => self.children.clone(),
            4 => self.income.clone(),
            OCCUPATION_FIELD => format!("◀ {} ▶", Occupation::ALL[self.occupation].label()),
            _ => self.photo.clone(),
        }
    }

    fn cycle(&mut self, forward: bool) {
        let (idx, len) = match self.field {
            EDUCATION_FIELD => (&mut self.education, Education::ALL.len()),
            OCCUPATION_FIELD => (&mut self.occupation, Occupation::ALL.len()),
            _ => return,
        };
        *idx = if forward { (*idx + 1) % len } else { (*idx + len - 1) % len };
    }

    /// Blank numbers count as zero, like an untouched number input
    pub fn to_form(&self) -> household_registry::Result<HouseholdForm> {
        let children = parse_or_zero::<i64>(&self.children, "number of children")?;
        let income = parse_or_zero::<f64>(&self.income, "monthly income")?;
        let photo = self.photo.trim();

        Ok(HouseholdForm {
            name: self.name.clone(),
            address: self.address.clone(),
            education: Education::ALL[self.education].label().to_string(),
            num_children: children,
            monthly_income: income,
            occupation: Occupation::ALL[self.occupation].label().to_string(),
            photo: (!photo.is_empty()).then(|| PathBuf::from(photo)),
        })
    }
}

fn parse_or_zero<T: std::str::FromStr + Default>(raw: &str, what: &str) -> household_registry::Result<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(T::default());
    }
    raw.parse()
        .map_err(|_| household_registry::Error::InvalidInput(format!("{} must be a number", what)))
}

#[derive(Debug, Default)]
pub struct UserForm {
    pub username: String,
    pub password: String,
    pub admin: bool,
    pub field: usize,
}

pub struct App {
    pub store: SqliteStore,
    pub uploads_dir: PathBuf,
    pub exports_dir: PathBuf,
    pub session: Option<Session>,
    pub login: LoginForm,
    pub focus: Focus,
    pub menu_state: ListState,
    // Dashboard
    pub search: String,
    pub records: Vec<Household>,
    pub counts: TierCounts,
    pub table_state: TableState,
    pub pending_delete: Option<String>,
    /// Every stored name, for the delete picker
    pub delete_names: Vec<String>,
    // Other pages
    pub add_form: AddForm,
    pub import_path: String,
    pub import_report: Option<ImportReport>,
    pub export_note: String,
    pub last_export: Option<PathBuf>,
    pub users: Vec<UserSummary>,
    pub user_form: UserForm,
    // Status line
    pub status: String,
    pub status_is_error: bool,
}

impl App {
    pub fn new(store: SqliteStore, config: &AppConfig) -> Self {
        let mut menu_state = ListState::default();
        menu_state.select(Some(0));

        Self {
            store,
            uploads_dir: config.uploads_dir.clone(),
            exports_dir: config.exports_dir.clone(),
            session: None,
            login: LoginForm::default(),
            focus: Focus::Menu,
            menu_state,
            search: String::new(),
            records: Vec::new(),
            counts: TierCounts::default(),
            table_state: TableState::default(),
            pending_delete: None,
            delete_names: Vec::new(),
            add_form: AddForm::default(),
            import_path: String::new(),
            import_report: None,
            export_note: String::new(),
            last_export: None,
            users: Vec::new(),
            user_form: UserForm::default(),
            status: "Please log in".to_string(),
            status_is_error: false,
        }
    }

    pub fn menu(&self) -> Vec<Page> {
        Page::menu(self.session.as_ref().map(|s| s.is_admin()).unwrap_or(false))
    }

    pub fn current_page(&self) -> Page {
        let menu = self.menu();
        let idx = self.menu_state.selected().unwrap_or(0).min(menu.len() - 1);
        menu[idx]
    }

    fn info(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.status_is_error = false;
    }

    /// Show a handler error in the status line and swallow it
    fn check<T>(&mut self, result: household_registry::Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.status = e.to_string();
                self.status_is_error = true;
                None
            }
        }
    }

    pub fn selected_record(&self) -> Option<&Household> {
        self.table_state.selected().and_then(|i| self.records.get(i))
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    fn try_login(&mut self) {
        let result = auth::login(&self.store, &self.login.username, &self.login.password);
        self.login.password.clear();

        if let Some(session) = self.check(result) {
            let greeting = format!("Welcome, {}", session.username());
            self.session = Some(session);
            self.login = LoginForm::default();
            self.focus = Focus::Menu;
            self.menu_state.select(Some(0));
            self.refresh_dashboard();
            self.info(greeting);
        } else {
            self.login.on_password = true;
        }
    }

    fn logout(&mut self) {
        self.session = None;
        self.records.clear();
        self.delete_names.clear();
        self.counts = TierCounts::default();
        self.users.clear();
        self.search.clear();
        self.pending_delete = None;
        self.add_form = AddForm::default();
        self.import_report = None;
        self.focus = Focus::Menu;
        self.menu_state.select(Some(0));
        self.info("Logged out");
    }

    // ------------------------------------------------------------------------
    // Page actions
    // ------------------------------------------------------------------------

    pub fn refresh_dashboard(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        if let Some(view) = self.check(handlers::dashboard(&session, &self.store, &self.search)) {
            self.records = view.records;
            self.counts = view.counts;
            self.delete_names = view.names;
            let selected = match self.table_state.selected() {
                _ if self.records.is_empty() => None,
                Some(i) => Some(i.min(self.records.len() - 1)),
                None => Some(0),
            };
            self.table_state.select(selected);
        }
    }

    fn confirm_delete(&mut self) {
        let (Some(session), Some(name)) = (self.session.clone(), self.pending_delete.take()) else {
            return;
        };
        if let Some(removed) = self.check(handlers::delete_by_name(&session, &self.store, &name)) {
            self.refresh_dashboard();
            self.info(format!("Deleted {} record(s) named '{}'", removed, name));
        }
    }

    fn save_record(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let Some(form) = self.check(self.add_form.to_form()) else {
            return;
        };
        let result = handlers::add_household(&session, &self.store, &self.uploads_dir, &form);
        if let Some(saved) = self.check(result) {
            let message = format!(
                "Saved '{}': score {} → {}",
                saved.record.name,
                saved.breakdown.total(),
                saved.record.classification
            );
            self.add_form = AddForm {
                last_saved: Some(saved),
                ..AddForm::default()
            };
            self.refresh_dashboard();
            self.info(message);
        }
    }

    fn run_import(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let path = PathBuf::from(self.import_path.trim());
        if let Some(report) = self.check(handlers::import_file(&session, &self.store, &path)) {
            let summary = report.summary();
            self.import_report = Some(report);
            self.refresh_dashboard();
            self.info(summary);
        }
    }

    fn run_export(&mut self, format: ExportFormat) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let today = Local::now().date_naive();
        let result = handlers::export(&session, &self.store, format, &self.exports_dir, today);
        if let Some(path) = self.check(result) {
            let note = self.export_note.trim();
            let message = if note.is_empty() {
                format!("Saved {}", path.display())
            } else {
                format!("Saved {} ({})", path.display(), note)
            };
            self.last_export = Some(path);
            self.export_note.clear();
            self.info(message);
        }
    }

    fn refresh_users(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        if let Some(users) = self.check(handlers::users(&session, &self.store)) {
            self.users = users;
        }
    }

    fn create_user(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let role = if self.user_form.admin { Role::Admin } else { Role::User };
        let result = handlers::add_user(
            &session,
            &self.store,
            &self.user_form.username,
            &self.user_form.password,
            role,
        );
        if let Some(user) = self.check(result) {
            self.user_form = UserForm::default();
            self.refresh_users();
            self.info(format!("User '{}' created ({})", user.username, user.role));
        }
    }

    // ------------------------------------------------------------------------
    // Key handling
    // ------------------------------------------------------------------------

    /// Returns true when the app should exit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }

        if self.session.is_none() {
            return self.handle_login_key(key);
        }

        match self.focus {
            Focus::Menu => self.handle_menu_key(key),
            Focus::Content => {
                if key.code == KeyCode::Esc {
                    if self.pending_delete.take().is_some() {
                        self.info("Delete cancelled");
                    } else {
                        self.focus = Focus::Menu;
                    }
                } else {
                    self.handle_page_key(key);
                }
                false
            }
        }
    }

    fn handle_login_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => return true,
            KeyCode::Tab | KeyCode::Down | KeyCode::Up | KeyCode::BackTab => {
                self.login.on_password = !self.login.on_password;
            }
            KeyCode::Enter if !self.login.on_password => self.login.on_password = true,
            KeyCode::Enter => self.try_login(),
            _ => {
                let field = if self.login.on_password {
                    &mut self.login.password
                } else {
                    &mut self.login.username
                };
                edit_text(field, key);
            }
        }
        false
    }

    fn handle_menu_key(&mut self, key: KeyEvent) -> bool {
        let len = self.menu().len();
        let selected = self.menu_state.selected().unwrap_or(0);

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Down | KeyCode::Char('j') => self.menu_state.select(Some((selected + 1) % len)),
            KeyCode::Up | KeyCode::Char('k') => self.menu_state.select(Some((selected + len - 1) % len)),
            KeyCode::Enter | KeyCode::Right => self.open_page(),
            _ => {}
        }
        false
    }

    fn open_page(&mut self) {
        match self.current_page() {
            Page::Logout => return self.logout(),
            Page::Dashboard => self.refresh_dashboard(),
            Page::Users => self.refresh_users(),
            _ => {}
        }
        self.focus = Focus::Content;
    }

    fn handle_page_key(&mut self, key: KeyEvent) {
        match self.current_page() {
            Page::Dashboard => self.handle_dashboard_key(key),
            Page::AddRecord => self.handle_add_key(key),
            Page::Import => match key.code {
                KeyCode::Enter => self.run_import(),
                _ => {
                    edit_text(&mut self.import_path, key);
                }
            },
            Page::ExportExcel | Page::ExportPdf => match key.code {
                KeyCode::Enter if self.current_page() == Page::ExportExcel => {
                    self.run_export(ExportFormat::Xlsx)
                }
                KeyCode::Enter => self.run_export(ExportFormat::Pdf),
                _ => {
                    edit_text(&mut self.export_note, key);
                }
            },
            Page::Users => self.handle_users_key(key),
            Page::Logout => {}
        }
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) {
        if self.pending_delete.is_some() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.confirm_delete(),
                KeyCode::Char('n') | KeyCode::Char('N') => {
                    self.pending_delete = None;
                    self.info("Delete cancelled");
                }
                KeyCode::Left => self.cycle_delete_name(false),
                KeyCode::Right => self.cycle_delete_name(true),
                _ => {}
            }
            return;
        }

        let len = self.records.len();
        match key.code {
            KeyCode::Down if len > 0 => {
                let i = self.table_state.selected().map_or(0, |i| (i + 1) % len);
                self.table_state.select(Some(i));
            }
            KeyCode::Up if len > 0 => {
                let i = self.table_state.selected().map_or(0, |i| (i + len - 1) % len);
                self.table_state.select(Some(i));
            }
            KeyCode::Delete => match self.selected_record().map(|h| h.name.clone()) {
                Some(name) => {
                    self.info(format!("Delete ALL records named '{}'? (y/n)", name));
                    self.pending_delete = Some(name);
                }
                None => self.info("No record selected"),
            },
            _ => {
                if edit_text(&mut self.search, key) {
                    self.table_state.select(None);
                    self.refresh_dashboard();
                }
            }
        }
    }

    /// Move the pending delete to the previous/next stored name
    fn cycle_delete_name(&mut self, forward: bool) {
        let len = self.delete_names.len();
        let Some(current) = &self.pending_delete else {
            return;
        };
        if len == 0 {
            return;
        }

        let idx = match self.delete_names.iter().position(|n| n == current) {
            Some(i) if forward => (i + 1) % len,
            Some(i) => (i + len - 1) % len,
            None => 0,
        };
        let name = self.delete_names[idx].clone();
        self.info(format!("Delete ALL records named '{}'? (y/n)", name));
        self.pending_delete = Some(name);
    }

    fn handle_add_key(&mut self, key: KeyEvent) {
        let last = ADD_FIELDS.len() - 1;
        let ctrl_s = key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl_s || (key.code == KeyCode::Enter && self.add_form.field == last) {
            return self.save_record();
        }

        let form = &mut self.add_form;
        match key.code {
            KeyCode::Enter | KeyCode::Tab | KeyCode::Down => form.field = (form.field + 1).min(last),
            KeyCode::BackTab | KeyCode::Up => form.field = form.field.saturating_sub(1),
            KeyCode::Left => form.cycle(false),
            KeyCode::Right => form.cycle(true),
            _ => {
                if let Some(text) = form.text_mut() {
                    edit_text(text, key);
                }
            }
        }
    }

    fn handle_users_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Enter && self.user_form.field == 2 {
            return self.create_user();
        }

        let form = &mut self.user_form;
        match key.code {
            KeyCode::Enter | KeyCode::Tab | KeyCode::Down => form.field = (form.field + 1).min(2),
            KeyCode::BackTab | KeyCode::Up => form.field = form.field.saturating_sub(1),
            KeyCode::Left | KeyCode::Right if form.field == 2 => form.admin = !form.admin,
            _ => match form.field {
                0 => {
                    edit_text(&mut form.username, key);
                }
                1 => {
                    edit_text(&mut form.password, key);
                }
                _ => {}
            },
        }
    }
}

/// Apply a typing key to a text buffer; true if it changed
fn edit_text(buffer: &mut String, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            buffer.push(c);
            true
        }
        KeyCode::Backspace => buffer.pop().is_some(),
        _ => false,
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if app.handle_key(key) {
                return Ok(());
            }
        }
    }
}

pub fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.session.is_none() {
        render_login(f, chunks[1], app);
    } else {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(20), Constraint::Min(0)])
            .split(chunks[1]);

        render_menu(f, content_chunks[0], app);
        match app.current_page() {
            Page::Dashboard => render_dashboard(f, content_chunks[1], app),
            Page::AddRecord => render_add_record(f, content_chunks[1], app),
            Page::Import => render_import(f, content_chunks[1], app),
            Page::ExportExcel => render_export(f, content_chunks[1], app, ExportFormat::Xlsx),
            Page::ExportPdf => render_export(f, content_chunks[1], app, ExportFormat::Pdf),
            Page::Users => render_users(f, content_chunks[1], app),
            Page::Logout => render_logout(f, content_chunks[1]),
        }
    }

    render_status_bar(f, chunks[2], app);
}

fn content_block(title: &str, focused: bool) -> Block<'_> {
    let color = if focused { Color::Yellow } else { Color::White };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(format!(" {} ", title))
}

fn classification_color(c: Classification) -> Color {
    match c {
        Classification::Poor => Color::Red,
        Classification::Middle => Color::Yellow,
        Classification::Wealthy => Color::Green,
    }
}

fn input_line<'a>(label: &'a str, value: String, focused: bool) -> Line<'a> {
    let label_style = if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Cyan)
    };
    let cursor = if focused { "█" } else { "" };

    Line::from(vec![
        Span::styled(format!("  {:<22}", label), label_style),
        Span::raw(value),
        Span::styled(cursor, Style::default().fg(Color::Yellow)),
    ])
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        "Household Registry",
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )];

    if let Some(session) = &app.session {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(
            format!("{} ({})", session.username(), session.role()),
            Style::default().fg(Color::White),
        ));
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(
            format!("Total: {}", app.counts.total),
            Style::default().fg(Color::White),
        ));
        for (label, count, tier) in [
            ("Miskin", app.counts.poor, Classification::Poor),
            ("Menengah", app.counts.middle, Classification::Middle),
            ("Kaya", app.counts.wealthy, Classification::Wealthy),
        ] {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                format!("{}: {}", label, count),
                Style::default().fg(classification_color(tier)),
            ));
        }
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_login(f: &mut Frame, area: Rect, app: &App) {
    let popup = centered_rect(50, 9, area);
    let content = vec![
        Line::from(""),
        input_line("Username", app.login.username.clone(), !app.login.on_password),
        Line::from(""),
        input_line("Password", "*".repeat(app.login.password.chars().count()), app.login.on_password),
        Line::from(""),
        Line::from(Span::styled(
            "  Enter to log in, Esc to quit",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    ];

    f.render_widget(Clear, popup);
    f.render_widget(Paragraph::new(content).block(content_block("Login", true)), popup);
}

fn render_menu(f: &mut Frame, area: Rect, app: &mut App) {
    let items: Vec<ListItem> = app
        .menu()
        .iter()
        .map(|page| ListItem::new(page.title().to_string()))
        .collect();

    let list = List::new(items)
        .block(content_block("Menu", app.focus == Focus::Menu))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(list, area, &mut app.menu_state);
}

fn render_dashboard(f: &mut Frame, area: Rect, app: &mut App) {
    let focused = app.focus == Focus::Content;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let search = Paragraph::new(input_line("Search name", app.search.clone(), focused))
        .block(content_block("Dashboard", focused));
    f.render_widget(search, chunks[0]);

    let header_cells = [
        "Name", "Address", "Education", "Children", "Income", "Occupation", "Class", "Created",
    ]
    .iter()
    .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.records.iter().map(|h| {
        let color = classification_color(h.classification);
        Row::new(vec![
            Cell::from(truncate(&h.name, 20)),
            Cell::from(truncate(&h.address, 20)),
            Cell::from(h.education.clone()),
            Cell::from(h.num_children.to_string()),
            Cell::from(format!("{:.0}", h.monthly_income)),
            Cell::from(truncate(&h.occupation, 22)),
            Cell::from(h.classification.label()).style(Style::default().fg(color)),
            Cell::from(h.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ])
        .height(1)
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(20),
            Constraint::Length(14),
            Constraint::Length(8),
            Constraint::Length(12),
            Constraint::Length(22),
            Constraint::Length(9),
            Constraint::Length(16),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(format!(" Households ({}) ", app.records.len())),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[1], &mut app.table_state);

    if let Some(name) = &app.pending_delete {
        let popup = centered_rect(56, 6, area);
        let text = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("  Delete ALL records named ◀ '{}' ▶ ?  (y/n)", name),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "  ←/→ pick another name",
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )),
        ];
        f.render_widget(Clear, popup);
        f.render_widget(Paragraph::new(text).block(content_block("Confirm", true)), popup);
    }
}

fn render_add_record(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.focus == Focus::Content;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let mut lines = vec![Line::from("")];
    for (i, label) in ADD_FIELDS.iter().enumerate() {
        lines.push(input_line(label, app.add_form.value(i), focused && app.add_form.field == i));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  ←/→ change choice, Ctrl+S save",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));
    f.render_widget(Paragraph::new(lines).block(content_block("Add Record", focused)), chunks[0]);

    let mut result = vec![Line::from("")];
    match &app.add_form.last_saved {
        Some(saved) => {
            let b = &saved.breakdown;
            let tier = saved.record.classification;
            result.push(Line::from(format!("  {}", saved.record.name)));
            result.push(Line::from(""));
            for (label, points) in [
                ("Income", b.income),
                ("Education", b.education),
                ("Children", b.children),
                ("Occupation", b.occupation),
            ] {
                result.push(Line::from(format!("  {:<12}{:>5}", label, points)));
            }
            result.push(Line::from(format!("  {:<12}{:>5}", "Total", b.total())));
            result.push(Line::from(""));
            result.push(Line::from(Span::styled(
                format!("  {}", tier),
                Style::default().fg(classification_color(tier)).add_modifier(Modifier::BOLD),
            )));
        }
        None => result.push(Line::from(Span::styled(
            "  Nothing saved yet",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    f.render_widget(Paragraph::new(result).block(content_block("Classification", false)), chunks[1]);
}

fn render_import(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.focus == Focus::Content;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(9)])
        .split(area);

    let path = Paragraph::new(vec![
        input_line("File (.csv/.xlsx/.xls)", app.import_path.clone(), focused),
        Line::from(Span::styled(
            "  Columns: name, address, education, num_children, monthly_income, occupation",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .block(content_block("Import", focused));
    f.render_widget(path, chunks[0]);

    let Some(report) = &app.import_report else {
        return;
    };

    let mut lines = vec![Line::from(Span::styled(
        format!("  {}", report.summary()),
        Style::default().fg(Color::Green),
    ))];
    for warning in &report.warnings {
        lines.push(Line::from(Span::styled(
            format!("  Row {}: {}", warning.row, warning.message),
            Style::default().fg(Color::Red),
        )));
    }
    f.render_widget(Paragraph::new(lines).block(content_block("Result", false)), chunks[1]);

    let preview = &report.preview;
    let header = Row::new(preview.headers.iter().map(|h| Cell::from(h.clone())))
        .style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
    let rows = preview
        .rows
        .iter()
        .map(|row| Row::new(row.iter().map(|v| Cell::from(truncate(&cell_text(v), 18)))));
    let widths = vec![Constraint::Length(18); preview.headers.len().max(1)];

    let table = Table::new(rows, widths)
        .header(header)
        .block(content_block("Preview", false));
    f.render_widget(table, chunks[2]);
}

fn render_export(f: &mut Frame, area: Rect, app: &App, format: ExportFormat) {
    let focused = app.focus == Focus::Content;
    let title = match format {
        ExportFormat::Xlsx => "Export Excel",
        ExportFormat::Pdf => "Export PDF",
    };

    let mut lines = vec![
        Line::from(""),
        Line::from(format!("  Writes every record to {}", app.exports_dir.display())),
        Line::from(""),
        input_line("Note (optional)", app.export_note.clone(), focused),
        Line::from(""),
        Line::from(Span::styled(
            "  Enter to export",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    ];
    if let Some(path) = app.last_export.as_deref().filter(|p| has_extension(p, format)) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  Last file: {}", path.display()),
            Style::default().fg(Color::Green),
        )));
    }

    f.render_widget(Paragraph::new(lines).block(content_block(title, focused)), area);
}

fn render_users(f: &mut Frame, area: Rect, app: &App) {
    let focused = app.focus == Focus::Content;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(7)])
        .split(area);

    let header = Row::new(["ID", "Username", "Role", "Created"].map(Cell::from))
        .style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
    let rows = app.users.iter().map(|u| {
        Row::new(vec![
            Cell::from(u.id.to_string()),
            Cell::from(u.username.clone()),
            Cell::from(u.role.label()),
            Cell::from(u.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(20),
            Constraint::Length(8),
            Constraint::Length(18),
        ],
    )
    .header(header)
    .block(content_block("Users", false));
    f.render_widget(table, chunks[0]);

    let form = &app.user_form;
    let role = if form.admin { "◀ admin ▶" } else { "◀ user ▶" };
    let lines = vec![
        input_line("Username", form.username.clone(), focused && form.field == 0),
        input_line("Password", "*".repeat(form.password.chars().count()), focused && form.field == 1),
        input_line("Role", role.to_string(), focused && form.field == 2),
        Line::from(""),
        Line::from(Span::styled(
            "  Enter on Role to create",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )),
    ];
    f.render_widget(Paragraph::new(lines).block(content_block("New user", focused)), chunks[1]);
}

fn render_logout(f: &mut Frame, area: Rect) {
    let text = Paragraph::new("\n  Press Enter in the menu to end the session.")
        .block(content_block("Logout", false));
    f.render_widget(text, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let color = if app.status_is_error { Color::Red } else { Color::Green };
    let mut status_spans = vec![Span::styled(format!(" {} ", app.status), Style::default().fg(color))];

    let hints: &[(&str, &str)] = match (app.session.is_some(), app.focus) {
        (false, _) => &[("Tab", "Field"), ("Enter", "Login"), ("Esc", "Quit")],
        (true, Focus::Menu) => &[("↑/↓", "Nav"), ("Enter", "Open"), ("q", "Quit")],
        (true, Focus::Content) if app.current_page() == Page::Dashboard => {
            &[("type", "Search"), ("↑/↓", "Row"), ("Del", "Delete name"), ("Esc", "Menu")]
        }
        (true, Focus::Content) => &[("Tab", "Field"), ("Enter", "Submit"), ("Esc", "Menu")],
    };

    for (key, action) in hints {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(format!(" {}", action)));
    }

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn has_extension(path: &Path, format: ExportFormat) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(format.extension())
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use household_registry::{seed_admin, HouseholdStore};
    use ratatui::backend::TestBackend;
    use std::fs;
    use tempfile::TempDir;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
    }

    fn setup() -> (TempDir, App) {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::rooted_at(dir.path());
        let store = SqliteStore::new(config.database.clone());
        store.init().unwrap();
        seed_admin(&store, "admin", "admin123").unwrap();
        (dir, App::new(store, &config))
    }

    fn login(app: &mut App, username: &str, password: &str) {
        type_text(app, username);
        app.handle_key(key(KeyCode::Tab));
        type_text(app, password);
        app.handle_key(key(KeyCode::Enter));
    }

    fn open(app: &mut App, page: Page) {
        let idx = app.menu().iter().position(|p| *p == page).unwrap();
        app.focus = Focus::Menu;
        app.menu_state.select(Some(idx));
        app.handle_key(key(KeyCode::Enter));
    }

    fn screen(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| ui(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn test_login_success_and_failure() {
        let (_dir, mut app) = setup();

        login(&mut app, "admin", "wrong");
        assert!(app.session.is_none());
        assert!(app.status_is_error);
        assert_eq!(app.status, "Login failed: check username/password");
        assert!(app.login.password.is_empty());

        // Username stays, cursor is on the password field
        type_text(&mut app, "admin123");
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.session.as_ref().map(|s| s.username()), Some("admin"));
        assert!(!app.status_is_error);
    }

    #[test]
    fn test_password_is_masked_on_screen() {
        let (_dir, mut app) = setup();
        type_text(&mut app, "admin");
        app.handle_key(key(KeyCode::Tab));
        type_text(&mut app, "secret");

        let text = screen(&mut app);
        assert!(text.contains("Login"));
        assert!(text.contains("******"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_add_record_saves_and_shows_classification() {
        let (_dir, mut app) = setup();
        login(&mut app, "admin", "admin123");
        open(&mut app, Page::AddRecord);

        type_text(&mut app, "Siti");
        app.handle_key(key(KeyCode::Tab)); // address
        app.handle_key(key(KeyCode::Tab)); // education
        app.handle_key(key(KeyCode::Right)); // SD
        app.handle_key(key(KeyCode::Tab)); // children
        type_text(&mut app, "4");
        app.handle_key(key(KeyCode::Tab)); // income
        type_text(&mut app, "800000");
        app.handle_key(key(KeyCode::Tab)); // occupation
        app.handle_key(key(KeyCode::Right)); // laborer
        app.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));

        let stored = app.store.fetch_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].education, "SD");
        assert_eq!(stored[0].occupation, "Buruh / Tani / Pekerja kasar");
        assert_eq!(stored[0].classification, Classification::Poor);

        let saved = app.add_form.last_saved.as_ref().unwrap();
        assert_eq!(saved.breakdown.total(), 0);
        assert!(app.add_form.name.is_empty());
        assert!(screen(&mut app).contains("Miskin"));
    }

    #[test]
    fn test_add_record_bad_number_stays_on_page() {
        let (_dir, mut app) = setup();
        login(&mut app, "admin", "admin123");
        open(&mut app, Page::AddRecord);

        type_text(&mut app, "Budi");
        app.add_form.field = 3;
        type_text(&mut app, "dua");
        app.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));

        assert!(app.status_is_error);
        assert!(app.store.fetch_all().unwrap().is_empty());
        assert_eq!(app.add_form.name, "Budi");
    }

    #[test]
    fn test_dashboard_search_and_delete_confirmation() {
        let (dir, mut app) = setup();
        let csv = dir.path().join("warga.csv");
        fs::write(
            &csv,
            "name,education,num_children,monthly_income,occupation\n\
             Budi,SD,2,900000,Pengangguran\n\
             Siti,SMP,1,3000000,Wiraswasta kecil\n\
             Budi,SMA/SMK,0,5000000,Pegawai swasta\n",
        )
        .unwrap();

        login(&mut app, "admin", "admin123");
        open(&mut app, Page::Import);
        type_text(&mut app, csv.to_str().unwrap());
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.import_report.as_ref().unwrap().inserted, 3);

        open(&mut app, Page::Dashboard);
        assert_eq!(app.counts.total, 3);

        type_text(&mut app, "bud");
        assert_eq!(app.records.len(), 2);

        app.handle_key(key(KeyCode::Delete));
        assert_eq!(app.pending_delete.as_deref(), Some("Budi"));

        // The picker offers every stored name, not just the filtered rows
        assert_eq!(app.delete_names, vec!["Budi", "Siti"]);
        app.handle_key(key(KeyCode::Right));
        assert_eq!(app.pending_delete.as_deref(), Some("Siti"));
        app.handle_key(key(KeyCode::Left));
        assert_eq!(app.pending_delete.as_deref(), Some("Budi"));
        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.store.fetch_all().unwrap().len(), 3);

        app.handle_key(key(KeyCode::Delete));
        app.handle_key(key(KeyCode::Char('y')));
        let remaining = app.store.fetch_all().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "Siti");
        assert!(app.records.is_empty());
    }

    #[test]
    fn test_export_reports_no_data_then_writes_file() {
        let (_dir, mut app) = setup();
        login(&mut app, "admin", "admin123");

        open(&mut app, Page::ExportExcel);
        app.handle_key(key(KeyCode::Enter));
        assert!(app.status_is_error);
        assert_eq!(app.status, "No data yet");

        open(&mut app, Page::AddRecord);
        type_text(&mut app, "Budi");
        app.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL));

        open(&mut app, Page::ExportPdf);
        type_text(&mut app, "rapat RT");
        app.handle_key(key(KeyCode::Enter));
        let path = app.last_export.clone().unwrap();
        assert!(path.exists());
        assert!(app.status.ends_with("(rapat RT)"));
    }

    #[test]
    fn test_users_page_is_admin_only_and_logout() {
        let (_dir, mut app) = setup();
        login(&mut app, "admin", "admin123");
        assert!(app.menu().contains(&Page::Users));

        open(&mut app, Page::Users);
        type_text(&mut app, "petugas");
        app.handle_key(key(KeyCode::Tab));
        type_text(&mut app, "pw");
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.users.len(), 2);

        open(&mut app, Page::Logout);
        assert!(app.session.is_none());
        assert_eq!(app.status, "Logged out");

        login(&mut app, "petugas", "pw");
        assert!(app.session.is_some());
        assert!(!app.menu().contains(&Page::Users));
    }

    #[test]
    fn test_q_quits_only_from_menu() {
        let (_dir, mut app) = setup();
        login(&mut app, "admin", "admin123");
        open(&mut app, Page::Dashboard);

        assert!(!app.handle_key(key(KeyCode::Char('q'))));
        assert_eq!(app.search, "q");
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.focus, Focus::Menu);
        assert!(app.handle_key(key(KeyCode::Char('q'))));
    }
}
