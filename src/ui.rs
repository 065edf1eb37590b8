use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use fueleu_ledger::{
    BankEntry, BankRecord, ComparisonRow, ComplianceError, ComplianceService, Route,
    ShipCompliance,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Routes,
    Comparison,
    Compliance,
    Banking,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Routes, Page::Comparison, Page::Compliance, Page::Banking];

    pub fn next(&self) -> Self {
        match self {
            Page::Routes => Page::Comparison,
            Page::Comparison => Page::Compliance,
            Page::Compliance => Page::Banking,
            Page::Banking => Page::Routes,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Routes => Page::Banking,
            Page::Comparison => Page::Routes,
            Page::Compliance => Page::Comparison,
            Page::Banking => Page::Compliance,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Routes => "Routes",
            Page::Comparison => "Compare",
            Page::Compliance => "Compliance",
            Page::Banking => "Banking",
        }
    }

    fn headers(&self) -> &'static [&'static str] {
        match self {
            Page::Routes => &["Route", "Vessel", "Fuel", "Year", "gCO2e/MJ", "Fuel (t)", "Baseline"],
            Page::Comparison => &["Route", "Year", "Baseline", "gCO2e/MJ", "Base", "Diff %", "Compliant"],
            Page::Compliance => &["Ship", "Year", "Raw CB (g)", "Adjusted (g)", "Status"],
            Page::Banking => &["#", "Ship", "Year", "Amount (g)", "Movement", "Created"],
        }
    }
}

/// One table row of the dashboard
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Route(Route),
    Comparison(ComparisonRow),
    Compliance {
        snapshot: ShipCompliance,
        balance: BankRecord,
    },
    Bank(BankEntry),
}

impl Record {
    fn cells(&self) -> Vec<Cell<'static>> {
        match self {
            Record::Route(route) => vec![
                Cell::from(route.route_id.clone()),
                Cell::from(truncate(&route.vessel_type, 14)),
                Cell::from(route.fuel_type.clone()),
                Cell::from(route.year.to_string()),
                Cell::from(format!("{:.2}", route.ghg_intensity)),
                Cell::from(format!("{:.1}", route.fuel_consumption)),
                if route.is_baseline {
                    Cell::from("★").style(Style::default().fg(Color::Yellow))
                } else {
                    Cell::from("")
                },
            ],
            Record::Comparison(row) => {
                let color = if row.compliant { Color::Green } else { Color::Red };
                vec![
                    Cell::from(row.route_id.clone()),
                    Cell::from(row.year.to_string()),
                    Cell::from(row.baseline_route_id.clone()),
                    Cell::from(format!("{:.2}", row.ghg_intensity)),
                    Cell::from(format!("{:.2}", row.baseline_intensity)),
                    Cell::from(format!("{:+.2}", row.percent_diff)).style(Style::default().fg(color)),
                    Cell::from(if row.compliant { "✓" } else { "✗" }).style(Style::default().fg(color)),
                ]
            }
            Record::Compliance { snapshot, balance } => vec![
                Cell::from(snapshot.ship_id.clone()),
                Cell::from(snapshot.year.to_string()),
                Cell::from(format!("{:.0}", snapshot.cb_gco2eq)),
                Cell::from(format!("{:.0}", balance.balance))
                    .style(Style::default().fg(balance_color(balance.balance))),
                Cell::from(balance_label(balance.balance)),
            ],
            Record::Bank(entry) => vec![
                Cell::from(entry.id.to_string()),
                Cell::from(entry.ship_id.clone()),
                Cell::from(entry.year.to_string()),
                Cell::from(format!("{:.0}", entry.amount_gco2eq))
                    .style(Style::default().fg(balance_color(entry.amount_gco2eq))),
                Cell::from(if entry.is_banking() { "banked" } else { "applied" }),
                Cell::from(entry.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ],
        }
    }

    /// Label/value pairs for the detail panel
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Record::Route(route) => vec![
                ("Route", route.route_id.clone()),
                ("Vessel", route.vessel_type.clone()),
                ("Fuel", route.fuel_type.clone()),
                ("Year", route.year.to_string()),
                ("GHG intensity", format!("{:.4} gCO2e/MJ", route.ghg_intensity)),
                ("Fuel consumption", format!("{:.1} t", route.fuel_consumption)),
                ("Distance", format!("{:.0} km", route.distance)),
                ("Total emissions", format!("{:.1} t", route.total_emissions)),
                ("Baseline", yes_no(route.is_baseline)),
            ],
            Record::Comparison(row) => vec![
                ("Route", row.route_id.clone()),
                ("Year", row.year.to_string()),
                ("Baseline route", row.baseline_route_id.clone()),
                ("GHG intensity", format!("{:.4}", row.ghg_intensity)),
                ("Baseline intensity", format!("{:.4}", row.baseline_intensity)),
                ("Difference", format!("{:+.2} %", row.percent_diff)),
                ("Compliant", yes_no(row.compliant)),
            ],
            Record::Compliance { snapshot, balance } => vec![
                ("Ship", snapshot.ship_id.clone()),
                ("Year", snapshot.year.to_string()),
                ("Raw CB", format!("{:.2} gCO2e", snapshot.cb_gco2eq)),
                ("Adjusted CB", format!("{:.2} gCO2e", balance.balance)),
                ("Status", balance_label(balance.balance).to_string()),
            ],
            Record::Bank(entry) => vec![
                ("Entry", entry.id.to_string()),
                ("Ship", entry.ship_id.clone()),
                ("Year", entry.year.to_string()),
                ("Amount", format!("{:.2} gCO2e", entry.amount_gco2eq)),
                ("Created", entry.created_at.to_rfc3339()),
            ],
        }
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

fn balance_label(balance: f64) -> &'static str {
    if balance > 0.0 {
        "surplus"
    } else if balance < 0.0 {
        "deficit"
    } else {
        "balanced"
    }
}

fn balance_color(value: f64) -> Color {
    if value > 0.0 {
        Color::Green
    } else if value < 0.0 {
        Color::Red
    } else {
        Color::White
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusMessage {
    Info(String),
    Warning(String),
    Error(String),
}

impl StatusMessage {
    fn from_error(err: &ComplianceError) -> Self {
        match err {
            ComplianceError::NotFound(_)
            | ComplianceError::InvalidState(_)
            | ComplianceError::Validation(_) => StatusMessage::Warning(err.to_string()),
            ComplianceError::Database(_) | ComplianceError::Unexpected(_) => {
                tracing::error!(error = %err, "dashboard action failed");
                StatusMessage::Error("Internal error, see logs".to_string())
            }
        }
    }
}

pub struct App {
    pub service: ComplianceService,
    pub records: Vec<Record>,
    pub state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub status: Option<StatusMessage>,
}

impl App {
    pub fn new(service: ComplianceService) -> Self {
        let mut app = Self {
            service,
            records: Vec::new(),
            state: TableState::default(),
            current_page: Page::Routes,
            show_detail: false,
            status: None,
        };
        app.reload();
        app
    }

    fn load(&self, page: Page) -> fueleu_ledger::Result<Vec<Record>> {
        let records = match page {
            Page::Routes => self
                .service
                .list_routes()?
                .into_iter()
                .map(Record::Route)
                .collect(),
            Page::Comparison => match self.service.comparison(None) {
                Ok(rows) => rows.into_iter().map(Record::Comparison).collect(),
                Err(ComplianceError::NotFound(_)) => Vec::new(),
                Err(err) => return Err(err),
            },
            Page::Compliance => {
                let mut records = Vec::new();
                for snapshot in self.service.list_compliance()? {
                    let balance = self.service.get_balance(&snapshot.ship_id, snapshot.year)?;
                    records.push(Record::Compliance { snapshot, balance });
                }
                records
            }
            Page::Banking => self
                .service
                .list_bank_entries(None)?
                .into_iter()
                .map(Record::Bank)
                .collect(),
        };

        Ok(records)
    }

    /// Re-read the current page, keeping the selection where possible.
    pub fn reload(&mut self) {
        match self.load(self.current_page) {
            Ok(records) => self.records = records,
            Err(err) => {
                self.records.clear();
                self.status = Some(StatusMessage::from_error(&err));
            }
        }

        let selected = match (self.state.selected(), self.records.len()) {
            (_, 0) => None,
            (Some(i), len) => Some(i.min(len - 1)),
            (None, _) => Some(0),
        };
        self.state.select(selected);
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_record(&self) -> Option<&Record> {
        self.state.selected().and_then(|i| self.records.get(i))
    }

    pub fn next_page(&mut self) {
        self.go_to(self.current_page.next());
    }

    pub fn previous_page(&mut self) {
        self.go_to(self.current_page.previous());
    }

    fn go_to(&mut self, page: Page) {
        self.current_page = page;
        self.state.select(None);
        self.reload();
    }

    // ========================================================================
    // ACTIONS
    // ========================================================================

    /// `b`: baseline on the Routes page, bank on the Compliance page
    pub fn primary_action(&mut self) {
        let outcome = match self.selected_record().cloned() {
            Some(Record::Route(route)) => Some(
                self.service
                    .set_baseline(&route.route_id, Some(route.year))
                    .map(|r| format!("{} is now the {} baseline", r.route_id, r.year)),
            ),
            Some(Record::Compliance { snapshot, .. }) => Some(
                self.service
                    .bank_surplus(&snapshot.ship_id, snapshot.year)
                    .map(|r| format!("Banked surplus of {} {}; balance {:.0}", r.ship_id, r.year, r.balance)),
            ),
            Some(Record::Comparison(_)) | Some(Record::Bank(_)) | None => None,
        };

        self.finish(outcome);
    }

    /// `a`: apply banked surplus on the Compliance page
    pub fn apply_action(&mut self) {
        let outcome = match self.selected_record().cloned() {
            Some(Record::Compliance { snapshot, .. }) => Some(
                self.service
                    .apply_banked_surplus(&snapshot.ship_id, snapshot.year)
                    .map(|r| format!("Applied banked surplus to {} {}; balance {:.0}", r.ship_id, r.year, r.balance)),
            ),
            Some(Record::Route(_)) | Some(Record::Comparison(_)) | Some(Record::Bank(_)) | None => None,
        };

        self.finish(outcome);
    }

    fn finish(&mut self, outcome: Option<fueleu_ledger::Result<String>>) {
        match outcome {
            Some(Ok(message)) => {
                self.status = Some(StatusMessage::Info(message));
                self.reload();
            }
            Some(Err(err)) => self.status = Some(StatusMessage::from_error(&err)),
            None => {
                self.status = Some(StatusMessage::Warning(format!(
                    "No action on the {} page",
                    self.current_page.title()
                )))
            }
        }
    }

    // ========================================================================
    // NAVIGATION
    // ========================================================================

    pub fn next(&mut self) {
        let len = self.records.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i >= len - 1 => 0,
            Some(i) => i + 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.records.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) => len - 1,
            Some(i) => i - 1,
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.records.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map(|i| (i + 20).min(len - 1)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.records.is_empty() {
            return;
        }
        let i = self.state.selected().map(|i| i.saturating_sub(20)).unwrap_or(0);
        self.state.select(Some(i));
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats::default();

        for record in &self.records {
            match record {
                Record::Route(route) if route.is_baseline => stats.baselines += 1,
                Record::Route(_) => {}
                Record::Comparison(row) if row.compliant => stats.compliant += 1,
                Record::Comparison(_) => stats.non_compliant += 1,
                Record::Compliance { balance, .. } => stats.net_balance += balance.balance,
                Record::Bank(entry) if entry.is_banking() => stats.banked += entry.amount_gco2eq,
                Record::Bank(entry) => stats.applied += -entry.amount_gco2eq,
            }
        }

        stats
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct LedgerStats {
    pub baselines: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub net_balance: f64,
    pub banked: f64,
    pub applied: f64,
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

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::Char('b') => app.primary_action(),
                KeyCode::Char('a') => app.apply_action(),
                KeyCode::Char('r') => {
                    app.reload();
                    app.status = Some(StatusMessage::Info("Reloaded".to_string()));
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                KeyCode::Home if !app.records.is_empty() => app.state.select(Some(0)),
                KeyCode::End if !app.records.is_empty() => {
                    app.state.select(Some(app.records.len() - 1));
                }
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in Page::ALL.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    let stats = app.stats();
    tab_spans.push(Span::raw("  |  "));
    let summary = match app.current_page {
        Page::Routes => format!("{} routes, {} baselines", app.records.len(), stats.baselines),
        Page::Comparison => format!("✓ {}  ✗ {}", stats.compliant, stats.non_compliant),
        Page::Compliance => format!("Net adjusted CB: {:.0} g", stats.net_balance),
        Page::Banking => format!("Banked {:.0} g, applied {:.0} g", stats.banked, stats.applied),
    };
    tab_spans.push(Span::styled(summary, Style::default().fg(Color::White)));

    let header = Paragraph::new(vec![Line::from(tab_spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let headers = app.current_page.headers();

    let header_cells = headers.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.records.iter().map(|record| Row::new(record.cells()).height(1));

    let widths: Vec<Constraint> = headers.iter().map(|_| Constraint::Length(14)).collect();

    let title = if app.records.is_empty() {
        format!(" {} - nothing to show ", app.current_page.title())
    } else {
        format!(" {} ", app.current_page.title())
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(title),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.records.len()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = &app.status {
        let (text, color) = match status {
            StatusMessage::Info(text) => (text, Color::Green),
            StatusMessage::Warning(text) => (text, Color::Yellow),
            StatusMessage::Error(text) => (text, Color::Red),
        };
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(truncate(text, 70), Style::default().fg(color)));
    }

    let hints: &[(&str, &str)] = match app.current_page {
        Page::Routes => &[("b", " Baseline")],
        Page::Compliance => &[("b", " Bank"), ("a", " Apply")],
        Page::Comparison | Page::Banking => &[],
    };
    for (key, label) in hints.iter().chain(&[("Tab", " Page"), ("r", " Reload"), ("q", " Quit")]) {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(*key, Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(*label));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Details ");

    let record = match app.selected_record() {
        Some(record) => record,
        None => {
            f.render_widget(Paragraph::new("Nothing selected").block(block), area);
            return;
        }
    };

    let mut content = vec![Line::from("")];
    for (label, value) in record.fields() {
        content.push(Line::from(vec![
            Span::styled(
                format!("  {}: ", label),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::raw(value),
        ]));
    }
    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
