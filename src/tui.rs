use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    text::Line,
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
};
use tokio::sync::{Mutex, mpsc};

use crate::analysis::{self, QueryError, QueryReport};
use crate::cache::CoinListCache;
use crate::history::{Action, HistoryRecord, HistoryStore};
use crate::market::{CoinSummary, FetchError, MarketClient, MAX_DAYS};
use crate::storage::{AppConfig, StorageDir};

// --- App State ---

enum AppEvent {
    Query(Result<QueryReport, QueryError>),
    Coins(Result<Vec<CoinSummary>, FetchError>),
    History(Result<Vec<HistoryRecord>>),
}

struct App {
    client: Arc<MarketClient>,
    history_store: Arc<HistoryStore>,
    cache: Arc<Mutex<CoinListCache>>,
    config: AppConfig,

    coins: Vec<CoinSummary>,
    keyword: String,
    search_mode: bool,
    selected: usize,
    days: u32,

    is_busy: bool,
    report: Option<QueryReport>,
    queried_at: Option<DateTime<Utc>>,
    message: Option<String>,

    show_history: bool,
    history: Vec<HistoryRecord>,
}

impl App {
    fn new(
        client: Arc<MarketClient>,
        history_store: Arc<HistoryStore>,
        cache: Arc<Mutex<CoinListCache>>,
        config: AppConfig,
        coins: Vec<CoinSummary>,
    ) -> Self {
        let days = config.days.clamp(1, MAX_DAYS);
        Self {
            client,
            history_store,
            cache,
            config,
            coins,
            keyword: String::new(),
            search_mode: false,
            selected: 0,
            days,
            is_busy: false,
            report: None,
            queried_at: None,
            message: None,
            show_history: false,
            history: Vec::new(),
        }
    }

    fn filtered(&self) -> Vec<&CoinSummary> {
        self.coins
            .iter()
            .filter(|c| c.matches(&self.keyword))
            .collect()
    }

    fn selected_coin(&self) -> Option<CoinSummary> {
        let filtered = self.filtered();
        filtered
            .get(self.selected.min(filtered.len().saturating_sub(1)))
            .map(|&c| c.clone())
    }

    fn apply_event(&mut self, event: AppEvent) {
        self.is_busy = false;
        match event {
            AppEvent::Query(Ok(report)) => {
                self.queried_at = Some(Utc::now());
                self.message = None;
                self.report = Some(report);
            }
            AppEvent::Query(Err(err)) => {
                self.message = Some(failure_message(&err));
            }
            AppEvent::Coins(Ok(coins)) => {
                self.coins = coins;
                self.selected = 0;
                self.message = None;
            }
            AppEvent::Coins(Err(err)) => {
                self.message = Some(failure_message(&QueryError::Fetch(err)));
            }
            AppEvent::History(Ok(history)) => {
                self.history = history;
            }
            AppEvent::History(Err(_)) => {
                self.message = Some("Could not read the history file.".to_string());
            }
        }
    }
}

/// One line per failure kind so the user can tell a timeout from a dead
/// provider or a local problem.
fn failure_message(err: &QueryError) -> String {
    match err {
        QueryError::Fetch(FetchError::Timeout) => "Provider timed out. Try again later.",
        QueryError::Fetch(FetchError::Network(_)) => {
            "Could not reach the provider. Try again later."
        }
        QueryError::Fetch(FetchError::Malformed(_)) => "Provider sent an unexpected payload.",
        QueryError::Fetch(FetchError::Empty) => "Provider returned no prices for this selection.",
        QueryError::Fetch(FetchError::InvalidDays(_)) => {
            "Day count is outside the supported range."
        }
        QueryError::Storage(_) => "Query finished but the history row could not be written.",
    }
    .to_string()
}

// --- TUI ---

pub async fn run_tui() -> Result<()> {
    let storage = StorageDir::new_relative("storage").await?;
    let config = storage.load_config().await;

    let client = Arc::new(MarketClient::new()?);
    let cache = Arc::new(Mutex::new(CoinListCache::new(Duration::from_secs(
        config.cache_ttl_secs,
    ))));
    let history_store = Arc::new(HistoryStore::new(storage));

    println!("Fetching top {} coins...", config.top_limit);
    let coins = client.top_coins_cached(&cache, config.top_limit).await?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let app = App::new(client, history_store, cache, config, coins);
    let res = run_app(&mut terminal, app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<AppEvent>(4);

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if let Ok(event) = rx.try_recv() {
            app.apply_event(event);
        }

        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) => {
                    if !handle_key_event(key, &mut app, &tx) {
                        return Ok(());
                    }
                }
                Event::Resize(_, _) => {
                    // The next terminal.draw() picks up the new size.
                }
                _ => {}
            }
        }
    }
}

fn handle_key_event(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<AppEvent>) -> bool {
    if app.search_mode {
        match key.code {
            KeyCode::Esc => {
                app.keyword.clear();
                app.search_mode = false;
                app.selected = 0;
            }
            KeyCode::Enter => app.search_mode = false,
            KeyCode::Backspace => {
                app.keyword.pop();
                app.selected = 0;
            }
            KeyCode::Char(c) => {
                app.keyword.push(c);
                app.selected = 0;
            }
            _ => {}
        }
        return true;
    }

    match key.code {
        KeyCode::Char('q') => return false,
        KeyCode::Char('/') => app.search_mode = true,
        KeyCode::Up => {
            let len = app.filtered().len();
            if len > 0 {
                app.selected = app.selected.checked_sub(1).unwrap_or(len - 1);
            }
        }
        KeyCode::Down => {
            let len = app.filtered().len();
            if len > 0 {
                app.selected = (app.selected + 1) % len;
            }
        }
        KeyCode::Left => app.days = app.days.saturating_sub(1).max(1),
        KeyCode::Right => app.days = (app.days + 1).min(MAX_DAYS),
        KeyCode::Enter if !app.is_busy => {
            if let Some(coin) = app.selected_coin() {
                app.is_busy = true;
                let client = Arc::clone(&app.client);
                let store = Arc::clone(&app.history_store);
                let days = app.days;
                let vs_currency = app.config.vs_currency.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result =
                        analysis::run_query(&client, &store, &coin.id, &coin.name, days, &vs_currency)
                            .await;
                    let _ = tx.send(AppEvent::Query(result)).await;
                });
            }
        }
        KeyCode::Char('h') => {
            app.show_history = !app.show_history;
            if app.show_history {
                let store = Arc::clone(&app.history_store);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(AppEvent::History(store.load().await)).await;
                });
            }
        }
        KeyCode::F(5) if !app.is_busy => {
            app.is_busy = true;
            let client = Arc::clone(&app.client);
            let cache = Arc::clone(&app.cache);
            let limit = app.config.top_limit;
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = client.top_coins_cached(&cache, limit).await;
                let _ = tx.send(AppEvent::Coins(result)).await;
            });
        }
        _ => {}
    }
    true
}

fn ui(f: &mut Frame, app: &App) {
    let main_layout =
        Layout::horizontal([Constraint::Percentage(28), Constraint::Percentage(72)]).split(f.size());

    draw_sidebar(f, app, main_layout[0]);
    draw_main(f, app, main_layout[1]);

    if app.is_busy {
        let area = centered_rect(50, 20, main_layout[1]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Talking to the provider...\nPlease wait.")
                .block(Block::default().title("Working").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }

    if app.show_history {
        draw_history_popup(f, app, main_layout[1]);
    }
}

fn draw_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let sidebar_block = Block::default()
        .borders(Borders::ALL)
        .title("Coins")
        .title_alignment(Alignment::Center);
    let inner = sidebar_block.inner(area);
    f.render_widget(sidebar_block, area);

    let chunks = Layout::vertical([
        Constraint::Length(1), // search line
        Constraint::Min(1),    // coin list
        Constraint::Length(2), // key help
    ])
    .split(inner);

    let search_style = if app.search_mode {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    f.render_widget(
        Paragraph::new(format!("/{}", app.keyword)).style(search_style),
        chunks[0],
    );

    let filtered = app.filtered();
    let selected = app.selected.min(filtered.len().saturating_sub(1));
    let visible = chunks[1].height as usize;
    let offset = selected.saturating_sub(visible.saturating_sub(1));

    let coin_lines: Vec<Line> = filtered
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible)
        .map(|(i, coin)| {
            let mut line = Line::from(coin.label());
            if i == selected {
                line = line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
            }
            line
        })
        .collect();
    f.render_widget(Paragraph::new(coin_lines), chunks[1]);

    f.render_widget(
        Paragraph::new("Enter query · / search · ←/→ days\nh history · F5 coins · q quit")
            .style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
}

fn draw_main(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::vertical([
        Constraint::Length(3), // title
        Constraint::Length(4), // summary
        Constraint::Min(0),    // indicator table
    ])
    .split(area);

    let coin_label = app
        .selected_coin()
        .map(|c| c.label())
        .unwrap_or_else(|| "-".to_string());
    let queried = app
        .queried_at
        .map(|t| t.format("%d-%m-%Y %H:%M:%S").to_string())
        .unwrap_or_else(|| "Never".to_string());
    f.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title_alignment(Alignment::Center)
            .title(format!(
                "{} | {} day(s) | Last query: {}",
                coin_label, app.days, queried
            )),
        chunks[0],
    );

    draw_summary(f, app, chunks[1]);
    draw_indicator_table(f, app, chunks[2]);
}

fn draw_summary(f: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = if let Some(message) = &app.message {
        vec![Line::from(message.clone()).style(Style::default().fg(Color::Red))]
    } else if let Some(report) = &app.report {
        let ccy = app.config.vs_currency.to_uppercase();
        let avg = report
            .avg_5
            .map(|avg| format!("{avg:.2} {ccy}"))
            .unwrap_or_else(|| "N/A".to_string());
        let (action_text, action_color) = match report.action {
            Action::Buy => ("Suggested action: BUY", Color::Green),
            Action::Sell => ("Suggested action: SELL", Color::Red),
        };
        vec![
            Line::from(format!(
                "{}: latest {:.2} {}",
                report.coin, report.latest_price, ccy
            )),
            Line::from(format!("5-sample average: {avg}")),
            Line::from(action_text).style(Style::default().fg(action_color)),
        ]
    } else {
        vec![Line::from("Select a coin and press Enter to query.")]
    };

    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Summary")),
        area,
    );
}

fn draw_indicator_table(f: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec![
        Cell::from("Date"),
        Cell::from("Price"),
        Cell::from("EMA12"),
        Cell::from("EMA26"),
        Cell::from("MACD"),
        Cell::from("Signal"),
        Cell::from("RSI"),
    ])
    .style(Style::default().bg(Color::DarkGray));

    let points = app
        .report
        .as_ref()
        .map(|r| {
            let skip = r.indicators.len().saturating_sub(20);
            &r.indicators[skip..]
        })
        .unwrap_or(&[]);

    let rows = points.iter().map(|point| {
        let rsi_cell = match point.rsi {
            Some(rsi) if rsi >= 70.0 => {
                Cell::from(format!("{rsi:.2}")).style(Style::default().fg(Color::Red))
            }
            Some(rsi) if rsi <= 30.0 => {
                Cell::from(format!("{rsi:.2}")).style(Style::default().fg(Color::Green))
            }
            Some(rsi) => Cell::from(format!("{rsi:.2}")),
            None => Cell::from("-").style(Style::default().fg(Color::DarkGray)),
        };

        Row::new([
            Cell::from(point.timestamp.format("%d-%m-%Y").to_string())
                .style(Style::default().fg(Color::DarkGray)),
            Cell::from(format!("{:.2}", point.price)),
            Cell::from(format!("{:.2}", point.ema_fast)),
            Cell::from(format!("{:.2}", point.ema_slow)),
            Cell::from(format!("{:.4}", point.macd)),
            Cell::from(format!("{:.4}", point.signal)),
            rsi_cell,
        ])
        .height(1)
    });

    f.render_widget(
        Table::new(
            rows,
            [
                Constraint::Length(12),
                Constraint::Percentage(16),
                Constraint::Percentage(16),
                Constraint::Percentage(16),
                Constraint::Percentage(16),
                Constraint::Percentage(16),
                Constraint::Percentage(10),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Indicators")),
        area,
    );
}

fn draw_history_popup(f: &mut Frame, app: &App, area: Rect) {
    let popup = centered_rect(80, 70, area);
    f.render_widget(Clear, popup);

    let header = Row::new(vec![
        Cell::from("Coin"),
        Cell::from("Queried At"),
        Cell::from("Latest"),
        Cell::from("5-Avg"),
        Cell::from("Action"),
    ])
    .style(Style::default().bg(Color::DarkGray));

    let rows = app.history.iter().rev().map(|record| {
        let action_cell = match record.action {
            Action::Buy => Cell::from("buy").style(Style::default().fg(Color::Green)),
            Action::Sell => Cell::from("sell").style(Style::default().fg(Color::Red)),
        };
        Row::new([
            Cell::from(record.coin.clone()),
            Cell::from(record.queried_at.format("%d-%m-%Y %H:%M:%S").to_string())
                .style(Style::default().fg(Color::DarkGray)),
            Cell::from(format!("{:.2}", record.latest_price)),
            Cell::from(
                record
                    .avg_5
                    .map(|avg| format!("{avg:.2}"))
                    .unwrap_or_else(|| "N/A".to_string()),
            ),
            action_cell,
        ])
    });

    f.render_widget(
        Table::new(
            rows,
            [
                Constraint::Percentage(24),
                Constraint::Percentage(28),
                Constraint::Percentage(18),
                Constraint::Percentage(18),
                Constraint::Percentage(12),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Query History (h to close)"),
        ),
        popup,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}
