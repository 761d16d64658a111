use iced::keyboard;
use iced::widget::canvas::Canvas;
use iced::widget::{
    button, column, container, row, scrollable, text, text_input, Column, Row, Space,
};
use iced::{
    Alignment, Background, Border, Color, Element, Length, Shadow, Subscription, Task, Theme,
    Vector,
};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use crate::chart::{BarRow, ChartColors, LineChart, StackedBars};
use crate::client::ApiClient;
use crate::gauge::{Donut, GaugeColors, Sparkline};
use crate::metrics::{self, Activity, ActivityRow, OverageLevel, Pulse};
use crate::preferences::{Preferences, TIME_RANGES};
use crate::protocol::{OutstandingBorrow, Snapshot, ToolState, ToolStatus};
use crate::series::{window_capacity, RingBuffer, Series, ENTITY_CADENCE_SECS, PUSH_CADENCE_SECS};
use crate::stream::{self, ConnectionState};
use crate::theme::{build_palette, categorical_colors, AccentColor, Palette, ThemeVariant};

/// Redraw cadence for the header clock and pulse decay.
const ANIM_TICK_MS: u64 = 100;

const EVENT_FEED_MAX: usize = 100;
const ENTITY_EVENT_ROWS: usize = 20;
/// Samples kept for the small metric-card sparklines.
const SPARK_POINTS: usize = 60;

/// Send a desktop notification (non-blocking, best-effort).
fn send_notification(title: &str, body: &str) {
    let _ = notify_rust::Notification::new()
        .summary(title)
        .body(body)
        .appname("SeatWatch")
        .timeout(notify_rust::Timeout::Milliseconds(5000))
        .show();
}

/// Detect if the system prefers dark mode.
fn system_prefers_dark() -> bool {
    if let Ok(gtk_theme) = std::env::var("GTK_THEME") {
        if gtk_theme.to_lowercase().contains("dark") {
            return true;
        }
    }
    if let Ok(color_scheme) = std::env::var("COLORFGBG") {
        // COLORFGBG format: "fg;bg" - if bg < 8, it's a dark terminal
        if let Some(bg) = color_scheme.split(';').next_back() {
            if let Ok(n) = bg.parse::<u32>() {
                return n < 8;
            }
        }
    }
    // Default: assume dark mode
    true
}

// ─── EVENT FEED ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
enum EventSeverity {
    Info,
    Warning,
    Critical,
}

/// One line of the activity feed (borrow/return traffic and connection
/// transitions).
#[derive(Clone, Debug)]
struct FeedEntry {
    time: String,
    message: String,
    severity: EventSeverity,
}

// ─── MESSAGE & ENUMS ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Message {
    Stream(stream::Event),
    AnimTick,
    TabSelected(Tab),
    TimeRangeSelected(usize),
    ToolFilterSelected(ToolFilter),
    BorrowsFetched {
        generation: u64,
        result: Result<Vec<OutstandingBorrow>, String>,
    },
    StatusFetched(Result<Vec<ToolStatus>, String>),
    RefreshStatus,
    OutstandingFetched(Result<Vec<OutstandingBorrow>, String>),
    OutstandingUserChanged(String),
    RefreshOutstanding,
    ReturnBorrow(String),
    Reconnect,
    // Borrow / return forms
    BorrowToolSelected(String),
    BorrowUserChanged(String),
    SubmitBorrow,
    BorrowSubmitted(Result<String, String>),
    ReturnIdChanged(String),
    SubmitReturn,
    ReturnSubmitted(Result<String, String>),
    // Settings
    ToggleSettings,
    SetTheme(ThemeVariant),
    SetAccent(AccentColor),
    ToggleNotifications,
    ServerUrlChanged(String),
    ApplyServerUrl,
    // Keyboard
    KeyPressed(keyboard::Key, keyboard::Modifiers),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Live,
    Tools,
    Costs,
    Events,
}

/// The view router's selector: one aggregate mode, or one entity per tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolFilter {
    All,
    Tool(String),
}

impl fmt::Display for ToolFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolFilter::All => write!(f, "All tools (overview)"),
            ToolFilter::Tool(name) => write!(f, "{name}"),
        }
    }
}

// ─── APP STATE ──────────────────────────────────────────────────

pub struct SeatWatch {
    api: ApiClient,
    // Connection (owned here; the worker pushes transitions)
    connection: ConnectionState,
    /// Bumped to tear down and rebuild the stream subscription (manual
    /// reconnect after terminal failure, or a server URL change).
    connection_epoch: u64,
    // Latest snapshot and selector choices derived from it
    current: Option<Snapshot>,
    tool_choices: Vec<ToolFilter>,
    // View routing
    tab: Tab,
    filter: ToolFilter,
    /// Tags in-flight entity fetches; responses with an older tag are stale.
    fetch_generation: u64,
    // Aggregate-scoped series
    borrow_series: Series,
    overage_series: Series,
    // Entity-scoped state
    entity_series: Series,
    /// Last-known state of the selected tool. Kept as-is when the tool
    /// vanishes from later snapshots.
    entity_tool: Option<ToolState>,
    entity_borrows: Option<Vec<OutstandingBorrow>>,
    entity_fetch_error: Option<String>,
    entity_rows: Vec<ActivityRow>,
    // Time range
    range_idx: usize,
    // Rate pulses
    borrow_pulse: Pulse,
    overage_pulse: Pulse,
    prev_borrow_rate: i64,
    prev_overage: f64,
    prev_overage_level: OverageLevel,
    // Card sparklines
    borrow_spark: RingBuffer<f32>,
    return_spark: RingBuffer<f32>,
    failure_spark: RingBuffer<f32>,
    // Event feed (id-deduplicated across overlapping windows)
    feed: RingBuffer<FeedEntry>,
    seen_events: HashSet<String>,
    seen_order: RingBuffer<String>,
    // Cost summary
    statuses: Option<Vec<ToolStatus>>,
    status_error: Option<String>,
    // Outstanding-borrows panel
    outstanding: Option<Vec<OutstandingBorrow>>,
    outstanding_error: Option<String>,
    outstanding_user: String,
    // Borrow / return forms
    borrow_tool: Option<String>,
    borrow_user: String,
    borrow_result: Option<Result<String, String>>,
    return_id: String,
    return_result: Option<Result<String, String>>,
    // Settings
    show_settings: bool,
    theme_variant: ThemeVariant,
    accent_color: AccentColor,
    pal: Palette,
    server_url_input: String,
    notifications: bool,
}

impl SeatWatch {
    pub fn new() -> Self {
        Self::with_prefs(Preferences::load())
    }

    fn with_prefs(prefs: Preferences) -> Self {
        let theme_variant = if prefs.auto_theme {
            if system_prefers_dark() {
                ThemeVariant::CatppuccinMocha
            } else {
                ThemeVariant::CatppuccinLatte
            }
        } else {
            prefs.theme
        };
        let range_idx = TIME_RANGES
            .iter()
            .position(|(s, _)| *s == prefs.time_range_secs)
            .unwrap_or(3);
        let span = TIME_RANGES[range_idx].0;

        Self {
            api: ApiClient::new(&prefs.server_url),
            connection: ConnectionState::Connecting,
            connection_epoch: 0,
            current: None,
            tool_choices: vec![ToolFilter::All],
            tab: Tab::Live,
            filter: ToolFilter::All,
            fetch_generation: 0,
            borrow_series: Series::new(window_capacity(span, PUSH_CADENCE_SECS)),
            overage_series: Series::new(window_capacity(span, PUSH_CADENCE_SECS)),
            entity_series: Series::new(window_capacity(span, ENTITY_CADENCE_SECS)),
            entity_tool: None,
            entity_borrows: None,
            entity_fetch_error: None,
            entity_rows: Vec::new(),
            range_idx,
            borrow_pulse: Pulse::default(),
            overage_pulse: Pulse::default(),
            prev_borrow_rate: 0,
            prev_overage: 0.0,
            prev_overage_level: OverageLevel::Normal,
            borrow_spark: RingBuffer::new(SPARK_POINTS),
            return_spark: RingBuffer::new(SPARK_POINTS),
            failure_spark: RingBuffer::new(SPARK_POINTS),
            feed: RingBuffer::new(EVENT_FEED_MAX),
            seen_events: HashSet::new(),
            seen_order: RingBuffer::new(EVENT_FEED_MAX * 4),
            statuses: None,
            status_error: None,
            outstanding: None,
            outstanding_error: None,
            outstanding_user: String::new(),
            borrow_tool: None,
            borrow_user: prefs.default_user.clone(),
            borrow_result: None,
            return_id: String::new(),
            return_result: None,
            show_settings: false,
            theme_variant,
            accent_color: prefs.accent,
            pal: build_palette(theme_variant, prefs.accent),
            server_url_input: prefs.server_url,
            notifications: prefs.notifications,
        }
    }

    pub fn title(&self) -> String {
        String::from("SeatWatch")
    }

    pub fn theme(&self) -> Theme {
        if self.theme_variant.is_light() {
            Theme::Light
        } else {
            Theme::Dark
        }
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let endpoint = self.api.stream_endpoint();
        let push = Subscription::run_with_id(
            ("realtime-stream", self.connection_epoch, endpoint.clone()),
            stream::subscribe(endpoint),
        )
        .map(Message::Stream);
        let anim_tick = iced::time::every(Duration::from_millis(ANIM_TICK_MS))
            .map(|_| Message::AnimTick);
        let keys = keyboard::on_key_press(|key, modifiers| {
            Some(Message::KeyPressed(key, modifiers))
        });
        Subscription::batch([push, anim_tick, keys])
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Stream(event) => return self.on_stream_event(event),
            Message::AnimTick => {
                // No state to advance: the tick exists so pulse decay and
                // the header clock repaint between snapshots.
            }
            Message::TabSelected(tab) => {
                self.tab = tab;
                if tab == Tab::Costs {
                    return self.refresh_status();
                }
                if tab == Tab::Tools {
                    return self.refresh_outstanding();
                }
            }
            Message::TimeRangeSelected(idx) => {
                if idx < TIME_RANGES.len() {
                    self.set_time_range(idx);
                    self.save_prefs();
                }
            }
            Message::ToolFilterSelected(filter) => self.set_filter(filter),
            Message::BorrowsFetched { generation, result } => {
                // A response for a selection the user already left is
                // discarded rather than rendered under the new one.
                if generation != self.fetch_generation {
                    tracing::debug!(generation, "discarding stale borrows response");
                    return Task::none();
                }
                match result {
                    Ok(borrows) => {
                        self.entity_borrows = Some(borrows);
                        self.entity_fetch_error = None;
                    }
                    Err(err) => {
                        tracing::warn!(%err, "borrows fetch failed");
                        self.entity_fetch_error = Some(err);
                    }
                }
            }
            Message::StatusFetched(result) => match result {
                Ok(statuses) => {
                    self.statuses = Some(statuses);
                    self.status_error = None;
                }
                Err(err) => {
                    tracing::warn!(%err, "status fetch failed");
                    self.status_error = Some(err);
                }
            },
            Message::RefreshStatus => return self.refresh_status(),
            Message::OutstandingFetched(result) => match result {
                Ok(borrows) => {
                    self.outstanding = Some(borrows);
                    self.outstanding_error = None;
                }
                Err(err) => {
                    tracing::warn!(%err, "outstanding borrows fetch failed");
                    self.outstanding_error = Some(err);
                }
            },
            Message::OutstandingUserChanged(user) => self.outstanding_user = user,
            Message::RefreshOutstanding => return self.refresh_outstanding(),
            Message::ReturnBorrow(id) => {
                let api = self.api.clone();
                return Task::perform(
                    async move {
                        api.return_license(&id)
                            .await
                            .map(|r| r.tool)
                            .map_err(|e| e.to_string())
                    },
                    Message::ReturnSubmitted,
                );
            }
            Message::Reconnect => {
                self.connection_epoch += 1;
                self.connection = ConnectionState::Connecting;
                self.push_feed(FeedEntry {
                    time: metrics::now_label(),
                    message: String::from("manual reconnect requested"),
                    severity: EventSeverity::Info,
                });
            }
            Message::BorrowToolSelected(tool) => self.borrow_tool = Some(tool),
            Message::BorrowUserChanged(user) => self.borrow_user = user,
            Message::SubmitBorrow => {
                let user = self.borrow_user.trim().to_string();
                let Some(tool) = self.borrow_tool.clone() else {
                    self.borrow_result = Some(Err(String::from("pick a tool first")));
                    return Task::none();
                };
                if user.is_empty() {
                    self.borrow_result = Some(Err(String::from("enter a user name")));
                    return Task::none();
                }
                let api = self.api.clone();
                return Task::perform(
                    async move {
                        api.borrow(&tool, &user)
                            .await
                            .map(|r| r.id)
                            .map_err(|e| e.to_string())
                    },
                    Message::BorrowSubmitted,
                );
            }
            Message::BorrowSubmitted(result) => {
                let succeeded = result.is_ok();
                match &result {
                    Ok(id) => {
                        // Pre-fill the return form with the fresh id
                        self.return_id = id.clone();
                    }
                    Err(err) => tracing::info!(%err, "borrow rejected"),
                }
                self.borrow_result = Some(result.map(|id| format!("borrowed, id {id}")));
                if succeeded {
                    return self.refresh_outstanding();
                }
            }
            Message::ReturnIdChanged(id) => self.return_id = id,
            Message::SubmitReturn => {
                let id = self.return_id.trim().to_string();
                if id.is_empty() {
                    self.return_result = Some(Err(String::from("enter a borrow id")));
                    return Task::none();
                }
                let api = self.api.clone();
                return Task::perform(
                    async move {
                        api.return_license(&id)
                            .await
                            .map(|r| r.tool)
                            .map_err(|e| e.to_string())
                    },
                    Message::ReturnSubmitted,
                );
            }
            Message::ReturnSubmitted(result) => {
                let succeeded = result.is_ok();
                if let Err(err) = &result {
                    tracing::info!(%err, "return rejected");
                }
                self.return_result = Some(result.map(|tool| format!("returned {tool}")));
                if succeeded {
                    return self.refresh_outstanding();
                }
            }
            Message::ToggleSettings => self.show_settings = !self.show_settings,
            Message::SetTheme(variant) => {
                self.theme_variant = variant;
                self.pal = build_palette(variant, self.accent_color);
                self.save_prefs();
            }
            Message::SetAccent(accent) => {
                self.accent_color = accent;
                self.pal = build_palette(self.theme_variant, accent);
                self.save_prefs();
            }
            Message::ToggleNotifications => {
                self.notifications = !self.notifications;
                self.save_prefs();
            }
            Message::ServerUrlChanged(url) => self.server_url_input = url,
            Message::ApplyServerUrl => {
                let url = self.server_url_input.trim().trim_end_matches('/').to_string();
                if url.is_empty() {
                    return Task::none();
                }
                self.server_url_input = url.clone();
                self.api = ApiClient::new(&url);
                self.connection_epoch += 1;
                self.connection = ConnectionState::Connecting;
                self.save_prefs();
            }
            Message::KeyPressed(key, modifiers) => {
                use keyboard::key::Named;
                match key {
                    keyboard::Key::Character(ref c) if !self.show_settings => match c.as_str() {
                        "1" => self.tab = Tab::Live,
                        "2" => self.tab = Tab::Tools,
                        "3" => {
                            self.tab = Tab::Costs;
                            return self.refresh_status();
                        }
                        "4" => self.tab = Tab::Events,
                        "s" | "," => self.show_settings = true,
                        _ => {}
                    },
                    keyboard::Key::Named(Named::Escape) => {
                        if self.show_settings {
                            self.show_settings = false;
                        }
                    }
                    keyboard::Key::Named(Named::Tab) if !self.show_settings => {
                        self.tab = if modifiers.shift() {
                            match self.tab {
                                Tab::Live => Tab::Events,
                                Tab::Tools => Tab::Live,
                                Tab::Costs => Tab::Tools,
                                Tab::Events => Tab::Costs,
                            }
                        } else {
                            match self.tab {
                                Tab::Live => Tab::Tools,
                                Tab::Tools => Tab::Costs,
                                Tab::Costs => Tab::Events,
                                Tab::Events => Tab::Live,
                            }
                        };
                    }
                    _ => {}
                }
            }
        }
        Task::none()
    }

    // ─── COORDINATOR ────────────────────────────────────────────

    fn on_stream_event(&mut self, event: stream::Event) -> Task<Message> {
        match event {
            stream::Event::Connecting => {
                // The worker announces every attempt; keep the retrying
                // indicator up instead of flipping back to "connecting"
                if !matches!(self.connection, ConnectionState::Retrying { .. }) {
                    self.connection = ConnectionState::Connecting;
                }
            }
            stream::Event::Connected => {
                let was_down = matches!(
                    self.connection,
                    ConnectionState::Retrying { .. } | ConnectionState::Failed
                );
                self.connection = ConnectionState::Connected;
                if was_down {
                    self.push_feed(FeedEntry {
                        time: metrics::now_label(),
                        message: String::from("reconnected to the license server"),
                        severity: EventSeverity::Info,
                    });
                }
            }
            stream::Event::Retrying { attempt, delay } => {
                self.connection = ConnectionState::Retrying { attempt };
                self.push_feed(FeedEntry {
                    time: metrics::now_label(),
                    message: format!(
                        "connection lost, retry {attempt}/{} in {}s",
                        stream::MAX_RETRIES,
                        delay.as_secs()
                    ),
                    severity: EventSeverity::Warning,
                });
            }
            stream::Event::Failed => {
                self.connection = ConnectionState::Failed;
                self.push_feed(FeedEntry {
                    time: metrics::now_label(),
                    message: String::from("connection failed, manual reconnect required"),
                    severity: EventSeverity::Critical,
                });
                if self.notifications {
                    send_notification(
                        "SeatWatch: connection failed",
                        "The realtime stream is down and retries are exhausted.",
                    );
                }
            }
            stream::Event::Update(snapshot) => return self.apply_snapshot(*snapshot),
        }
        Task::none()
    }

    /// One full coordinator cycle for an inbound snapshot: refresh the
    /// selector choices, derive metrics, route series updates per the
    /// active filter, and kick off the entity-scoped secondary fetch.
    fn apply_snapshot(&mut self, snap: Snapshot) -> Task<Message> {
        let now = Instant::now();
        let label = metrics::now_label();

        // Selector choices follow the snapshot; the current selection is
        // preserved as-is even if its tool vanished from the list.
        self.tool_choices = std::iter::once(ToolFilter::All)
            .chain(snap.tools.iter().map(|t| ToolFilter::Tool(t.tool.clone())))
            .collect();
        if self.borrow_tool.is_none() {
            self.borrow_tool = snap.tools.first().map(|t| t.tool.clone());
        }

        // Pulses compare against the previous cycle's value: rounded for
        // the integer rate cards, raw for the overage percentage.
        let borrow_disp = metrics::display_rate(snap.rates.borrow_per_min);
        self.borrow_pulse
            .observe(self.prev_borrow_rate as f64, borrow_disp as f64, now);
        self.overage_pulse
            .observe(self.prev_overage, snap.rates.overage_percent, now);
        self.prev_borrow_rate = borrow_disp;
        self.prev_overage = snap.rates.overage_percent;

        let level = metrics::classify_overage(snap.rates.overage_percent);
        if self.notifications
            && level == OverageLevel::Critical
            && self.prev_overage_level != OverageLevel::Critical
        {
            send_notification(
                "SeatWatch: overage critical",
                &format!(
                    "{:.1}% of checkouts are over commit",
                    snap.rates.overage_percent
                ),
            );
        }
        self.prev_overage_level = level;

        for tool in &snap.tools {
            let split = metrics::utilization_split(tool);
            if split.sum() != tool.total {
                // Upstream defect; rendered as given (see DESIGN.md)
                tracing::debug!(tool = %tool.tool, total = tool.total, "seat split does not sum to total");
            }
        }

        self.borrow_spark.push(snap.rates.borrow_per_min as f32);
        self.return_spark.push(snap.rates.return_per_min as f32);
        self.failure_spark.push(snap.rates.failure_per_min as f32);

        // Aggregate series accumulate on every cycle, whatever the filter.
        self.borrow_series
            .push(label.clone(), snap.rates.borrow_per_min);
        self.overage_series.push(
            label.clone(),
            metrics::overage_count(&snap.recent_events.borrows) as f64,
        );

        // Entity routing
        let mut task = Task::none();
        if let ToolFilter::Tool(name) = &self.filter {
            if let Some(state) = snap.tools.iter().find(|t| &t.tool == name) {
                self.entity_tool = Some(state.clone());
            }
            let matching = snap
                .recent_events
                .borrows
                .iter()
                .filter(|b| &b.tool == name)
                .count();
            if matching > 0 {
                self.entity_series.push(label.clone(), matching as f64);
            }
            self.entity_rows =
                metrics::activity_rows(&snap.recent_events, Some(name), ENTITY_EVENT_ROWS);

            // Live outstanding-borrow list for the user donut; a different
            // source from the recent-events window above.
            let api = self.api.clone();
            let generation = self.fetch_generation;
            task = Task::perform(
                async move {
                    api.outstanding_borrows(None)
                        .await
                        .map_err(|e| e.to_string())
                },
                move |result| Message::BorrowsFetched { generation, result },
            );
        }

        // Activity feed, deduplicated against earlier overlapping windows
        for row in metrics::activity_rows(&snap.recent_events, None, EVENT_FEED_MAX) {
            let key = match row.activity {
                Activity::Borrow { .. } => format!("b:{}", row.id),
                Activity::Return => format!("r:{}", row.id),
            };
            if !self.seen_events.insert(key.clone()) {
                continue;
            }
            if self.seen_order.len() >= EVENT_FEED_MAX * 4 {
                // keep the dedup set bounded alongside its order queue
                if let Some(oldest) = self.seen_order.iter().next() {
                    let oldest = oldest.clone();
                    self.seen_events.remove(&oldest);
                }
            }
            self.seen_order.push(key);
            let (message, severity) = match row.activity {
                Activity::Borrow { overage: true } => (
                    format!("{} borrowed {} (overage)", row.user, row.tool),
                    EventSeverity::Warning,
                ),
                Activity::Borrow { overage: false } => (
                    format!("{} borrowed {}", row.user, row.tool),
                    EventSeverity::Info,
                ),
                Activity::Return => (
                    format!("{} returned {}", row.user, row.tool),
                    EventSeverity::Info,
                ),
            };
            self.push_feed(FeedEntry {
                time: row.time,
                message,
                severity,
            });
        }

        self.current = Some(snap);
        task
    }

    // ─── VIEW ROUTER ────────────────────────────────────────────

    fn set_filter(&mut self, filter: ToolFilter) {
        if filter == self.filter {
            return;
        }
        // Invalidate any in-flight entity fetch for the old selection
        self.fetch_generation += 1;
        if let ToolFilter::Tool(name) = &filter {
            self.entity_series.reset();
            self.entity_borrows = None;
            self.entity_fetch_error = None;
            self.entity_rows.clear();
            self.entity_tool = self
                .current
                .as_ref()
                .and_then(|s| s.tools.iter().find(|t| &t.tool == name))
                .cloned();
        }
        // Aggregate series are untouched by filter changes
        self.filter = filter;
    }

    fn set_time_range(&mut self, idx: usize) {
        self.range_idx = idx;
        let span = TIME_RANGES[idx].0;
        self.borrow_series
            .set_capacity(window_capacity(span, PUSH_CADENCE_SECS));
        self.overage_series
            .set_capacity(window_capacity(span, PUSH_CADENCE_SECS));
        self.entity_series
            .set_capacity(window_capacity(span, ENTITY_CADENCE_SECS));
    }

    fn refresh_status(&mut self) -> Task<Message> {
        let api = self.api.clone();
        Task::perform(
            async move { api.tool_status().await.map_err(|e| e.to_string()) },
            Message::StatusFetched,
        )
    }

    fn refresh_outstanding(&mut self) -> Task<Message> {
        let api = self.api.clone();
        let user = self.outstanding_user.trim().to_string();
        Task::perform(
            async move {
                let filter = if user.is_empty() {
                    None
                } else {
                    Some(user.as_str())
                };
                api.outstanding_borrows(filter)
                    .await
                    .map_err(|e| e.to_string())
            },
            Message::OutstandingFetched,
        )
    }

    fn push_feed(&mut self, entry: FeedEntry) {
        self.feed.push(entry);
    }

    fn save_prefs(&self) {
        let prefs = Preferences {
            theme: self.theme_variant,
            accent: self.accent_color,
            server_url: self.server_url_input.clone(),
            time_range_secs: TIME_RANGES[self.range_idx].0,
            default_user: self.borrow_user.clone(),
            notifications: self.notifications,
            auto_theme: false, // When saving manually, auto is off
        };
        prefs.save();
    }

    fn chart_colors(&self) -> ChartColors {
        ChartColors {
            bg: self.pal.panel_bg,
            border: self.pal.border,
            grid: self.pal.grid,
            label: self.pal.label,
            text: self.pal.text,
        }
    }

    fn gauge_colors(&self) -> GaugeColors {
        GaugeColors {
            bg: self.pal.panel_bg,
            label: self.pal.label,
            text: self.pal.text,
            bar_bg: self.pal.bar_bg,
        }
    }

    // ─── MAIN VIEW ──────────────────────────────────────────────

    pub fn view(&self) -> Element<'_, Message> {
        let p = &self.pal;

        let tabs = row![
            menu_tab("Live", Tab::Live, self.tab, p),
            menu_tab("Tools", Tab::Tools, self.tab, p),
            menu_tab("Costs", Tab::Costs, self.tab, p),
            menu_tab("Events", Tab::Events, self.tab, p),
        ]
        .spacing(4);

        let app_btn = button(
            text(if self.show_settings {
                "SeatWatch ×"
            } else {
                "SeatWatch"
            })
            .size(15)
            .color(p.accent),
        )
        .on_press(Message::ToggleSettings)
        .style(button::text)
        .padding([2, 4]);

        let menu_bar = row![
            app_btn,
            Space::with_width(10),
            self.connection_indicator(),
            Space::with_width(Length::Fill),
            tabs,
            Space::with_width(Length::Fill),
            text(chrono::Local::now().format("%H:%M:%S").to_string())
                .size(13)
                .color(p.text),
        ]
        .align_y(Alignment::Center)
        .padding([6, 12]);

        let content: Element<Message> = if self.show_settings {
            self.view_settings()
        } else {
            match self.tab {
                Tab::Live => self.view_live(),
                Tab::Tools => self.view_tools(),
                Tab::Costs => self.view_costs(),
                Tab::Events => self.view_events(),
            }
        };

        let bg = p.bg;
        let main = column![
            panel_bg(menu_bar.into(), p.sidebar_bg, p.border),
            content,
        ]
        .spacing(0);

        container(main)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(move |_: &Theme| container::Style {
                background: Some(Background::Color(bg)),
                ..Default::default()
            })
            .into()
    }

    fn connection_indicator(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let (dot, label) = match self.connection {
            ConnectionState::Connecting => (p.yellow, String::from("connecting…")),
            ConnectionState::Connected => (p.green, String::from("live")),
            ConnectionState::Retrying { attempt } => (
                p.yellow,
                format!("retrying {attempt}/{}", stream::MAX_RETRIES),
            ),
            ConnectionState::Failed => (p.red, String::from("connection failed")),
        };
        let mut items: Vec<Element<Message>> = vec![
            text("●").size(11).color(dot).into(),
            text(label).size(11).color(p.label).into(),
        ];
        if self.connection.is_failed() {
            items.push(
                button(text("reconnect").size(10).color(p.accent))
                    .on_press(Message::Reconnect)
                    .style(button::text)
                    .padding([1, 4])
                    .into(),
            );
        }
        Row::with_children(items)
            .spacing(6)
            .align_y(Alignment::Center)
            .into()
    }

    // ─── LIVE TAB ───────────────────────────────────────────────

    fn view_live(&self) -> Element<'_, Message> {
        let p = &self.pal;

        // Filter + window controls
        let filter = iced::widget::pick_list(
            self.tool_choices.clone(),
            Some(self.filter.clone()),
            Message::ToolFilterSelected,
        )
        .text_size(11)
        .padding([4, 8]);

        let mut range_btns: Vec<Element<Message>> = Vec::new();
        for (idx, (_, label)) in TIME_RANGES.iter().enumerate() {
            let is_active = idx == self.range_idx;
            let color = if is_active { p.accent } else { p.label };
            range_btns.push(
                button(text(*label).size(11).color(color))
                    .on_press(Message::TimeRangeSelected(idx))
                    .style(if is_active {
                        button::primary
                    } else {
                        button::text
                    })
                    .padding([3, 8])
                    .into(),
            );
        }

        let controls = row![
            filter,
            Space::with_width(Length::Fill),
            text("window").size(10).color(p.label),
            Row::with_children(range_btns).spacing(2),
        ]
        .spacing(8)
        .align_y(Alignment::Center)
        .padding([8, 12]);

        let cards = self.metric_cards();

        let charts: Element<Message> = match &self.filter {
            ToolFilter::All => self.view_aggregate(),
            ToolFilter::Tool(name) => self.view_entity(name),
        };

        scrollable(
            column![controls, cards, charts]
                .spacing(10)
                .padding([0, 12]),
        )
        .height(Length::Fill)
        .into()
    }

    fn metric_cards(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let now = Instant::now();
        let rates = self.current.as_ref().map(|s| s.rates);

        let borrow = rates.map_or(0, |r| metrics::display_rate(r.borrow_per_min));
        let ret = rates.map_or(0, |r| metrics::display_rate(r.return_per_min));
        let failure = rates.map_or(0, |r| metrics::display_rate(r.failure_per_min));
        let overage = rates.map_or(0.0, |r| r.overage_percent);
        let level = metrics::classify_overage(overage);
        let overage_color = match level {
            OverageLevel::Normal => p.text,
            OverageLevel::Warning => p.yellow,
            OverageLevel::Critical => p.red,
        };
        let active = self
            .current
            .as_ref()
            .map_or(0, |s| metrics::total_borrowed(&s.tools));
        let buffered = self
            .current
            .as_ref()
            .map_or(0, |s| s.buffer_stats.total_events);

        row![
            metric_card(
                "Borrows/min",
                borrow.to_string(),
                p.accent,
                Some(self.borrow_spark.iter().copied().collect()),
                self.borrow_pulse.active(now),
                p,
            ),
            metric_card(
                "Returns/min",
                ret.to_string(),
                p.green,
                Some(self.return_spark.iter().copied().collect()),
                false,
                p,
            ),
            metric_card(
                "Failures/min",
                failure.to_string(),
                p.magenta,
                Some(self.failure_spark.iter().copied().collect()),
                false,
                p,
            ),
            metric_card(
                "Overage rate",
                format!("{overage:.1}%"),
                overage_color,
                None,
                self.overage_pulse.active(now),
                p,
            ),
            metric_card("Active seats", active.to_string(), p.cyan, None, false, p),
            metric_card(
                "Buffered events",
                format_count(buffered),
                p.label,
                None,
                false,
                p,
            ),
        ]
        .spacing(8)
        .into()
    }

    fn view_aggregate(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let range_label = TIME_RANGES[self.range_idx].1;

        let borrow_chart = Canvas::new(LineChart {
            series: vec![(
                String::from("borrows"),
                p.accent,
                self.borrow_series.values(),
            )],
            labels: self.borrow_series.labels(),
            y_min: 0.0,
            y_max: chart_max(&self.borrow_series.values()),
            title: format!("License borrows (last {range_label})"),
            filled: true,
            unit: String::from("/min"),
            colors: self.chart_colors(),
            show_avg: true,
        })
        .width(Length::Fill)
        .height(180);

        let overage_chart = Canvas::new(LineChart {
            series: vec![(
                String::from("overage"),
                p.red,
                self.overage_series.values(),
            )],
            labels: self.overage_series.labels(),
            y_min: 0.0,
            y_max: chart_max(&self.overage_series.values()),
            title: format!("Overage checkouts (last {range_label})"),
            filled: true,
            unit: String::new(),
            colors: self.chart_colors(),
            show_avg: false,
        })
        .width(Length::Fill)
        .height(180);

        let utilization = Canvas::new(self.utilization_bars("Seat utilization"))
            .width(Length::Fill)
            .height(self.utilization_height());

        column![
            row![borrow_chart, overage_chart].spacing(10),
            utilization,
        ]
        .spacing(10)
        .into()
    }

    fn utilization_bars(&self, title: &str) -> StackedBars {
        let p = &self.pal;
        let mut tools: Vec<&ToolState> = self
            .current
            .as_ref()
            .map(|s| s.tools.iter().collect())
            .unwrap_or_default();
        // Stable ordering regardless of server list order
        tools.sort_by(|a, b| a.tool.cmp(&b.tool));

        StackedBars {
            title: title.to_string(),
            rows: tools
                .iter()
                .map(|t| {
                    let split = metrics::utilization_split(t);
                    BarRow {
                        label: t.tool.clone(),
                        segments: [split.in_commit, split.in_overage, split.available],
                    }
                })
                .collect(),
            segment_names: ["in commit", "overage", "available"],
            segment_colors: [p.accent, p.yellow, p.bar_bg],
            colors: self.chart_colors(),
        }
    }

    fn utilization_height(&self) -> u16 {
        let rows = self.current.as_ref().map_or(0, |s| s.tools.len());
        (60 + rows as u16 * 26).clamp(90, 320)
    }

    fn view_entity(&self, name: &str) -> Element<'_, Message> {
        let p = &self.pal;
        let range_label = TIME_RANGES[self.range_idx].1;

        let Some(state) = &self.entity_tool else {
            return panel(
                text(format!("waiting for data on {name}…"))
                    .size(12)
                    .color(p.label)
                    .into(),
                p,
            );
        };
        let split = metrics::utilization_split(state);

        let info = text(format!(
            "{}/{} in use ({} commit, {} overage)",
            state.borrowed, state.total, split.in_commit, split.in_overage
        ))
        .size(12)
        .color(p.label);

        let activity_chart = Canvas::new(LineChart {
            series: vec![(
                String::from("borrows"),
                p.accent,
                self.entity_series.values(),
            )],
            labels: self.entity_series.labels(),
            y_min: 0.0,
            y_max: chart_max(&self.entity_series.values()),
            title: format!("{} borrow activity (last {range_label})", state.tool),
            filled: true,
            unit: String::new(),
            colors: self.chart_colors(),
            show_avg: false,
        })
        .width(Length::Fill)
        .height(170);

        // User distribution from the live outstanding-borrow list
        let users: Element<Message> = if let Some(err) = &self.entity_fetch_error {
            panel(
                text(format!("unable to load user distribution: {err}"))
                    .size(11)
                    .color(p.yellow)
                    .into(),
                p,
            )
        } else if let Some(borrows) = &self.entity_borrows {
            let dist = metrics::user_distribution(borrows, name);
            let colors = categorical_colors(p);
            let total: usize = dist.iter().map(|(_, n)| n).sum();
            Canvas::new(Donut {
                segments: dist
                    .iter()
                    .enumerate()
                    .map(|(i, (user, n))| (user.clone(), *n as f32, colors[i % colors.len()]))
                    .collect(),
                center_label: total.to_string(),
                colors: self.gauge_colors(),
            })
            .width(Length::Fill)
            .height(150)
            .into()
        } else {
            panel(
                text("loading user distribution…")
                    .size(11)
                    .color(p.label)
                    .into(),
                p,
            )
        };

        let commit_donut = Canvas::new(Donut {
            segments: vec![
                (String::from("in commit"), split.in_commit as f32, p.accent),
                (String::from("overage"), split.in_overage as f32, p.yellow),
                (String::from("available"), split.available as f32, p.bar_bg),
            ],
            center_label: state.total.to_string(),
            colors: self.gauge_colors(),
        })
        .width(Length::Fill)
        .height(150);

        // Recent events table for this tool
        let mut event_rows: Vec<Element<Message>> = Vec::new();
        if self.entity_rows.is_empty() {
            event_rows.push(
                text("no recent activity")
                    .size(11)
                    .color(p.label)
                    .into(),
            );
        }
        for row_data in &self.entity_rows {
            let (kind, kind_color, tag) = match row_data.activity {
                Activity::Borrow { overage: true } => ("borrow", p.accent, Some(("overage", p.yellow))),
                Activity::Borrow { overage: false } => ("borrow", p.accent, Some(("commit", p.accent))),
                Activity::Return => ("return", p.green, None),
            };
            let mut cells: Vec<Element<Message>> = vec![
                text(row_data.time.clone())
                    .size(11)
                    .color(p.label)
                    .width(80)
                    .into(),
                text(kind).size(11).color(kind_color).width(60).into(),
                text(row_data.user.clone())
                    .size(11)
                    .color(p.text)
                    .width(140)
                    .into(),
            ];
            if let Some((tag_label, tag_color)) = tag {
                cells.push(text(tag_label).size(11).color(tag_color).into());
            }
            event_rows.push(
                Row::with_children(cells)
                    .spacing(8)
                    .align_y(Alignment::Center)
                    .into(),
            );
        }

        column![
            info,
            activity_chart,
            row![
                column![section_title("Users holding seats", p), users].spacing(6).width(Length::FillPortion(1)),
                column![section_title("Commit vs overage", p), commit_donut].spacing(6).width(Length::FillPortion(1)),
            ]
            .spacing(10),
            panel(
                column![
                    section_title("Recent events", p),
                    Column::with_children(event_rows).spacing(3),
                ]
                .spacing(6)
                .into(),
                p,
            ),
        ]
        .spacing(10)
        .into()
    }

    // ─── TOOLS TAB ──────────────────────────────────────────────

    fn view_tools(&self) -> Element<'_, Message> {
        let p = &self.pal;

        let utilization = Canvas::new(self.utilization_bars("Seat utilization by tool"))
            .width(Length::Fill)
            .height(self.utilization_height());

        // Borrow form
        let tool_names: Vec<String> = self
            .current
            .as_ref()
            .map(|s| s.tools.iter().map(|t| t.tool.clone()).collect())
            .unwrap_or_default();
        let borrow_form = column![
            section_title("Borrow a seat", p),
            row![
                iced::widget::pick_list(
                    tool_names,
                    self.borrow_tool.clone(),
                    Message::BorrowToolSelected,
                )
                .placeholder("tool")
                .text_size(11)
                .padding([4, 8]),
                text_input("user", &self.borrow_user)
                    .on_input(Message::BorrowUserChanged)
                    .on_submit(Message::SubmitBorrow)
                    .size(12)
                    .padding([4, 8])
                    .width(160),
                button(text("Borrow").size(11))
                    .on_press(Message::SubmitBorrow)
                    .padding([4, 12]),
            ]
            .spacing(8)
            .align_y(Alignment::Center),
            submission_result(&self.borrow_result, p),
        ]
        .spacing(6);

        // Return form
        let return_form = column![
            section_title("Return a seat", p),
            row![
                text_input("borrow id", &self.return_id)
                    .on_input(Message::ReturnIdChanged)
                    .on_submit(Message::SubmitReturn)
                    .size(12)
                    .padding([4, 8])
                    .width(280),
                button(text("Return").size(11))
                    .on_press(Message::SubmitReturn)
                    .padding([4, 12]),
            ]
            .spacing(8)
            .align_y(Alignment::Center),
            submission_result(&self.return_result, p),
        ]
        .spacing(6);

        // Live outstanding borrows with per-row return actions
        let outstanding_header = row![
            section_title("Outstanding borrows", p),
            Space::with_width(Length::Fill),
            text_input("filter by user", &self.outstanding_user)
                .on_input(Message::OutstandingUserChanged)
                .on_submit(Message::RefreshOutstanding)
                .size(11)
                .padding([3, 8])
                .width(140),
            button(text("refresh").size(11).color(p.accent))
                .on_press(Message::RefreshOutstanding)
                .style(button::text)
                .padding([2, 8]),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        let mut outstanding_rows: Vec<Element<Message>> = Vec::new();
        if let Some(err) = &self.outstanding_error {
            outstanding_rows.push(
                text(format!("unable to load borrows: {err}"))
                    .size(11)
                    .color(p.yellow)
                    .into(),
            );
        } else if let Some(borrows) = &self.outstanding {
            if borrows.is_empty() {
                outstanding_rows.push(text("no current borrows").size(11).color(p.label).into());
            }
            for b in borrows {
                outstanding_rows.push(
                    row![
                        text(metrics::time_label(&b.borrowed_at))
                            .size(11)
                            .color(p.label)
                            .width(80),
                        text(b.user.clone()).size(11).color(p.text).width(140),
                        text(b.tool.clone()).size(11).color(p.text).width(200),
                        text(b.id.clone()).size(10).color(p.label).width(200),
                        button(text("return").size(10).color(p.accent))
                            .on_press(Message::ReturnBorrow(b.id.clone()))
                            .style(button::text)
                            .padding([1, 6]),
                    ]
                    .spacing(8)
                    .align_y(Alignment::Center)
                    .into(),
                );
            }
        } else {
            outstanding_rows.push(text("loading…").size(11).color(p.label).into());
        }

        // Per-tool detail rows from the latest snapshot
        let mut tool_rows: Vec<Element<Message>> = Vec::new();
        if let Some(snap) = &self.current {
            let mut tools: Vec<&ToolState> = snap.tools.iter().collect();
            tools.sort_by(|a, b| a.tool.cmp(&b.tool));
            for t in tools {
                let split = metrics::utilization_split(t);
                let overage_text = if split.in_overage > 0 {
                    text(format!("{} overage", split.in_overage))
                        .size(11)
                        .color(p.yellow)
                } else {
                    text("").size(11)
                };
                tool_rows.push(
                    row![
                        text(t.tool.clone()).size(11).color(p.text).width(220),
                        text(format!("{}/{} borrowed", t.borrowed, t.total))
                            .size(11)
                            .color(p.label)
                            .width(120),
                        text(format!("commit {}", t.commit))
                            .size(11)
                            .color(p.label)
                            .width(90),
                        overage_text,
                    ]
                    .spacing(8)
                    .into(),
                );
            }
        } else {
            tool_rows.push(text("waiting for data…").size(11).color(p.label).into());
        }

        scrollable(
            column![
                utilization,
                panel(
                    row![borrow_form, Space::with_width(30), return_form]
                        .spacing(10)
                        .into(),
                    p
                ),
                panel(
                    column![
                        outstanding_header,
                        Column::with_children(outstanding_rows).spacing(3),
                    ]
                    .spacing(8)
                    .into(),
                    p
                ),
                panel(
                    column![
                        section_title("Pool detail", p),
                        Column::with_children(tool_rows).spacing(3),
                    ]
                    .spacing(6)
                    .into(),
                    p
                ),
            ]
            .spacing(10)
            .padding(12),
        )
        .height(Length::Fill)
        .into()
    }

    // ─── COSTS TAB ──────────────────────────────────────────────

    fn view_costs(&self) -> Element<'_, Message> {
        let p = &self.pal;

        let header = row![
            section_title("Cost summary", p),
            Space::with_width(Length::Fill),
            button(text("refresh").size(11).color(p.accent))
                .on_press(Message::RefreshStatus)
                .style(button::text)
                .padding([2, 8]),
        ]
        .align_y(Alignment::Center);

        let body: Element<Message> = if let Some(err) = &self.status_error {
            text(format!("unable to load costs: {err}"))
                .size(11)
                .color(p.yellow)
                .into()
        } else if let Some(statuses) = &self.statuses {
            let mut rows: Vec<Element<Message>> = vec![row![
                text("tool").size(10).color(p.label).width(220),
                text("commit").size(10).color(p.label).width(110),
                text("overage").size(10).color(p.label).width(110),
                text("total").size(10).color(p.label).width(110),
            ]
            .spacing(8)
            .into()];

            let mut commit_total = 0.0;
            let mut overage_total = 0.0;
            let mut grand_total = 0.0;
            for s in statuses {
                commit_total += s.commit_price;
                overage_total += s.current_overage_cost;
                grand_total += s.total_cost;
                let overage_color = if s.state.overage > 0 { p.red } else { p.label };
                rows.push(
                    row![
                        text(s.state.tool.clone()).size(11).color(p.text).width(220),
                        text(format!("${:.2}", s.commit_price))
                            .size(11)
                            .color(p.label)
                            .width(110),
                        text(format!("${:.2}", s.current_overage_cost))
                            .size(11)
                            .color(overage_color)
                            .width(110),
                        text(format!("${:.2}", s.total_cost))
                            .size(11)
                            .color(p.accent)
                            .width(110),
                    ]
                    .spacing(8)
                    .into(),
                );
            }
            rows.push(
                row![
                    text("total").size(11).color(p.text).width(220),
                    text(format!("${commit_total:.2}")).size(11).color(p.text).width(110),
                    text(format!("${overage_total:.2}"))
                        .size(11)
                        .color(if overage_total > 0.0 { p.red } else { p.text })
                        .width(110),
                    text(format!("${grand_total:.2}")).size(12).color(p.accent).width(110),
                ]
                .spacing(8)
                .into(),
            );
            Column::with_children(rows).spacing(4).into()
        } else {
            text("press refresh to load costs")
                .size(11)
                .color(p.label)
                .into()
        };

        scrollable(
            column![panel(column![header, body].spacing(8).into(), p)]
                .spacing(10)
                .padding(12),
        )
        .height(Length::Fill)
        .into()
    }

    // ─── EVENTS TAB ─────────────────────────────────────────────

    fn view_events(&self) -> Element<'_, Message> {
        let p = &self.pal;

        let title_row = row![
            section_title("Activity feed", p),
            Space::with_width(Length::Fill),
            text(format!("{} events", self.feed.len()))
                .size(11)
                .color(p.label),
        ]
        .align_y(Alignment::Center);

        let mut rows: Vec<Element<Message>> = Vec::new();
        if self.feed.is_empty() {
            rows.push(text("no events yet").size(11).color(p.label).into());
        }
        // newest last in the buffer; show newest first
        let entries: Vec<&FeedEntry> = self.feed.iter().collect();
        for entry in entries.iter().rev() {
            let dot_color = match entry.severity {
                EventSeverity::Info => p.green,
                EventSeverity::Warning => p.yellow,
                EventSeverity::Critical => p.red,
            };
            rows.push(
                row![
                    text(entry.time.clone()).size(11).color(p.label).width(80),
                    text("●").size(9).color(dot_color),
                    text(entry.message.clone()).size(11).color(p.text),
                ]
                .spacing(8)
                .align_y(Alignment::Center)
                .into(),
            );
        }

        scrollable(
            column![panel(
                column![title_row, Column::with_children(rows).spacing(3)]
                    .spacing(8)
                    .into(),
                p
            )]
            .spacing(10)
            .padding(12),
        )
        .height(Length::Fill)
        .into()
    }

    // ─── SETTINGS ───────────────────────────────────────────────

    fn view_settings(&self) -> Element<'_, Message> {
        let p = &self.pal;

        let mut theme_btns: Vec<Element<Message>> = Vec::new();
        for &variant in ThemeVariant::ALL {
            let is_active = variant == self.theme_variant;
            theme_btns.push(
                button(
                    text(variant.name())
                        .size(11)
                        .color(if is_active { p.accent } else { p.label }),
                )
                .on_press(Message::SetTheme(variant))
                .style(if is_active {
                    button::primary
                } else {
                    button::secondary
                })
                .padding([4, 10])
                .into(),
            );
        }

        let mut accent_btns: Vec<Element<Message>> = Vec::new();
        for &accent in AccentColor::ALL {
            let is_active = accent == self.accent_color;
            accent_btns.push(
                button(text(accent.name()).size(11).color(accent.color()))
                    .on_press(Message::SetAccent(accent))
                    .style(if is_active {
                        button::primary
                    } else {
                        button::text
                    })
                    .padding([4, 10])
                    .into(),
            );
        }

        let server = column![
            section_title("License server", p),
            row![
                text_input("http://localhost:8000", &self.server_url_input)
                    .on_input(Message::ServerUrlChanged)
                    .on_submit(Message::ApplyServerUrl)
                    .size(12)
                    .padding([4, 8])
                    .width(320),
                button(text("Apply").size(11))
                    .on_press(Message::ApplyServerUrl)
                    .padding([4, 12]),
            ]
            .spacing(8)
            .align_y(Alignment::Center),
            text("applying reconnects the realtime stream")
                .size(10)
                .color(p.label),
        ]
        .spacing(6);

        let notifications = row![
            section_title("Desktop notifications", p),
            Space::with_width(12),
            button(
                text(if self.notifications { "on" } else { "off" })
                    .size(11)
                    .color(if self.notifications { p.green } else { p.label }),
            )
            .on_press(Message::ToggleNotifications)
            .style(button::secondary)
            .padding([3, 10]),
        ]
        .align_y(Alignment::Center);

        scrollable(
            column![
                panel(server.into(), p),
                panel(
                    column![
                        section_title("Theme", p),
                        Row::with_children(theme_btns).spacing(4),
                        Space::with_height(8),
                        section_title("Accent", p),
                        Row::with_children(accent_btns).spacing(4),
                    ]
                    .spacing(6)
                    .into(),
                    p
                ),
                panel(notifications.into(), p),
                panel(
                    column![
                        section_title("About", p),
                        text(format!("SeatWatch v{}", env!("CARGO_PKG_VERSION")))
                            .size(11)
                            .color(p.label),
                        text("keys: 1-4 tabs · Tab cycles · s settings · Esc closes")
                            .size(10)
                            .color(p.label),
                    ]
                    .spacing(4)
                    .into(),
                    p
                ),
            ]
            .spacing(10)
            .padding(12),
        )
        .height(Length::Fill)
        .into()
    }
}

// ─── WIDGET HELPERS ─────────────────────────────────────────────

fn metric_card(
    label: &'static str,
    value: String,
    value_color: Color,
    spark: Option<Vec<f32>>,
    pulsing: bool,
    p: &Palette,
) -> Element<'static, Message> {
    let mut items: Vec<Element<Message>> = vec![
        text(label).size(10).color(p.label).into(),
        text(value).size(22).color(value_color).into(),
    ];
    if let Some(data) = spark {
        items.push(
            Canvas::new(Sparkline {
                data,
                color: value_color,
            })
            .width(Length::Fill)
            .height(22)
            .into(),
        );
    }

    let panel_bg = p.panel_bg;
    let border_c = if pulsing { value_color } else { p.border };
    let border_w = if pulsing { 1.5 } else { 1.0 };
    container(Column::with_children(items).spacing(2))
        .width(Length::Fill)
        .padding(10)
        .style(move |_: &Theme| container::Style {
            background: Some(Background::Color(panel_bg)),
            border: Border {
                color: border_c,
                width: border_w,
                radius: 8.0.into(),
            },
            ..Default::default()
        })
        .into()
}

fn submission_result<'a>(
    result: &Option<Result<String, String>>,
    p: &Palette,
) -> Element<'a, Message> {
    match result {
        Some(Ok(msg)) => text(msg.clone()).size(11).color(p.green).into(),
        Some(Err(msg)) => text(msg.clone()).size(11).color(p.red).into(),
        None => Space::new(0, 0).into(),
    }
}

fn panel<'a>(content: Element<'a, Message>, p: &Palette) -> Element<'a, Message> {
    let panel_bg = p.panel_bg;
    let border_c = p.border;
    container(content)
        .width(Length::Fill)
        .padding(10)
        .style(move |_: &Theme| container::Style {
            background: Some(Background::Color(panel_bg)),
            border: Border {
                color: border_c,
                width: 1.0,
                radius: 8.0.into(),
            },
            shadow: Shadow {
                color: Color::from_rgba(0.0, 0.0, 0.0, 0.15),
                offset: Vector::new(0.0, 2.0),
                blur_radius: 8.0,
            },
            ..Default::default()
        })
        .into()
}

fn panel_bg<'a>(content: Element<'a, Message>, bg: Color, border_c: Color) -> Element<'a, Message> {
    container(content)
        .width(Length::Fill)
        .style(move |_: &Theme| container::Style {
            background: Some(Background::Color(bg)),
            border: Border {
                color: border_c,
                width: 0.0,
                radius: 0.0.into(),
            },
            ..Default::default()
        })
        .into()
}

fn menu_tab(label: &'static str, tab: Tab, current: Tab, p: &Palette) -> Element<'static, Message> {
    let is_active = tab == current;
    let accent = p.accent;
    let label_c = p.label;
    let text_c = p.text;
    let color = if is_active { accent } else { label_c };
    let hover_color = Color::from_rgba(accent.r, accent.g, accent.b, 0.15);
    button(text(label).size(12).color(color))
        .on_press(Message::TabSelected(tab))
        .padding([4, 14])
        .style(move |_: &Theme, status| {
            let bg = match status {
                button::Status::Hovered => hover_color,
                button::Status::Pressed => Color::from_rgba(accent.r, accent.g, accent.b, 0.25),
                _ => {
                    if is_active {
                        Color::from_rgba(accent.r, accent.g, accent.b, 0.1)
                    } else {
                        Color::TRANSPARENT
                    }
                }
            };
            button::Style {
                background: Some(Background::Color(bg)),
                text_color: text_c,
                border: Border {
                    color: if is_active { accent } else { Color::TRANSPARENT },
                    width: 0.0,
                    radius: 6.0.into(),
                },
                ..Default::default()
            }
        })
        .into()
}

fn section_title(label: &'static str, p: &Palette) -> Element<'static, Message> {
    text(label).size(11).color(p.accent).into()
}

/// Chart ceiling: headroom above the series maximum, minimum scale of 5.
fn chart_max(values: &[f32]) -> f32 {
    let max = values.iter().cloned().fold(0.0_f32, f32::max);
    (max * 1.2).max(5.0)
}

fn format_count(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BorrowEvent, BufferStats, Rates, RecentEvents};

    fn test_app() -> SeatWatch {
        let prefs = Preferences {
            notifications: false,
            ..Preferences::default()
        };
        SeatWatch::with_prefs(prefs)
    }

    fn tool(name: &str, borrowed: u64) -> ToolState {
        ToolState {
            tool: name.to_string(),
            total: 10,
            borrowed,
            commit: 5,
            overage: borrowed.saturating_sub(5),
            available: 10 - borrowed,
        }
    }

    fn snapshot(tools: Vec<ToolState>, borrow_rate: f64) -> Snapshot {
        Snapshot {
            rates: Rates {
                borrow_per_min: borrow_rate,
                return_per_min: 1.0,
                failure_per_min: 0.0,
                overage_percent: 10.0,
            },
            tools,
            recent_events: RecentEvents::default(),
            buffer_stats: BufferStats { total_events: 100 },
        }
    }

    fn borrow_event(id: &str, tool: &str) -> BorrowEvent {
        BorrowEvent {
            id: id.to_string(),
            tool: tool.to_string(),
            user: String::from("alice"),
            timestamp: String::from("2025-11-03T10:00:00Z"),
            is_overage: false,
        }
    }

    #[test]
    fn snapshot_grows_aggregate_series_once_per_cycle() {
        let mut app = test_app();
        for i in 0..3 {
            let _ = app.apply_snapshot(snapshot(vec![tool("A", 2)], i as f64));
        }
        assert_eq!(app.borrow_series.len(), 3);
        assert_eq!(app.overage_series.len(), 3);
    }

    #[test]
    fn range_change_resets_aggregate_series() {
        let mut app = test_app();
        for _ in 0..5 {
            let _ = app.apply_snapshot(snapshot(vec![tool("A", 2)], 3.0));
        }
        app.set_time_range(0);
        assert_eq!(app.borrow_series.len(), 0);
        assert_eq!(app.overage_series.len(), 0);
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 2)], 3.0));
        assert_eq!(app.borrow_series.len(), 1);
        // new capacity follows the selected span
        assert_eq!(app.borrow_series.capacity(), 60);
    }

    #[test]
    fn filter_excursion_leaves_aggregate_untouched() {
        let mut app = test_app();
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 2)], 1.0));
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 2)], 2.0));

        app.set_filter(ToolFilter::Tool(String::from("A")));
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 3)], 3.0));
        app.set_filter(ToolFilter::All);
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 3)], 4.0));

        // one sample per cycle, nothing lost or duplicated by the excursion
        assert_eq!(app.borrow_series.values(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn entering_entity_mode_resets_entity_state() {
        let mut app = test_app();
        let mut snap = snapshot(vec![tool("A", 2)], 1.0);
        snap.recent_events.borrows.push(borrow_event("b-1", "A"));
        let _ = app.apply_snapshot(snap);

        app.set_filter(ToolFilter::Tool(String::from("A")));
        assert_eq!(app.entity_series.len(), 0);
        assert!(app.entity_borrows.is_none());
        assert_eq!(app.entity_tool.as_ref().map(|t| t.tool.as_str()), Some("A"));

        // a cycle with matching borrows adds one entity sample
        let mut snap = snapshot(vec![tool("A", 3)], 1.0);
        snap.recent_events.borrows.push(borrow_event("b-2", "A"));
        let _ = app.apply_snapshot(snap);
        assert_eq!(app.entity_series.len(), 1);

        // and a cycle without matching borrows adds none
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 3)], 1.0));
        assert_eq!(app.entity_series.len(), 1);
    }

    #[test]
    fn stale_entity_fetch_is_discarded() {
        let mut app = test_app();
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 2), tool("B", 1)], 1.0));

        app.set_filter(ToolFilter::Tool(String::from("A")));
        let stale_generation = app.fetch_generation;

        // user switches to B before the fetch for A resolves
        app.set_filter(ToolFilter::Tool(String::from("B")));

        let borrows_a = vec![OutstandingBorrow {
            id: String::from("1"),
            tool: String::from("A"),
            user: String::from("alice"),
            borrowed_at: String::from("2025-11-03T10:00:00Z"),
        }];
        let _ = app.update(Message::BorrowsFetched {
            generation: stale_generation,
            result: Ok(borrows_a),
        });
        assert!(app.entity_borrows.is_none(), "stale response must be dropped");

        let borrows_b = vec![OutstandingBorrow {
            id: String::from("2"),
            tool: String::from("B"),
            user: String::from("bob"),
            borrowed_at: String::from("2025-11-03T10:00:00Z"),
        }];
        let _ = app.update(Message::BorrowsFetched {
            generation: app.fetch_generation,
            result: Ok(borrows_b),
        });
        assert_eq!(
            app.entity_borrows.as_ref().map(|b| b[0].tool.as_str()),
            Some("B")
        );
    }

    #[test]
    fn vanished_tool_keeps_last_known_entity_state() {
        let mut app = test_app();
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 4)], 1.0));
        app.set_filter(ToolFilter::Tool(String::from("A")));
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 7)], 1.0));
        assert_eq!(app.entity_tool.as_ref().map(|t| t.borrowed), Some(7));

        // the tool disappears; selection and last-known state survive
        let _ = app.apply_snapshot(snapshot(vec![tool("Z", 1)], 1.0));
        assert_eq!(app.filter, ToolFilter::Tool(String::from("A")));
        assert_eq!(app.entity_tool.as_ref().map(|t| t.borrowed), Some(7));
    }

    #[test]
    fn selector_choices_follow_snapshot() {
        let mut app = test_app();
        let _ = app.apply_snapshot(snapshot(vec![tool("B", 1), tool("A", 1)], 1.0));
        assert_eq!(app.tool_choices.len(), 3);
        assert_eq!(app.tool_choices[0], ToolFilter::All);

        // reordered list does not disturb the selection
        app.set_filter(ToolFilter::Tool(String::from("A")));
        let _ = app.apply_snapshot(snapshot(vec![tool("A", 1), tool("B", 1)], 1.0));
        assert_eq!(app.filter, ToolFilter::Tool(String::from("A")));
    }

    #[test]
    fn connection_transitions_follow_worker_events() {
        let mut app = test_app();
        let _ = app.update(Message::Stream(stream::Event::Retrying {
            attempt: 3,
            delay: Duration::from_secs(8),
        }));
        assert_eq!(app.connection, ConnectionState::Retrying { attempt: 3 });

        let _ = app.update(Message::Stream(stream::Event::Connected));
        assert_eq!(app.connection, ConnectionState::Connected);

        let _ = app.update(Message::Stream(stream::Event::Failed));
        assert!(app.connection.is_failed());

        // manual reconnect tears the old subscription down
        let epoch = app.connection_epoch;
        let _ = app.update(Message::Reconnect);
        assert_eq!(app.connection_epoch, epoch + 1);
        assert_eq!(app.connection, ConnectionState::Connecting);
    }

    #[test]
    fn feed_deduplicates_overlapping_windows() {
        let mut app = test_app();
        let mut snap = snapshot(vec![tool("A", 2)], 1.0);
        snap.recent_events.borrows.push(borrow_event("b-1", "A"));
        let _ = app.apply_snapshot(snap.clone());
        let before = app.feed.len();
        // same window delivered again next cycle
        let _ = app.apply_snapshot(snap);
        assert_eq!(app.feed.len(), before);
    }

    #[test]
    fn outstanding_fetch_error_is_scoped() {
        let mut app = test_app();
        let _ = app.update(Message::OutstandingFetched(Err(String::from("boom"))));
        assert_eq!(app.outstanding_error.as_deref(), Some("boom"));
        assert!(app.outstanding.is_none());

        let _ = app.update(Message::OutstandingFetched(Ok(vec![])));
        assert!(app.outstanding_error.is_none());
        assert_eq!(app.outstanding.as_ref().map(Vec::len), Some(0));
    }

    #[test]
    fn format_count_inserts_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(48211), "48,211");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }
}
