use super::events::{self, Focus, UiEvent};
use super::{TerminalManager, Theme};
use crate::audio::progress::{format_clock, ProgressTracker};
use crate::audio::track::{DualRole, PlayerMode};
use crate::config::Config;
use crate::error::PlaybackError;
use crate::playback::{
    GestureSettings, Intent, PlaybackController, PlayerEvent, PointerInput, PointerPhase, PointerSource,
    SessionPhase, SessionView, ToggleGestureController,
};
use anyhow::Result;
use crossterm::event;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

// Nothing moves on screen, so input latency is all that matters
const IDLE_POLL: Duration = Duration::from_millis(250);
const STATUS_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointerTarget {
    Toggle,
    Progress,
    Playlist,
}

/// Where the interactive widgets landed in the last frame
#[derive(Debug, Clone, Copy, Default)]
struct Regions {
    toggle: Rect,
    progress: Rect,
    playlist: Rect,
}

struct PlaylistRow {
    title: String,
    artist: String,
}

pub struct App {
    terminal: TerminalManager,
    controller: PlaybackController,
    gestures: ToggleGestureController,
    theme: Theme,
    player_name: String,
    player_events: mpsc::UnboundedReceiver<PlayerEvent>,
    rows: Vec<PlaylistRow>,
    list_state: ListState,
    focus: Focus,
    regions: Regions,
    pointer_target: Option<PointerTarget>,
    cell_width_px: f64,
    frame_interval: Duration,
    status: Option<(String, Instant)>,
    should_quit: bool,
}

impl App {
    pub fn new(config: &Config, mut controller: PlaybackController) -> Result<Self> {
        let (events_tx, player_events) = mpsc::unbounded_channel();
        controller.set_event_sender(events_tx);

        let mut gestures = ToggleGestureController::new(GestureSettings {
            drag_threshold_px: config.gestures.drag_threshold_px,
            debounce: Duration::from_millis(config.gestures.debounce_ms),
            touch_click_suppress: Duration::from_millis(config.gestures.touch_click_suppress_ms),
        });
        gestures.set_focus(true);

        let rows: Vec<PlaylistRow> = controller
            .playlist()
            .iter()
            .map(|song| PlaylistRow {
                title: song.display_title().to_string(),
                artist: song.display_artist().to_string(),
            })
            .collect();

        let mut list_state = ListState::default();
        if !rows.is_empty() {
            list_state.select(Some(0));
        }

        let theme = Theme::named(&config.ui.theme).with_colors(&controller.player().colors);
        let player_name = controller.player().name.clone();

        // Terminal goes into raw mode last, after everything that can fail
        let terminal = TerminalManager::new()?;

        Ok(Self {
            terminal,
            controller,
            gestures,
            theme,
            player_name,
            player_events,
            rows,
            list_state,
            focus: Focus::Player,
            regions: Regions::default(),
            pointer_target: None,
            cell_width_px: config.gestures.cell_width_px.max(1.0),
            frame_interval: config.ui.frame_interval(),
            status: None,
            should_quit: false,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        match self.controller.preload() {
            Ok(()) | Err(PlaybackError::PlanInactive) => {}
            Err(e) => self.set_status(e.to_string()),
        }

        // poll input, drain the engine, draw
        while !self.should_quit {
            let timeout = if self.is_animating() {
                self.frame_interval
            } else {
                IDLE_POLL
            };

            if event::poll(timeout)? {
                let terminal_event = event::read()?;
                for ui_event in events::map_event(&terminal_event, self.focus) {
                    self.handle_ui_event(ui_event);
                }
            }

            self.controller.pump(Instant::now());
            while let Ok(player_event) = self.player_events.try_recv() {
                self.on_player_event(player_event);
            }

            self.render()?;

            // load tasks and the blocking decoder pool get their turn
            tokio::task::yield_now().await;
        }

        info!("Quitting, tearing down player");
        self.controller.teardown();
        Ok(())
    }

    fn is_animating(&self) -> bool {
        self.controller.session().is_loading()
            || self.controller.progress().is_running()
            || self.controller.is_crossfading()
    }

    fn set_status(&mut self, message: String) {
        self.status = Some((message, Instant::now()));
    }

    fn dispatch(&mut self, intent: Intent) {
        if let Err(e) = self.controller.apply_intent(intent, Instant::now()) {
            debug!("Intent {:?} rejected: {}", intent, e);
            self.set_status(e.to_string());
        }
    }

    fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
        self.gestures.set_focus(focus == Focus::Player);
    }

    fn handle_ui_event(&mut self, ui_event: UiEvent) {
        match ui_event {
            UiEvent::Quit => self.should_quit = true,
            UiEvent::CycleFocus => self.set_focus(self.focus.next()),
            UiEvent::PlayerKey(key) => {
                let active = self.controller.session().active_role();
                if let Some(intent) = self.gestures.key(key, active, Instant::now()) {
                    self.dispatch(intent);
                }
            }
            UiEvent::ListUp => self.move_selection(-1),
            UiEvent::ListDown => self.move_selection(1),
            UiEvent::ListSelect => {
                if let Some(index) = self.list_state.selected() {
                    self.dispatch(Intent::Select(index));
                }
            }
            UiEvent::Mouse { phase, column, row } => self.handle_mouse(phase, column, row),
            UiEvent::Resize => {}
        }
    }

    fn move_selection(&mut self, delta: i32) {
        if self.rows.is_empty() {
            return;
        }

        let current = self.list_state.selected().unwrap_or(0);
        let new_index = if delta < 0 {
            current.saturating_sub(delta.unsigned_abs() as usize)
        } else {
            (current + delta as usize).min(self.rows.len() - 1)
        };

        self.list_state.select(Some(new_index));
    }

    fn target_at(&self, column: u16, row: u16) -> Option<PointerTarget> {
        if events::contains(self.regions.toggle, column, row) {
            Some(PointerTarget::Toggle)
        } else if events::contains(self.regions.progress, column, row) {
            Some(PointerTarget::Progress)
        } else if events::contains(self.regions.playlist, column, row) {
            Some(PointerTarget::Playlist)
        } else {
            None
        }
    }

    fn handle_mouse(&mut self, phase: PointerPhase, column: u16, row: u16) {
        if phase == PointerPhase::Down {
            // a drag belongs to whatever it started on
            self.pointer_target = self.target_at(column, row);
            match self.pointer_target {
                Some(PointerTarget::Toggle | PointerTarget::Progress) => self.set_focus(Focus::Player),
                Some(PointerTarget::Playlist) => self.set_focus(Focus::Playlist),
                None => {}
            }
        }

        let x = events::column_to_px(column, self.cell_width_px);
        match self.pointer_target {
            Some(PointerTarget::Toggle) => {
                let input = PointerInput {
                    phase,
                    source: PointerSource::Mouse,
                    x,
                    at: Instant::now(),
                };
                let bounds = events::toggle_bounds(self.regions.toggle, self.cell_width_px);
                let active = self.controller.session().active_role();
                if let Some(intent) = self.gestures.pointer(input, bounds, active) {
                    self.dispatch(intent);
                }
            }
            Some(PointerTarget::Progress) if matches!(phase, PointerPhase::Down | PointerPhase::Move) => {
                let bar = events::toggle_bounds(self.regions.progress, self.cell_width_px);
                if let Some(fraction) = ProgressTracker::fraction_from_click(x, bar.left, bar.width) {
                    self.dispatch(Intent::Seek(fraction));
                }
            }
            Some(PointerTarget::Playlist) if phase == PointerPhase::Click => {
                if let Some(index) = events::list_index_at(self.regions.playlist, self.list_state.offset(), row) {
                    if index < self.rows.len() {
                        self.list_state.select(Some(index));
                        self.dispatch(Intent::Select(index));
                    }
                }
            }
            _ => {}
        }

        if phase == PointerPhase::Click {
            self.pointer_target = None;
        }
    }

    fn on_player_event(&mut self, player_event: PlayerEvent) {
        match player_event {
            PlayerEvent::SongChanged(id) => {
                if let Some(index) = self.controller.playlist().index_of(&id) {
                    self.list_state.select(Some(index));
                }
                self.status = None;
            }
            PlayerEvent::TrackEnded(_) => self.set_status("Finished".to_string()),
            PlayerEvent::Error(e) => self.set_status(e.to_string()),
            other => debug!("Player event: {:?}", other),
        }
    }

    fn render(&mut self) -> Result<()> {
        let view = self.controller.snapshot();
        let theme = self.theme;
        let focus = self.focus;
        let player_name = self.player_name.as_str();
        let rows = &self.rows;
        let status = self
            .status
            .as_ref()
            .filter(|(_, at)| at.elapsed() < STATUS_TTL)
            .map(|(message, _)| message.clone());
        let mut list_state = self.list_state.clone();
        let mut regions = self.regions;

        self.terminal.draw(|f| {
            regions = Self::render_ui(f, &view, &theme, player_name, rows, &mut list_state, focus, status.as_deref());
        })?;

        self.list_state = list_state;
        self.regions = regions;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn render_ui(
        f: &mut Frame,
        view: &SessionView,
        theme: &Theme,
        player_name: &str,
        rows: &[PlaylistRow],
        list_state: &mut ListState,
        focus: Focus,
        status: Option<&str>,
    ) -> Regions {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Now playing
                Constraint::Min(0),    // Player + playlist
                Constraint::Length(1), // Status line
            ])
            .split(f.area());

        Self::render_header(f, chunks[0], view, theme, player_name);

        let regions = if view.has_active_plan {
            Self::render_player(f, chunks[1], view, theme, rows, list_state, focus)
        } else {
            Self::render_plan_notice(f, chunks[1], theme);
            Regions::default()
        };

        Self::render_status(f, chunks[2], view, theme, status);
        regions
    }

    fn render_header(f: &mut Frame, area: Rect, view: &SessionView, theme: &Theme, player_name: &str) {
        let line = match &view.song {
            Some(song) => {
                let mut spans = vec![
                    Span::styled(song.title.clone(), theme.title()),
                    Span::raw(" - "),
                    Span::raw(song.artist.clone()),
                ];
                if view.phase == SessionPhase::Loading {
                    spans.push(Span::styled("  loading...", theme.inactive_segment()));
                }
                Line::from(spans)
            }
            None => Line::from(Span::styled("No song selected", theme.inactive_segment())),
        };

        let header = Paragraph::new(line)
            .style(theme.base())
            .block(Block::default().borders(Borders::ALL).title(player_name.to_string()));
        f.render_widget(header, area);
    }

    fn render_plan_notice(f: &mut Frame, area: Rect, theme: &Theme) {
        let notice = Paragraph::new(vec![
            Line::from(Span::styled("Playback is unavailable for this player.", theme.title())),
            Line::from("The owner's plan is not active."),
        ])
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
        f.render_widget(notice, area);
    }

    fn render_player(
        f: &mut Frame,
        area: Rect,
        view: &SessionView,
        theme: &Theme,
        rows: &[PlaylistRow],
        list_state: &mut ListState,
        focus: Focus,
    ) -> Regions {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Before/after toggle
                Constraint::Length(3), // Progress
                Constraint::Min(3),    // Playlist
            ])
            .split(area);

        let toggle = Self::render_toggle(f, chunks[0], view, theme, focus == Focus::Player);
        let progress = Self::render_progress(f, chunks[1], view, theme);
        Self::render_playlist(f, chunks[2], view, theme, rows, list_state, focus == Focus::Playlist);

        Regions {
            toggle,
            progress,
            playlist: chunks[2],
        }
    }

    fn render_toggle(f: &mut Frame, area: Rect, view: &SessionView, theme: &Theme, focused: bool) -> Rect {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(theme.border(focused))
            .title(if view.mode == PlayerMode::Classic { "Mix" } else { "Mix (t to flip)" });
        let inner = block.inner(area);
        f.render_widget(block, area);

        if view.mode == PlayerMode::Classic {
            f.render_widget(Paragraph::new("Single mix").alignment(Alignment::Center), inner);
            return Rect::default();
        }

        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(inner);

        let segment = |label: &str, role: DualRole| {
            let style = if view.active_role == role {
                theme.active_segment()
            } else {
                theme.inactive_segment()
            };
            Paragraph::new(label.to_string())
                .alignment(Alignment::Center)
                .style(style)
        };
        f.render_widget(segment(&view.before_label, DualRole::Before), halves[0]);
        f.render_widget(segment(&view.after_label, DualRole::After), halves[1]);

        inner
    }

    fn render_progress(f: &mut Frame, area: Rect, view: &SessionView, theme: &Theme) -> Rect {
        let state_text = match view.phase {
            SessionPhase::Playing => "▶ Playing",
            SessionPhase::Ready => "⏸ Paused",
            SessionPhase::Loading if view.wants_play => "… Loading (will play)",
            SessionPhase::Loading => "… Loading",
            SessionPhase::Idle => "⏹ Idle",
        };

        let block = Block::default().borders(Borders::ALL).title(state_text);
        let inner = block.inner(area);
        let gauge = Gauge::default()
            .block(block)
            .gauge_style(theme.gauge())
            .ratio(view.fraction.clamp(0.0, 1.0))
            .label(format!(
                "{} / {}",
                format_clock(view.position_secs),
                format_clock(view.duration_secs)
            ));
        f.render_widget(gauge, area);

        inner
    }

    fn render_playlist(
        f: &mut Frame,
        area: Rect,
        view: &SessionView,
        theme: &Theme,
        rows: &[PlaylistRow],
        list_state: &mut ListState,
        focused: bool,
    ) {
        let current = view.song.as_ref().map(|song| song.index);
        let items: Vec<ListItem> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let is_current = current == Some(i);
                let prefix = if is_current { "♪ " } else { "  " };
                let style = if is_current { theme.current() } else { Style::default() };
                ListItem::new(format!("{}{} - {}", prefix, row.title, row.artist)).style(style)
            })
            .collect();

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.border(focused))
                    .title(format!("Playlist ({})", view.playlist_len)),
            )
            .highlight_style(theme.highlight())
            .highlight_symbol("► ");

        f.render_stateful_widget(list, area, list_state);
    }

    fn render_status(f: &mut Frame, area: Rect, view: &SessionView, theme: &Theme, status: Option<&str>) {
        let attribution = if view.source.shows_attribution() {
            "Powered by MixFlip"
        } else {
            ""
        };
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(attribution.len() as u16)])
            .split(area);

        let left = match (status, &view.error) {
            (Some(message), _) => Paragraph::new(message.to_string()).style(theme.error()),
            (None, Some(error)) if view.phase == SessionPhase::Idle => {
                Paragraph::new(format!("{} (select the song again to retry)", error)).style(theme.error())
            }
            _ if !view.has_active_plan => Paragraph::new("q quit").style(theme.inactive_segment()),
            _ => Paragraph::new("space play/pause · t flip · ←/→ before/after · ↑/↓ song · tab focus · q quit")
                .style(theme.inactive_segment()),
        };
        f.render_widget(left, chunks[0]);

        if !attribution.is_empty() {
            f.render_widget(
                Paragraph::new(attribution)
                    .alignment(Alignment::Right)
                    .style(theme.inactive_segment()),
                chunks[1],
            );
        }
    }
}
