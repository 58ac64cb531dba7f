// Gesture translation for the before/after toggle
// Raw pointer and key input in, at most one intent out per event

use crate::audio::track::DualRole;
use std::time::{Duration, Instant};
use tracing::debug;

/// A request for the controller. The only way input reaches the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    SwitchTo(DualRole),
    FlipRole,
    TogglePlayPause,
    PreviousSong,
    NextSong,
    /// Fraction of the canonical duration, 0..=1
    Seek(f64),
    /// Playlist index
    Select(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Click,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSource {
    Mouse,
    Touch,
}

#[derive(Debug, Clone, Copy)]
pub struct PointerInput {
    pub phase: PointerPhase,
    pub source: PointerSource,
    /// Horizontal position in virtual pixels
    pub x: f64,
    pub at: Instant,
}

/// Horizontal extent of the two-segment control
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToggleBounds {
    pub left: f64,
    pub width: f64,
}

impl ToggleBounds {
    /// 0..=100 across the control
    pub fn percent(&self, x: f64) -> f64 {
        if self.width <= 0.0 || !x.is_finite() {
            return 0.0;
        }
        ((x - self.left) / self.width * 100.0).clamp(0.0, 100.0)
    }

    pub fn side_at(&self, x: f64) -> DualRole {
        if self.percent(x) >= 50.0 {
            DualRole::After
        } else {
            DualRole::Before
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Space,
    Char(char),
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSettings {
    pub drag_threshold_px: f64,
    pub debounce: Duration,
    pub touch_click_suppress: Duration,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            drag_threshold_px: 15.0,
            debounce: Duration::from_millis(300),
            touch_click_suppress: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    start_x: f64,
    /// Side the toggle showed when the drag last reported
    side: DualRole,
    past_threshold: bool,
}

/// Turns pointer and keyboard input on the toggle into [`Intent`]s.
///
/// Discrete role switches (click, tap, keys) are debounced. Drag crossings
/// are not: they follow the pointer, but only once it has travelled the
/// drag threshold, and a drag that got that far swallows its trailing click.
#[derive(Debug)]
pub struct ToggleGestureController {
    settings: GestureSettings,
    focused: bool,
    drag: Option<Drag>,
    suppress_click: bool,
    last_touch_at: Option<Instant>,
    last_toggle_at: Option<Instant>,
}

impl ToggleGestureController {
    pub fn new(settings: GestureSettings) -> Self {
        Self {
            settings,
            focused: false,
            drag: None,
            suppress_click: false,
            last_touch_at: None,
            last_toggle_at: None,
        }
    }

    pub fn set_focus(&mut self, focused: bool) {
        self.focused = focused;
    }

    fn debounced(&mut self, intent: Intent, now: Instant) -> Option<Intent> {
        if let Some(last) = self.last_toggle_at {
            if now.saturating_duration_since(last) < self.settings.debounce {
                debug!("Debounced {:?}", intent);
                return None;
            }
        }
        self.last_toggle_at = Some(now);
        Some(intent)
    }

    /// Feed one pointer event. `active` is the role currently audible.
    pub fn pointer(&mut self, input: PointerInput, bounds: ToggleBounds, active: DualRole) -> Option<Intent> {
        match input.phase {
            PointerPhase::Down => {
                self.suppress_click = false;
                let mut side = active;
                let mut intent = None;

                if input.source == PointerSource::Touch {
                    self.last_touch_at = Some(input.at);
                    let touched = bounds.side_at(input.x);
                    if touched != active {
                        intent = self.debounced(Intent::SwitchTo(touched), input.at);
                        if intent.is_some() {
                            side = touched;
                        }
                    }
                }

                self.drag = Some(Drag {
                    start_x: input.x,
                    side,
                    past_threshold: false,
                });
                intent
            }
            PointerPhase::Move => {
                let threshold = self.settings.drag_threshold_px;
                let drag = self.drag.as_mut()?;

                if !drag.past_threshold && (input.x - drag.start_x).abs() >= threshold {
                    drag.past_threshold = true;
                    self.suppress_click = true;
                }
                if !drag.past_threshold {
                    return None;
                }

                let side = bounds.side_at(input.x);
                if side == drag.side {
                    return None;
                }
                drag.side = side;
                self.last_toggle_at = Some(input.at);
                Some(Intent::SwitchTo(side))
            }
            PointerPhase::Up => {
                self.drag = None;
                if input.source == PointerSource::Touch {
                    self.last_touch_at = Some(input.at);
                }
                None
            }
            PointerPhase::Click => {
                if input.source == PointerSource::Mouse && self.is_synthetic_click(input.at) {
                    debug!("Ignoring click synthesized from touch");
                    return None;
                }
                if std::mem::take(&mut self.suppress_click) {
                    debug!("Ignoring click at the end of a drag");
                    return None;
                }

                let side = bounds.side_at(input.x);
                if side == active {
                    return None;
                }
                self.debounced(Intent::SwitchTo(side), input.at)
            }
        }
    }

    fn is_synthetic_click(&self, at: Instant) -> bool {
        self.last_touch_at
            .is_some_and(|touch| at.saturating_duration_since(touch) <= self.settings.touch_click_suppress)
    }

    /// Feed one key press. Ignored unless the player region has focus.
    pub fn key(&mut self, key: KeyInput, active: DualRole, now: Instant) -> Option<Intent> {
        if !self.focused {
            return None;
        }

        match key {
            KeyInput::Space => Some(Intent::TogglePlayPause),
            KeyInput::Char('t' | 'T' | 's' | 'S' | '/') => self.debounced(Intent::FlipRole, now),
            KeyInput::Left if active != DualRole::Before => {
                self.debounced(Intent::SwitchTo(DualRole::Before), now)
            }
            KeyInput::Right if active != DualRole::After => {
                self.debounced(Intent::SwitchTo(DualRole::After), now)
            }
            KeyInput::Up => Some(Intent::PreviousSong),
            KeyInput::Down => Some(Intent::NextSong),
            _ => None,
        }
    }
}

impl Default for ToggleGestureController {
    fn default() -> Self {
        Self::new(GestureSettings::default())
    }
}
