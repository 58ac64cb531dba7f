// Terminal input -> UI events
// Mouse columns are scaled to virtual pixels so gesture thresholds mean the same thing everywhere

use crate::playback::{KeyInput, PointerPhase, ToggleBounds};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind};
use ratatui::layout::Rect;

/// Which region receives keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Player,
    Playlist,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Player => Focus::Playlist,
            Focus::Playlist => Focus::Player,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Quit,
    CycleFocus,
    /// Only produced while the player has focus
    PlayerKey(KeyInput),
    ListUp,
    ListDown,
    ListSelect,
    Mouse { phase: PointerPhase, column: u16, row: u16 },
    Resize,
}

pub fn map_event(event: &Event, focus: Focus) -> Vec<UiEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => map_key(key, focus).into_iter().collect(),
        Event::Mouse(mouse) => {
            let (column, row) = (mouse.column, mouse.row);
            let at = |phase| UiEvent::Mouse { phase, column, row };
            match mouse.kind {
                MouseEventKind::Down(MouseButton::Left) => vec![at(PointerPhase::Down)],
                MouseEventKind::Drag(MouseButton::Left) => vec![at(PointerPhase::Move)],
                // terminals report no clicks, a release is one
                MouseEventKind::Up(MouseButton::Left) => vec![at(PointerPhase::Up), at(PointerPhase::Click)],
                _ => Vec::new(),
            }
        }
        Event::Resize(_, _) => vec![UiEvent::Resize],
        _ => Vec::new(),
    }
}

fn map_key(key: &KeyEvent, focus: Focus) -> Option<UiEvent> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => return Some(UiEvent::Quit),
        (KeyCode::Char('q'), _) | (KeyCode::Esc, _) => return Some(UiEvent::Quit),
        (KeyCode::Tab, _) | (KeyCode::BackTab, _) => return Some(UiEvent::CycleFocus),
        _ => {}
    }

    match focus {
        Focus::Player => match key.code {
            KeyCode::Char(' ') => Some(UiEvent::PlayerKey(KeyInput::Space)),
            KeyCode::Char(c) => Some(UiEvent::PlayerKey(KeyInput::Char(c))),
            KeyCode::Left => Some(UiEvent::PlayerKey(KeyInput::Left)),
            KeyCode::Right => Some(UiEvent::PlayerKey(KeyInput::Right)),
            KeyCode::Up => Some(UiEvent::PlayerKey(KeyInput::Up)),
            KeyCode::Down => Some(UiEvent::PlayerKey(KeyInput::Down)),
            _ => None,
        },
        Focus::Playlist => match key.code {
            KeyCode::Up => Some(UiEvent::ListUp),
            KeyCode::Down => Some(UiEvent::ListDown),
            KeyCode::Enter => Some(UiEvent::ListSelect),
            _ => None,
        },
    }
}

pub fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x && column < area.x + area.width && row >= area.y && row < area.y + area.height
}

/// Centre of a terminal column in virtual pixels
pub fn column_to_px(column: u16, cell_width_px: f64) -> f64 {
    (column as f64 + 0.5) * cell_width_px
}

pub fn toggle_bounds(area: Rect, cell_width_px: f64) -> ToggleBounds {
    ToggleBounds {
        left: area.x as f64 * cell_width_px,
        width: area.width as f64 * cell_width_px,
    }
}

/// Playlist entry under `row`, for a bordered list scrolled to `offset`
pub fn list_index_at(area: Rect, offset: usize, row: u16) -> Option<usize> {
    let first_row = area.y + 1;
    let last_row = (area.y + area.height).checked_sub(1)?;
    if row < first_row || row >= last_row {
        return None;
    }
    Some(offset + (row - first_row) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventState, MouseEvent};

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn mouse(kind: MouseEventKind, column: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row: 4,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn test_keys_follow_focus() {
        assert_eq!(
            map_event(&key(KeyCode::Char(' ')), Focus::Player),
            vec![UiEvent::PlayerKey(KeyInput::Space)]
        );
        assert_eq!(map_event(&key(KeyCode::Up), Focus::Playlist), vec![UiEvent::ListUp]);
        assert_eq!(
            map_event(&key(KeyCode::Up), Focus::Player),
            vec![UiEvent::PlayerKey(KeyInput::Up)]
        );
        assert!(map_event(&key(KeyCode::Char(' ')), Focus::Playlist).is_empty());
        assert_eq!(map_event(&key(KeyCode::Tab), Focus::Playlist), vec![UiEvent::CycleFocus]);
        assert_eq!(map_event(&key(KeyCode::Char('q')), Focus::Player), vec![UiEvent::Quit]);
    }

    #[test]
    fn test_release_is_up_then_click() {
        let events = map_event(&mouse(MouseEventKind::Up(MouseButton::Left), 12), Focus::Player);
        assert_eq!(
            events,
            vec![
                UiEvent::Mouse { phase: PointerPhase::Up, column: 12, row: 4 },
                UiEvent::Mouse { phase: PointerPhase::Click, column: 12, row: 4 },
            ]
        );
        assert!(map_event(&mouse(MouseEventKind::Moved, 12), Focus::Player).is_empty());
    }

    #[test]
    fn test_geometry() {
        let area = Rect::new(10, 2, 20, 6);
        assert!(contains(area, 10, 2));
        assert!(!contains(area, 30, 2));

        assert_eq!(column_to_px(2, 8.0), 20.0);
        let bounds = toggle_bounds(area, 8.0);
        assert_eq!(bounds.left, 80.0);
        assert_eq!(bounds.width, 160.0);

        assert_eq!(list_index_at(area, 0, 2), None);
        assert_eq!(list_index_at(area, 0, 3), Some(0));
        assert_eq!(list_index_at(area, 5, 6), Some(8));
        assert_eq!(list_index_at(area, 0, 7), None);
    }
}
