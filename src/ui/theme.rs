// Player colours -> ratatui styles
// Pure mapping, nothing here touches the terminal

use crate::config::{PlayerColors, PlayerSettings};
use ratatui::style::{Color, Modifier, Style};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub primary: Color,
    pub accent: Color,
    pub background: Color,
    pub text: Color,
    pub muted: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: Color::Cyan,
            accent: Color::Yellow,
            background: Color::Reset,
            text: Color::White,
            muted: Color::DarkGray,
        }
    }
}

impl Theme {
    /// Built-in base palettes selected by `ui.theme`
    pub fn named(name: &str) -> Self {
        match name {
            "mono" => Self {
                primary: Color::White,
                accent: Color::Gray,
                background: Color::Reset,
                text: Color::White,
                muted: Color::DarkGray,
            },
            _ => Self::default(),
        }
    }

    /// Overlay the player's own colours; anything unparsable keeps the base
    pub fn from_player(player: &PlayerSettings) -> Self {
        Self::default().with_colors(&player.colors)
    }

    pub fn with_colors(self, colors: &PlayerColors) -> Self {
        let pick = |value: &Option<String>, fallback: Color| {
            value.as_deref().and_then(parse_hex).unwrap_or(fallback)
        };

        Self {
            primary: pick(&colors.primary, self.primary),
            accent: pick(&colors.accent, self.accent),
            background: pick(&colors.background, self.background),
            text: pick(&colors.text, self.text),
            muted: pick(&colors.muted, self.muted),
        }
    }

    pub fn base(&self) -> Style {
        Style::default().fg(self.text).bg(self.background)
    }

    pub fn title(&self) -> Style {
        Style::default().fg(self.primary).add_modifier(Modifier::BOLD)
    }

    pub fn active_segment(&self) -> Style {
        Style::default()
            .fg(self.background_or_black())
            .bg(self.primary)
            .add_modifier(Modifier::BOLD)
    }

    pub fn inactive_segment(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn gauge(&self) -> Style {
        Style::default().fg(self.accent)
    }

    pub fn highlight(&self) -> Style {
        Style::default().bg(self.muted).fg(self.text)
    }

    pub fn current(&self) -> Style {
        Style::default().fg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn border(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.primary)
        } else {
            Style::default().fg(self.muted)
        }
    }

    pub fn error(&self) -> Style {
        Style::default().fg(Color::Red)
    }

    fn background_or_black(&self) -> Color {
        match self.background {
            Color::Reset => Color::Black,
            other => other,
        }
    }
}

/// `#rrggbb` or `#rgb`
pub fn parse_hex(value: &str) -> Option<Color> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();

    match hex.len() {
        6 => Some(Color::Rgb(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let expand = |s: &str| channel(s).map(|v| v * 17);
            Some(Color::Rgb(
                expand(&hex[0..1])?,
                expand(&hex[1..2])?,
                expand(&hex[2..3])?,
            ))
        }
        _ => None,
    }
}
