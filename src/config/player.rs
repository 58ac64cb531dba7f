// Per-player settings as resolved by the data layer
// Read-only input to the engine, never written back

use crate::audio::track::PlayerMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub id: String,
    pub name: String,
    pub player_type: PlayerMode,
    pub auto_advance: bool,
    pub default_to_after: bool,
    pub before_label: String,
    pub after_label: String,
    pub colors: PlayerColors,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            id: "local".to_string(),
            name: "MixFlip".to_string(),
            player_type: PlayerMode::Dual,
            auto_advance: false,
            default_to_after: false,
            before_label: "Before".to_string(),
            after_label: "After".to_string(),
            colors: PlayerColors::default(),
        }
    }
}

impl PlayerSettings {
    pub fn before_label(&self) -> &str {
        label_or(&self.before_label, "Before")
    }

    pub fn after_label(&self) -> &str {
        label_or(&self.after_label, "After")
    }
}

fn label_or<'a>(label: &'a str, fallback: &'a str) -> &'a str {
    if label.trim().is_empty() {
        fallback
    } else {
        label
    }
}

/// Hex colours (`#rrggbb`) picked in the dashboard. Missing ones use the theme default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerColors {
    pub primary: Option<String>,
    pub accent: Option<String>,
    pub background: Option<String>,
    pub text: Option<String>,
    pub muted: Option<String>,
}
