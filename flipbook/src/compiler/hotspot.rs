//! Interactive hotspots placed over the flipbook canvas.

use serde::{Deserialize, Serialize};

/// A tappable region that triggers a named animation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hotspot {
    /// Horizontal offset in pixels.
    pub x: i32,
    /// Vertical offset in pixels.
    pub y: i32,
    /// Animation to play when tapped.
    pub trigger_action: String,
}

impl Hotspot {
    /// Creates a hotspot.
    #[must_use]
    pub fn new(x: i32, y: i32, trigger_action: impl Into<String>) -> Self {
        Self {
            x,
            y,
            trigger_action: trigger_action.into(),
        }
    }

    /// The waddling duck from the flipbook demo.
    #[must_use]
    pub fn waddle_duck() -> Self {
        Self::new(100, 200, "waddle_duck")
    }
}

impl Default for Hotspot {
    fn default() -> Self {
        Self::waddle_duck()
    }
}
