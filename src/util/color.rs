//! Sticker color palette.
//!
//! Colors cross the wire as `#RRGGBB` hex and are shown to users as one of
//! eight semantic tokens. The mapping is a fixed bidirectional table, so a
//! palette color survives hex -> token -> hex unchanged.

#[cfg(test)]
#[path = "color_test.rs"]
mod color_test;

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the eight palette colors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StickerColor {
    #[default]
    Yellow,
    Blue,
    Green,
    Pink,
    Purple,
    Red,
    Cyan,
    Orange,
}

const PALETTE: [(StickerColor, &str, &str); 8] = [
    (StickerColor::Yellow, "yellow", "#FFEB3B"),
    (StickerColor::Blue, "blue", "#2196F3"),
    (StickerColor::Green, "green", "#4CAF50"),
    (StickerColor::Pink, "pink", "#E91E63"),
    (StickerColor::Purple, "purple", "#9C27B0"),
    (StickerColor::Red, "red", "#F44336"),
    (StickerColor::Cyan, "cyan", "#00BCD4"),
    (StickerColor::Orange, "orange", "#FF9800"),
];

impl StickerColor {
    /// Every palette color in display order.
    pub const ALL: [Self; 8] = [
        Self::Yellow,
        Self::Blue,
        Self::Green,
        Self::Pink,
        Self::Purple,
        Self::Red,
        Self::Cyan,
        Self::Orange,
    ];

    /// Look up a wire hex value, case-insensitively. `None` if it is not a palette color.
    #[must_use]
    pub fn try_from_hex(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_uppercase();
        PALETTE.iter().find(|(_, _, hex)| *hex == wanted).map(|(color, _, _)| *color)
    }

    /// Look up a wire hex value; anything outside the palette maps to yellow.
    #[must_use]
    pub fn from_hex(raw: &str) -> Self {
        Self::try_from_hex(raw).unwrap_or_default()
    }

    /// Canonical uppercase wire hex.
    #[must_use]
    pub fn to_hex(self) -> &'static str {
        self.entry().2
    }

    /// Semantic token shown in the UI (e.g. `"green"`).
    #[must_use]
    pub fn token(self) -> &'static str {
        self.entry().1
    }

    #[must_use]
    pub fn from_token(raw: &str) -> Option<Self> {
        let wanted = raw.trim();
        PALETTE
            .iter()
            .find(|(_, token, _)| token.eq_ignore_ascii_case(wanted))
            .map(|(color, _, _)| *color)
    }

    fn entry(self) -> &'static (StickerColor, &'static str, &'static str) {
        &PALETTE[self as usize]
    }
}

impl fmt::Display for StickerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
