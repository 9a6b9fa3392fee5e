//! Built-in themes for wavedeck
//!
//! This module contains pre-defined themes and the spectrogram color maps.

use crate::config::ColorMap;
use crate::tui::{GlobalTheme, Theme, WaveformTheme};
use ratatui::style::Color;

// Helper function to convert hex RGB to Color::Rgb
const fn rgb(r: u8, g: u8, b: u8) -> Color {
    Color::Rgb(r, g, b)
}

/// Teal theme
///
/// The stock look: pale teal waveform, saturated teal progress and a coral
/// cursor on a dark background.
pub fn teal() -> Theme {
    Theme {
        global: GlobalTheme {
            background: rgb(17, 24, 39),        // #111827
            foreground: rgb(229, 231, 235),     // #e5e7eb
            highlight: Some(rgb(20, 184, 166)), // #14b8a6
        },
        waveform: WaveformTheme {
            wave: rgb(204, 251, 241),     // #ccfbf1
            progress: rgb(94, 234, 212),  // #5eead4
            cursor: rgb(246, 97, 81),     // #f66151
        },
        button: rgb(20, 184, 166), // #14b8a6
        button_text: rgb(255, 255, 255),
    }
}

/// Catppuccin Mocha theme
///
/// A soothing pastel theme with warm, cozy colors.
/// Based on [Catppuccin](https://github.com/catppuccin/catppuccin)
pub fn catppuccin_mocha() -> Theme {
    let mut theme = Theme {
        global: GlobalTheme {
            background: rgb(30, 30, 46),         // #1e1e2e
            foreground: rgb(205, 214, 244),      // #cdd6f4
            highlight: Some(rgb(203, 166, 247)), // #cba6f7 (mauve)
        },
        ..Default::default()
    };
    theme.apply_global_as_default();
    theme
}

/// Dracula theme
///
/// A dark theme with high contrast and vibrant accent colors.
/// Based on [Dracula Theme](https://draculatheme.com/)
pub fn dracula() -> Theme {
    let mut theme = Theme {
        global: GlobalTheme {
            background: rgb(40, 42, 54),         // #282a36
            foreground: rgb(248, 248, 242),      // #f8f8f2
            highlight: Some(rgb(189, 147, 249)), // #bd93f9 (purple)
        },
        ..Default::default()
    };
    theme.apply_global_as_default();
    theme
}

/// Gruvbox Dark theme
///
/// A warm, retro theme designed to be easy on the eyes.
/// Based on [Gruvbox](https://github.com/morhetz/gruvbox)
pub fn gruvbox_dark() -> Theme {
    let mut theme = Theme {
        global: GlobalTheme {
            background: rgb(40, 40, 40),        // #282828
            foreground: rgb(235, 219, 178),     // #ebdbb2
            highlight: Some(rgb(254, 128, 25)), // #fe8019 (orange)
        },
        ..Default::default()
    };
    theme.apply_global_as_default();
    theme
}

/// Nord theme
///
/// Based on [Nord](https://github.com/arcticicestudio/nord)
pub fn nord() -> Theme {
    let mut theme = Theme {
        global: GlobalTheme {
            background: rgb(46, 52, 64),         // #2E3440 (nord0)
            foreground: rgb(216, 222, 233),      // #D8DEE9 (nord4)
            highlight: Some(rgb(136, 192, 208)), // #88C0D0 (nord8 - frost)
        },
        ..Default::default()
    };
    theme.apply_global_as_default();
    theme
}

/// Tokyo Night theme
///
/// Based on [tokyonight.nvim](https://github.com/folke/tokyonight.nvim)
pub fn tokyo_night() -> Theme {
    let mut theme = Theme {
        global: GlobalTheme {
            background: rgb(26, 27, 38),         // #1a1b26
            foreground: rgb(192, 202, 245),      // #c0caf5
            highlight: Some(rgb(187, 154, 247)), // #bb9af7 (magenta)
        },
        ..Default::default()
    };
    theme.apply_global_as_default();
    theme
}

/// Black & White (Dark) theme
pub fn black_white_dark() -> Theme {
    let mut theme = Theme {
        global: GlobalTheme {
            background: rgb(0, 0, 0),            // #000000
            foreground: rgb(255, 255, 255),      // #FFFFFF
            highlight: Some(rgb(128, 128, 128)), // #808080 (gray)
        },
        ..Default::default()
    };
    theme.apply_global_as_default();
    theme
}

/// Get a theme by name
///
/// Returns `None` if the theme name is not recognized. Names are
/// case-sensitive and match [`list_themes`].
pub fn get_by_name(name: &str) -> Option<Theme> {
    match name {
        "Black & White" => Some(black_white_dark()),
        "Catppuccin Mocha" => Some(catppuccin_mocha()),
        "Dracula" => Some(dracula()),
        "Gruvbox Dark" => Some(gruvbox_dark()),
        "Nord" => Some(nord()),
        "Teal" => Some(teal()),
        "Tokyo Night" => Some(tokyo_night()),
        _ => None,
    }
}

/// Get a list of all available theme names
pub fn list_themes() -> &'static [&'static str] {
    &[
        "Black & White",
        "Catppuccin Mocha",
        "Dracula",
        "Gruvbox Dark",
        "Nord",
        "Teal",
        "Tokyo Night",
    ]
}

// (position, r, g, b)
const ROSEUS: [(f32, u8, u8, u8); 7] = [
    (0.00, 1, 1, 1),
    (0.15, 31, 28, 91),
    (0.35, 106, 31, 140),
    (0.55, 193, 45, 139),
    (0.75, 242, 102, 94),
    (0.90, 249, 171, 78),
    (1.00, 254, 251, 115),
];

/// Color for a spectrogram intensity in 0..=1.
pub fn color_map(map: ColorMap, value: f32) -> Color {
    let value = if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    };
    match map {
        ColorMap::Gray => {
            let level = (value * 255.0).round() as u8;
            rgb(level, level, level)
        }
        ColorMap::Roseus => {
            let upper = ROSEUS
                .iter()
                .position(|(pos, ..)| *pos >= value)
                .unwrap_or(ROSEUS.len() - 1)
                .max(1);
            let (p0, r0, g0, b0) = ROSEUS[upper - 1];
            let (p1, r1, g1, b1) = ROSEUS[upper];
            let t = ((value - p0) / (p1 - p0)).clamp(0.0, 1.0);
            let lerp = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
            rgb(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
        }
    }
}
