use iced::Color;
use serde::{Deserialize, Serialize};

// ─── ACCENT COLORS ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccentColor {
    Red,
    Orange,
    Green,
    Blue,
    Violet,
}

impl AccentColor {
    pub const ALL: &[AccentColor] = &[
        AccentColor::Red,
        AccentColor::Orange,
        AccentColor::Green,
        AccentColor::Blue,
        AccentColor::Violet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AccentColor::Red => "Red",
            AccentColor::Orange => "Orange",
            AccentColor::Green => "Green",
            AccentColor::Blue => "Blue",
            AccentColor::Violet => "Violet",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            AccentColor::Red => Color::from_rgb(0.93, 0.30, 0.35),
            AccentColor::Orange => Color::from_rgb(0.96, 0.52, 0.20),
            AccentColor::Green => Color::from_rgb(0.35, 0.87, 0.40),
            AccentColor::Blue => Color::from_rgb(0.33, 0.63, 0.95),
            AccentColor::Violet => Color::from_rgb(0.65, 0.45, 0.85),
        }
    }
}

// ─── THEME VARIANTS ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThemeVariant {
    CatppuccinLatte,
    CatppuccinMocha,
    GruvboxLight,
    GruvboxDark,
}

impl ThemeVariant {
    pub const ALL: &[ThemeVariant] = &[
        ThemeVariant::CatppuccinLatte,
        ThemeVariant::CatppuccinMocha,
        ThemeVariant::GruvboxLight,
        ThemeVariant::GruvboxDark,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ThemeVariant::CatppuccinLatte => "Latte",
            ThemeVariant::CatppuccinMocha => "Mocha",
            ThemeVariant::GruvboxLight => "Gruvbox Light",
            ThemeVariant::GruvboxDark => "Gruvbox Dark",
        }
    }

    pub fn is_light(&self) -> bool {
        matches!(
            self,
            ThemeVariant::CatppuccinLatte | ThemeVariant::GruvboxLight
        )
    }
}

// ─── PALETTE ────────────────────────────────────────────────────

/// All semantic colors the app uses, derived from theme + accent.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub bg: Color,
    pub panel_bg: Color,
    pub sidebar_bg: Color,
    pub border: Color,
    pub grid: Color,
    pub label: Color,
    pub text: Color,
    pub bar_bg: Color,
    // Semantic
    pub accent: Color,
    pub green: Color,
    pub red: Color,
    pub yellow: Color,
    pub cyan: Color,
    pub magenta: Color,
    pub blue: Color,
}

pub fn build_palette(theme: ThemeVariant, accent: AccentColor) -> Palette {
    let base = base_palette(theme);
    Palette {
        accent: accent.color(),
        ..base
    }
}

fn base_palette(theme: ThemeVariant) -> Palette {
    match theme {
        // ── Catppuccin Latte ──
        ThemeVariant::CatppuccinLatte => Palette {
            bg: hex(0xef, 0xf1, 0xf5),
            panel_bg: hex(0xe6, 0xe9, 0xef),
            sidebar_bg: hex(0xdc, 0xe0, 0xe8),
            border: hex(0xcc, 0xd0, 0xda),
            grid: Color::from_rgba(0.0, 0.0, 0.0, 0.06),
            label: hex(0x6c, 0x6f, 0x85),
            text: hex(0x4c, 0x4f, 0x69),
            bar_bg: hex(0xcc, 0xd0, 0xda),
            accent: hex(0x89, 0xb4, 0xfa), // placeholder, overridden
            green: hex(0x40, 0xa0, 0x2b),
            red: hex(0xd2, 0x0f, 0x39),
            yellow: hex(0xdf, 0x8e, 0x1d),
            cyan: hex(0x04, 0xa5, 0xe5),
            magenta: hex(0x88, 0x39, 0xef),
            blue: hex(0x1e, 0x66, 0xf5),
        },
        // ── Catppuccin Mocha ──
        ThemeVariant::CatppuccinMocha => Palette {
            bg: hex(0x1e, 0x1e, 0x2e),
            panel_bg: hex(0x18, 0x18, 0x25),
            sidebar_bg: hex(0x11, 0x11, 0x1b),
            border: hex(0x31, 0x32, 0x44),
            grid: Color::from_rgba(1.0, 1.0, 1.0, 0.06),
            label: hex(0xa6, 0xad, 0xc8),
            text: hex(0xcd, 0xd6, 0xf4),
            bar_bg: hex(0x31, 0x32, 0x44),
            accent: hex(0x89, 0xb4, 0xfa),
            green: hex(0xa6, 0xe3, 0xa1),
            red: hex(0xf3, 0x8b, 0xa8),
            yellow: hex(0xf9, 0xe2, 0xaf),
            cyan: hex(0x94, 0xe2, 0xd5),
            magenta: hex(0xcb, 0xa6, 0xf7),
            blue: hex(0x89, 0xb4, 0xfa),
        },
        // ── Gruvbox Light ──
        ThemeVariant::GruvboxLight => Palette {
            bg: hex(0xfb, 0xf1, 0xc7),
            panel_bg: hex(0xf2, 0xe5, 0xbc),
            sidebar_bg: hex(0xeb, 0xdb, 0xb2),
            border: hex(0xd5, 0xc4, 0xa1),
            grid: Color::from_rgba(0.0, 0.0, 0.0, 0.06),
            label: hex(0x66, 0x5c, 0x54),
            text: hex(0x3c, 0x38, 0x36),
            bar_bg: hex(0xd5, 0xc4, 0xa1),
            accent: hex(0x42, 0x7b, 0x58),
            green: hex(0x79, 0x74, 0x0e),
            red: hex(0x9d, 0x00, 0x06),
            yellow: hex(0xb5, 0x76, 0x14),
            cyan: hex(0x42, 0x7b, 0x58),
            magenta: hex(0x8f, 0x3f, 0x71),
            blue: hex(0x07, 0x66, 0x78),
        },
        // ── Gruvbox Dark ──
        ThemeVariant::GruvboxDark => Palette {
            bg: hex(0x28, 0x28, 0x28),
            panel_bg: hex(0x1d, 0x20, 0x21),
            sidebar_bg: hex(0x17, 0x19, 0x1a),
            border: hex(0x3c, 0x38, 0x36),
            grid: Color::from_rgba(1.0, 1.0, 1.0, 0.06),
            label: hex(0xa8, 0x99, 0x84),
            text: hex(0xeb, 0xdb, 0xb2),
            bar_bg: hex(0x3c, 0x38, 0x36),
            accent: hex(0x83, 0xa5, 0x98),
            green: hex(0xb8, 0xbb, 0x26),
            red: hex(0xfb, 0x49, 0x34),
            yellow: hex(0xfa, 0xbd, 0x2f),
            cyan: hex(0x8e, 0xc0, 0x7c),
            magenta: hex(0xd3, 0x86, 0x9b),
            blue: hex(0x83, 0xa5, 0x98),
        },
    }
}

/// Donut segment colors for the per-user distribution, cycled in order.
pub fn categorical_colors(pal: &Palette) -> [Color; 6] {
    [
        pal.accent, pal.green, pal.yellow, pal.magenta, pal.cyan, pal.blue,
    ]
}

const fn hex(r: u8, g: u8, b: u8) -> Color {
    Color::from_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
}
