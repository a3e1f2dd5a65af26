//! Material style color schemes and the wrapper that applies them.

#[cfg(feature = "gui")]
use eframe::egui;
use log::debug;

use crate::platform::DYNAMIC_COLOR_MIN_VERSION;

/// ARGB color, `0xAARRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFFFFFFFF);
    pub const BLACK: Color = Color(0xFF000000);

    pub fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }
    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }
    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }
    pub fn blue(self) -> u8 {
        self.0 as u8
    }

    pub fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Linear blend towards `other`; `t = 0` keeps `self`, `t = 1` gives `other`.
    pub fn mix(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let blend = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color::from_argb(
            blend(self.alpha(), other.alpha()),
            blend(self.red(), other.red()),
            blend(self.green(), other.green()),
            blend(self.blue(), other.blue()),
        )
    }
}

#[cfg(feature = "gui")]
impl From<Color> for egui::Color32 {
    fn from(color: Color) -> Self {
        egui::Color32::from_rgba_unmultiplied(color.red(), color.green(), color.blue(), color.alpha())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorScheme {
    pub primary: Color,
    pub on_primary: Color,
    pub secondary: Color,
    pub tertiary: Color,
    pub background: Color,
    pub on_background: Color,
    pub surface: Color,
    pub on_surface: Color,
    pub surface_variant: Color,
    pub outline: Color,
    pub error: Color,
}

pub const DARK_SCHEME: ColorScheme = ColorScheme {
    primary: Color(0xFFD0BCFF),
    on_primary: Color(0xFF381E72),
    secondary: Color(0xFFCCC2DC),
    tertiary: Color(0xFFEFB8C8),
    background: Color(0xFF141218),
    on_background: Color(0xFFE6E0E9),
    surface: Color(0xFF141218),
    on_surface: Color(0xFFE6E0E9),
    surface_variant: Color(0xFF49454F),
    outline: Color(0xFF938F99),
    error: Color(0xFFF2B8B5),
};

pub const LIGHT_SCHEME: ColorScheme = ColorScheme {
    primary: Color(0xFF6650A4),
    on_primary: Color(0xFFFFFFFF),
    secondary: Color(0xFF625B71),
    tertiary: Color(0xFF7D5260),
    background: Color(0xFFFEF7FF),
    on_background: Color(0xFF1D1B20),
    surface: Color(0xFFFEF7FF),
    on_surface: Color(0xFF1D1B20),
    surface_variant: Color(0xFFE7E0EC),
    outline: Color(0xFF79747E),
    error: Color(0xFFB3261E),
};

impl ColorScheme {
    /// Scheme derived from a host-extracted seed color.
    pub fn from_seed(seed: Color, dark: bool) -> Self {
        let base = if dark { DARK_SCHEME } else { LIGHT_SCHEME };
        if dark {
            ColorScheme {
                primary: seed.mix(Color::WHITE, 0.55),
                on_primary: seed.mix(Color::BLACK, 0.7),
                secondary: seed.mix(Color::WHITE, 0.65),
                tertiary: seed.mix(base.tertiary, 0.5),
                background: seed.mix(Color::BLACK, 0.9),
                surface: seed.mix(Color::BLACK, 0.9),
                surface_variant: seed.mix(Color::BLACK, 0.7),
                ..base
            }
        } else {
            ColorScheme {
                primary: seed.mix(Color::BLACK, 0.2),
                on_primary: Color::WHITE,
                secondary: seed.mix(Color::BLACK, 0.4),
                tertiary: seed.mix(base.tertiary, 0.5),
                background: seed.mix(Color::WHITE, 0.95),
                surface: seed.mix(Color::WHITE, 0.95),
                surface_variant: seed.mix(Color::WHITE, 0.8),
                ..base
            }
        }
    }
}

/// Host state the color scheme depends on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeHost {
    /// Mobile platform version; `None` on desktop.
    pub platform_version: Option<u32>,
    pub dynamic_seed: Option<Color>,
    pub dark_mode: bool,
}

impl ThemeHost {
    pub fn plain(dark_mode: bool) -> Self {
        Self {
            platform_version: None,
            dynamic_seed: None,
            dark_mode,
        }
    }

    pub fn supports_dynamic_color(&self) -> bool {
        self.dynamic_seed.is_some()
            && self
                .platform_version
                .is_some_and(|version| version >= DYNAMIC_COLOR_MIN_VERSION)
    }
}

/// Font sizes in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Typography {
    pub headline: f32,
    pub title: f32,
    pub body: f32,
    pub label: f32,
    pub small: f32,
}

pub const TYPOGRAPHY: Typography = Typography {
    headline: 28.0,
    title: 22.0,
    body: 16.0,
    label: 14.0,
    small: 12.0,
};

/// Corner radii.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shapes {
    pub small: u8,
    pub medium: u8,
    pub large: u8,
}

pub const SHAPES: Shapes = Shapes {
    small: 8,
    medium: 12,
    large: 16,
};

/// Picks the dynamic scheme when requested and supported, else the built-in
/// palette matching the dark mode state.
pub fn resolve_color_scheme(dynamic_color: bool, host: &ThemeHost) -> ColorScheme {
    if dynamic_color && host.supports_dynamic_color() {
        if let Some(seed) = host.dynamic_seed {
            return ColorScheme::from_seed(seed, host.dark_mode);
        }
    }
    if host.dark_mode {
        DARK_SCHEME
    } else {
        LIGHT_SCHEME
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuizTheme {
    pub scheme: ColorScheme,
    pub dark: bool,
    pub typography: Typography,
    pub shapes: Shapes,
}

impl QuizTheme {
    pub fn resolve(dynamic_color: bool, host: &ThemeHost) -> Self {
        let scheme = resolve_color_scheme(dynamic_color, host);
        debug!(
            "[Theme] Resolved {} scheme (dynamic requested: {})",
            if host.dark_mode { "dark" } else { "light" },
            dynamic_color
        );
        Self {
            scheme,
            dark: host.dark_mode,
            typography: TYPOGRAPHY,
            shapes: SHAPES,
        }
    }
}

#[cfg(feature = "gui")]
impl QuizTheme {
    pub fn visuals(&self) -> egui::Visuals {
        use egui::CornerRadius;

        let s = &self.scheme;
        let mut visuals = if self.dark {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        };
        visuals.override_text_color = Some(s.on_surface.into());
        visuals.panel_fill = s.background.into();
        visuals.window_fill = s.surface.into();
        visuals.extreme_bg_color = s.surface_variant.into();
        visuals.faint_bg_color = s.surface_variant.into();
        visuals.hyperlink_color = s.tertiary.into();
        visuals.error_fg_color = s.error.into();
        visuals.selection.bg_fill = s.primary.into();
        visuals.selection.stroke.color = s.on_primary.into();
        visuals.widgets.noninteractive.bg_stroke.color = s.outline.into();
        visuals.widgets.inactive.bg_fill = s.surface_variant.into();
        visuals.widgets.inactive.weak_bg_fill = s.surface_variant.into();
        visuals.widgets.hovered.weak_bg_fill = s.secondary.into();
        visuals.widgets.active.weak_bg_fill = s.primary.into();
        visuals.window_corner_radius = CornerRadius::same(self.shapes.large);
        visuals.menu_corner_radius = CornerRadius::same(self.shapes.medium);
        for widget in [
            &mut visuals.widgets.noninteractive,
            &mut visuals.widgets.inactive,
            &mut visuals.widgets.hovered,
            &mut visuals.widgets.active,
            &mut visuals.widgets.open,
        ] {
            widget.corner_radius = CornerRadius::same(self.shapes.small);
        }
        visuals
    }

    pub fn apply(&self, ctx: &egui::Context) {
        use egui::{FontId, TextStyle};

        ctx.set_visuals(self.visuals());
        let t = self.typography;
        ctx.style_mut(|style| {
            style.text_styles.insert(TextStyle::Heading, FontId::proportional(t.headline));
            style.text_styles.insert(TextStyle::Body, FontId::proportional(t.body));
            style.text_styles.insert(TextStyle::Button, FontId::proportional(t.label));
            style.text_styles.insert(TextStyle::Small, FontId::proportional(t.small));
            style.text_styles.insert(TextStyle::Monospace, FontId::monospace(t.label));
        });
    }
}

/// Resolves and applies the theme, then runs `content` under it.
#[cfg(feature = "gui")]
pub fn quiz_theme<R>(
    ctx: &egui::Context,
    dynamic_color: bool,
    host: &ThemeHost,
    content: impl FnOnce(&egui::Context) -> R,
) -> R {
    QuizTheme::resolve(dynamic_color, host).apply(ctx);
    content(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mobile(version: u32, dark_mode: bool) -> ThemeHost {
        ThemeHost {
            platform_version: Some(version),
            dynamic_seed: Some(Color(0xFF00796B)),
            dark_mode,
        }
    }

    #[test]
    fn test_dark_palette_without_dynamic_color() {
        for version in [21, 30, 31, 35] {
            assert_eq!(resolve_color_scheme(false, &mobile(version, true)), DARK_SCHEME);
        }
        assert_eq!(resolve_color_scheme(false, &ThemeHost::plain(true)), DARK_SCHEME);
    }

    #[test]
    fn test_light_palette_fallback() {
        assert_eq!(resolve_color_scheme(true, &ThemeHost::plain(false)), LIGHT_SCHEME);
        assert_eq!(resolve_color_scheme(true, &mobile(30, false)), LIGHT_SCHEME);
    }

    #[test]
    fn test_dynamic_scheme_when_supported() {
        let host = mobile(31, true);
        let scheme = resolve_color_scheme(true, &host);
        assert_eq!(scheme, ColorScheme::from_seed(Color(0xFF00796B), true));
        assert_ne!(scheme, DARK_SCHEME);

        let light = resolve_color_scheme(true, &mobile(34, false));
        assert_eq!(light, ColorScheme::from_seed(Color(0xFF00796B), false));
    }

    #[test]
    fn test_dynamic_requires_seed() {
        let host = ThemeHost {
            platform_version: Some(34),
            dynamic_seed: None,
            dark_mode: true,
        };
        assert!(!host.supports_dynamic_color());
        assert_eq!(resolve_color_scheme(true, &host), DARK_SCHEME);
    }

    #[test]
    fn test_color_mix() {
        assert_eq!(Color::BLACK.mix(Color::WHITE, 0.0), Color::BLACK);
        assert_eq!(Color::BLACK.mix(Color::WHITE, 1.0), Color::WHITE);
        assert_eq!(Color(0xFF000000).mix(Color(0xFF646464), 0.5), Color(0xFF323232));
    }

    #[test]
    fn test_resolved_theme_tokens_are_fixed() {
        let theme = QuizTheme::resolve(true, &ThemeHost::plain(true));
        assert!(theme.dark);
        assert_eq!(theme.typography, TYPOGRAPHY);
        assert_eq!(theme.shapes, SHAPES);
    }
}
