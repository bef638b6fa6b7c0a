//! Caption color parsing.
//!
//! Accepts #RGB and #RRGGBB hex strings plus a small set of named colors.
//! Invalid request values degrade to the default (white) instead of failing
//! the request.

/// RGB caption color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// White, the default caption color.
    pub fn white() -> Self {
        Self::new(255, 255, 255)
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::white()
    }
}

/// Parse a color from a hex string (`#RGB` or `#RRGGBB`) or a named color.
pub fn parse_color(value: &str) -> Option<Color> {
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }

    match value.to_ascii_lowercase().as_str() {
        "white" => Some(Color::white()),
        "black" => Some(Color::black()),
        "red" => Some(Color::new(255, 0, 0)),
        "green" => Some(Color::new(0, 255, 0)),
        "blue" => Some(Color::new(0, 0, 255)),
        "yellow" => Some(Color::new(255, 255, 0)),
        _ => None,
    }
}

/// Resolve an optional request-supplied color, falling back to white.
pub fn color_or_default(value: &str) -> Color {
    if value.is_empty() {
        return Color::white();
    }
    match parse_color(value) {
        Some(color) => color,
        None => {
            tracing::warn!(value, "unrecognized font color, using default");
            Color::white()
        }
    }
}

fn parse_hex(hex: &str) -> Option<Color> {
    match hex.len() {
        3 => {
            let r = u8::from_str_radix(&hex[0..1], 16).ok()?;
            let g = u8::from_str_radix(&hex[1..2], 16).ok()?;
            let b = u8::from_str_radix(&hex[2..3], 16).ok()?;
            // Double each component: 0xF -> 0xFF, 0xA -> 0xAA
            Some(Color::new(r * 17, g * 17, b * 17))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some(Color::new(r, g, b))
        }
        _ => None,
    }
}
