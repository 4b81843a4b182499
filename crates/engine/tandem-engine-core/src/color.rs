//! Color option parsing for the substitute renderer.

use serde::{Deserialize, Serialize};

/// Opaque white; used whenever a color is absent or unreadable.
pub const DEFAULT_COLOR: u32 = 0xFF_FF_FF;

/// A color as supplied by effect triggers: already numeric, or a hex string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Numeric(u32),
    Text(String),
}

impl ColorSpec {
    /// `0xRRGGBB`, or `None` when the value cannot be read as a 24-bit color.
    pub fn to_rgb(&self) -> Option<u32> {
        match self {
            ColorSpec::Numeric(n) if *n <= 0xFF_FF_FF => Some(*n),
            ColorSpec::Numeric(_) => None,
            ColorSpec::Text(s) => parse_hex(s),
        }
    }
}

impl From<u32> for ColorSpec {
    fn from(value: u32) -> Self {
        ColorSpec::Numeric(value)
    }
}

impl From<&str> for ColorSpec {
    fn from(value: &str) -> Self {
        ColorSpec::Text(value.to_string())
    }
}

/// Resolve an optional color to the renderer's numeric form.
pub fn parse_color(spec: Option<&ColorSpec>) -> u32 {
    spec.and_then(ColorSpec::to_rgb).unwrap_or(DEFAULT_COLOR)
}

/// Accepts `#rrggbb`, `rrggbb`, `#rgb`, `rgb` and `0xrrggbb`.
fn parse_hex(raw: &str) -> Option<u32> {
    let s = raw.trim();
    let digits = s
        .strip_prefix('#')
        .or_else(|| s.strip_prefix("0x"))
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => u32::from_str_radix(digits, 16).ok(),
        3 => {
            let expanded: String = digits.chars().flat_map(|c| [c, c]).collect();
            u32::from_str_radix(&expanded, 16).ok()
        }
        _ => None,
    }
}
