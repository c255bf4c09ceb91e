//! Color canonicalization. Two colors match iff their canonical strings are equal.
//!
//! Canonical form: lower-case `#rrggbb` when the color is opaque, otherwise
//! `rgba(r, g, b, a)` with 0-255 integer channels and the alpha kept at full
//! precision, so `rgba(51, 102, 153, 1)` folds into `#336699` but an alpha of
//! `0.999` never does.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`, leading `#` optional.
#[allow(clippy::expect_used, reason = "pattern is a literal")]
static HEX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^#?([0-9a-f]{3,4}|[0-9a-f]{6}|[0-9a-f]{8})$").expect("valid regex");
});

/// `rgb(r, g, b)` or `rgba(r, g, b, a)` with 0-255 channels.
#[allow(clippy::expect_used, reason = "pattern is a literal")]
static RGB_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let num = r"([+-]?(?:\d+\.?\d*|\.\d+))";
    let pattern = format!(r"^rgba?\(\s*{num}\s*,\s*{num}\s*,\s*{num}\s*(?:,\s*{num}\s*)?\)$");
    return Regex::new(&pattern).expect("valid regex");
});

/// Color channels in `[0, 1]`, as the design tool stores them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelColor {
    /// Alpha. Absent means opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
    /// Blue.
    pub b: f64,
    /// Green.
    pub g: f64,
    /// Red.
    pub r: f64,
}

/// A color reduced to byte channels plus alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rgba {
    /// Alpha in `[0, 1]`.
    a: f64,
    /// Blue byte.
    b: u8,
    /// Green byte.
    g: u8,
    /// Red byte.
    r: u8,
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Rgba { a, b, g, r } = *self;
        if a < 1.0 {
            return write!(f, "rgba({r}, {g}, {b}, {a})");
        }
        return write!(f, "#{r:02x}{g:02x}{b:02x}");
    }
}

/// Scale a byte channel written as a decimal (0-255) to a byte.
#[allow(
    clippy::as_conversions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is clamped to 0..=255 and rounded before the cast"
)]
fn byte_from_decimal(channel: f64) -> u8 {
    return channel.clamp(0.0, 255.0).round() as u8;
}

/// Canonical string for a channel color. `None` when a channel is not finite.
pub fn from_channels(color: &ChannelColor) -> Option<String> {
    let alpha = color.a.unwrap_or(1.0);
    let finite = [color.r, color.g, color.b, alpha].iter().all(|c| return c.is_finite());
    if !finite {
        return None;
    }
    let rgba = Rgba {
        a: alpha.clamp(0.0, 1.0),
        b: byte_from_decimal(color.b.clamp(0.0, 1.0) * 255.0),
        g: byte_from_decimal(color.g.clamp(0.0, 1.0) * 255.0),
        r: byte_from_decimal(color.r.clamp(0.0, 1.0) * 255.0),
    };
    return Some(rgba.to_string());
}

/// Canonical string for a stringified color (hex, `rgb()`, `rgba()`).
/// Returns `None` for anything else.
pub fn normalize_str(color: &str) -> Option<String> {
    let lowered = color.trim().to_ascii_lowercase();
    let rgba = parse_hex(&lowered).or_else(|| return parse_rgb_function(&lowered))?;
    return Some(rgba.to_string());
}

/// Parse the hex forms accepted by [`HEX_PATTERN`].
fn parse_hex(color: &str) -> Option<Rgba> {
    let digits = HEX_PATTERN.captures(color)?.get(1)?.as_str();
    let expanded: String = if digits.len() <= 4 {
        digits.chars().flat_map(|c| return [c, c]).collect()
    } else {
        digits.to_string()
    };

    let byte_at = |start: usize| -> Option<u8> {
        let pair = expanded.get(start..start.saturating_add(2))?;
        return u8::from_str_radix(pair, 16).ok();
    };

    let alpha = match byte_at(6) {
        None => 1.0,
        Some(byte) => f64::from(byte) / 255.0,
    };
    return Some(Rgba {
        a: alpha,
        b: byte_at(4)?,
        g: byte_at(2)?,
        r: byte_at(0)?,
    });
}

/// Parse `rgb(...)` / `rgba(...)` with 0-255 channels and a 0-1 alpha.
fn parse_rgb_function(color: &str) -> Option<Rgba> {
    let caps = RGB_PATTERN.captures(color)?;
    let number = |idx: usize| -> Option<f64> {
        return caps.get(idx)?.as_str().parse::<f64>().ok();
    };
    let alpha = match caps.get(4) {
        None => 1.0,
        Some(m) => m.as_str().parse::<f64>().ok()?,
    };
    return Some(Rgba {
        a: alpha.clamp(0.0, 1.0),
        b: byte_from_decimal(number(3)?),
        g: byte_from_decimal(number(2)?),
        r: byte_from_decimal(number(1)?),
    });
}
