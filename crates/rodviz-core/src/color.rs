//! Display colors for scene objects.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Linear RGBA color with components in `[0, 1]`.
///
/// Opaque to the frame pipeline: it is carried from the dataset into each mesh
/// and only interpreted by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ColorSpec", into = "ColorSpec")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 0.5, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const VIOLET: Color = Color::rgb(0.933, 0.510, 0.933);
    pub const PURPLE: Color = Color::rgb(0.502, 0.0, 0.502);

    /// Opaque color from RGB components.
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Color from RGBA components.
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Components as an array, in RGBA order.
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Look up a named color.
    pub fn from_name(name: &str) -> Option<Self> {
        let color = match name.to_ascii_lowercase().as_str() {
            "black" | "k" => Self::BLACK,
            "white" | "w" => Self::WHITE,
            "red" | "r" => Self::RED,
            "green" | "g" => Self::GREEN,
            "blue" | "b" => Self::BLUE,
            "violet" => Self::VIOLET,
            "purple" => Self::PURPLE,
            "yellow" | "y" => Self::rgb(1.0, 1.0, 0.0),
            "cyan" | "c" => Self::rgb(0.0, 1.0, 1.0),
            "magenta" | "m" => Self::rgb(1.0, 0.0, 1.0),
            "orange" => Self::rgb(1.0, 0.647, 0.0),
            "gray" | "grey" => Self::rgb(0.502, 0.502, 0.502),
            _ => return None,
        };
        Some(color)
    }

    fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 && digits.len() != 8 {
            return None;
        }
        let channel = |i: usize| {
            u8::from_str_radix(digits.get(i..i + 2)?, 16)
                .ok()
                .map(|v| v as f32 / 255.0)
        };
        let alpha = if digits.len() == 8 { channel(6)? } else { 1.0 };
        Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, alpha))
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::GREEN
    }
}

impl FromStr for Color {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::from_name(s)
            .or_else(|| Self::from_hex(s))
            .ok_or_else(|| Error::InvalidValue(format!("unrecognized color `{s}`")))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            byte(self.r),
            byte(self.g),
            byte(self.b),
            byte(self.a)
        )
    }
}

/// Wire form of a color: a name / hex string, or an RGBA array.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ColorSpec {
    Named(String),
    Rgba([f32; 4]),
}

impl TryFrom<ColorSpec> for Color {
    type Error = Error;

    fn try_from(spec: ColorSpec) -> Result<Self, Self::Error> {
        match spec {
            ColorSpec::Named(name) => name.parse(),
            ColorSpec::Rgba([r, g, b, a]) => Ok(Color::rgba(r, g, b, a)),
        }
    }
}

impl From<Color> for ColorSpec {
    fn from(color: Color) -> Self {
        ColorSpec::Rgba(color.to_array())
    }
}
