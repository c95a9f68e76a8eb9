use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// COLOR - normalised `#rrggbb` cell colour
// ============================================================================

/// An opaque RGB cell colour.
///
/// Every colour that enters the editor goes through [`Color::parse`], so two
/// spellings of the same colour (`#FFF`, `ffffff`, `#ffffff`) always compare
/// equal and serialize as lowercase `#rrggbb`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Color([u8; 3]);

/// Rejected colour string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorParseError(pub String);

impl fmt::Display for ColorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid color '{}'", self.0)
    }
}

impl std::error::Error for ColorParseError {}

impl Color {
    pub const BLACK: Color = Color([0, 0, 0]);
    pub const WHITE: Color = Color([255, 255, 255]);

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    /// Parse `#rgb`, `#rrggbb`, `rgb` or `rrggbb` in any case.
    pub fn parse(input: &str) -> Result<Self, ColorParseError> {
        let trimmed = input.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !hex.is_ascii() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError(input.to_string()));
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| ColorParseError(input.to_string()));
        match hex.len() {
            6 => Ok(Self([channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?])),
            3 => {
                // Expand shorthand: "f0a" -> "ff00aa"
                let mut rgb = [0u8; 3];
                for (i, c) in hex.chars().enumerate() {
                    let v = channel(&c.to_string())?;
                    rgb[i] = v * 16 + v;
                }
                Ok(Self(rgb))
            }
            _ => Err(ColorParseError(input.to_string())),
        }
    }

    /// Parse a serialized cell: empty string or `None` means an empty cell.
    pub fn parse_cell(input: Option<&str>) -> Result<Option<Self>, ColorParseError> {
        match input {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => Self::parse(s).map(Some),
        }
    }

    /// Lowercase `#rrggbb`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }

    pub fn to_rgba(&self) -> image::Rgba<u8> {
        image::Rgba([self.0[0], self.0[1], self.0[2], 255])
    }

    /// Squared Euclidean distance in RGB space.
    pub fn distance_sq(&self, rgb: [u8; 3]) -> u32 {
        let dr = self.0[0] as i32 - rgb[0] as i32;
        let dg = self.0[1] as i32 - rgb[1] as i32;
        let db = self.0[2] as i32 - rgb[2] as i32;
        (dr * dr + dg * dg + db * db) as u32
    }

    /// Blend toward black. `percent` 100 = unchanged, 0 = black.
    pub fn faded_to_black(&self, percent: u8) -> Self {
        let factor = percent.min(100) as f32 / 100.0;
        let ch = |v: u8| (v as f32 * factor).round() as u8;
        Self([ch(self.0[0]), ch(self.0[1]), ch(self.0[2])])
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({})", self.to_hex())
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// PALETTE
// ============================================================================

/// SNES/PS1-style palette used for manual picking and trace quantisation.
/// Order matters: quantisation ties resolve to the earliest entry.
pub const SNES_PALETTE: &[&str] = &[
    // Darks
    "#000000", "#1a1a1a", "#2a2a2a", "#3a3a3a", "#5a5a5a", "#6a6a6a", "#7a7a7a",
    // Greys
    "#8a8a8a", "#9a9a9a", "#aaaaaa", "#cacaca", "#dadada", "#eaeaea", "#ffffff",
    // Skin tones
    "#3a1209", "#602426", "#8b413c", "#bf592c", "#cd7323", "#f29b5d", "#fbc686",
    // Yellow
    "#4a4000", "#6b6000", "#8b8000", "#b0a000", "#d4c000", "#ffe000", "#ffff40",
    // Green
    "#004000", "#006000", "#008000", "#00a000", "#00c000", "#00ff00", "#40ff80",
    // Cyan
    "#004040", "#006060", "#008080", "#00a0a0", "#00c0c0", "#00ffff", "#40ffdf",
    // Blue
    "#000040", "#000060", "#000080", "#0000a0", "#0000c0", "#0000ff", "#4080ff",
    // Blue violet
    "#200040", "#300060", "#400080", "#6000a0", "#8000c0", "#a000ff", "#c080ff",
    // Violet
    "#400040", "#600060", "#800080", "#a000a0", "#c000c0", "#ff00ff", "#ff80ff",
    // Magenta
    "#400020", "#600030", "#800040", "#a00060", "#c00080", "#ff00a0", "#ff80c0",
    // Red
    "#400000", "#600000", "#800000", "#a00000", "#c00000", "#ff0000", "#ff4040",
    // Red orange
    "#400000", "#600000", "#800000", "#a02000", "#c04000", "#ff6000", "#ff8040",
    // Orange
    "#402000", "#603000", "#804000", "#a06000", "#c08000", "#ffa000", "#ffc040",
    // Yellow orange
    "#4a3000", "#6b4000", "#8b5000", "#b07000", "#d49000", "#ffb000", "#ffd040",
];

/// Ordered list of selectable colours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Color>,
}

impl Default for Palette {
    fn default() -> Self {
        Self::snes()
    }
}

impl Palette {
    pub fn new(colors: Vec<Color>) -> Self {
        Self { colors }
    }

    pub fn snes() -> Self {
        let colors = SNES_PALETTE
            .iter()
            .filter_map(|hex| Color::parse(hex).ok())
            .collect();
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Index of the closest palette entry; ties keep the first one seen.
    pub fn nearest_index(&self, rgb: [u8; 3]) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (i, c) in self.colors.iter().enumerate() {
            let d = c.distance_sq(rgb);
            match best {
                Some((_, best_d)) if d >= best_d => {}
                _ => best = Some((i, d)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn nearest(&self, rgb: [u8; 3]) -> Option<Color> {
        self.nearest_index(rgb).map(|i| self.colors[i])
    }
}
