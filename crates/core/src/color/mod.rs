//! RGB and HSV colour representations and the conversions between them.
//!
//! Hue is expressed in degrees within `[0, 360)`, saturation and value as
//! percentages within `[0, 100]`. Both conversions are pure and total.

use serde::{Deserialize, Serialize};

/// 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Converts the colour to HSV.
    pub fn to_hsv(self) -> Hsv {
        rgb_to_hsv(self.r, self.g, self.b)
    }

    /// Formats the colour as `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Hue/saturation/value triple.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Hsv {
    /// Hue in degrees, `[0, 360)`.
    pub h: f32,
    /// Saturation in percent, `[0, 100]`.
    pub s: f32,
    /// Value (brightness) in percent, `[0, 100]`.
    pub v: f32,
}

impl Hsv {
    pub const fn new(h: f32, s: f32, v: f32) -> Self {
        Self { h, s, v }
    }

    /// Returns a copy with every component pulled into its valid range.
    /// Hue wraps around the colour wheel; non-finite components become zero.
    pub fn clamped(self) -> Self {
        let finite = |value: f32| if value.is_finite() { value } else { 0.0 };
        let mut h = finite(self.h).rem_euclid(360.0);
        if h >= 360.0 {
            h = 0.0;
        }
        Self {
            h,
            s: finite(self.s).clamp(0.0, 100.0),
            v: finite(self.v).clamp(0.0, 100.0),
        }
    }

    /// Converts the colour to RGB.
    pub fn to_rgb(self) -> Rgb {
        hsv_to_rgb(self.h, self.s, self.v)
    }
}

impl From<Rgb> for Hsv {
    fn from(value: Rgb) -> Self {
        value.to_hsv()
    }
}

impl From<Hsv> for Rgb {
    fn from(value: Hsv) -> Self {
        value.to_rgb()
    }
}

/// Converts 8-bit RGB channels into HSV using the max/min/delta method.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let r = f32::from(r) / 255.0;
    let g = f32::from(g) / 255.0;
    let b = f32::from(b) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let mut h = if diff == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / diff)
    } else if max == g {
        60.0 * ((b - r) / diff + 2.0)
    } else {
        60.0 * ((r - g) / diff + 4.0)
    };
    if h < 0.0 {
        h += 360.0;
    }
    if h >= 360.0 {
        h -= 360.0;
    }

    let s = if max == 0.0 { 0.0 } else { diff / max };

    Hsv {
        h,
        s: s * 100.0,
        v: max * 100.0,
    }
}

/// Converts HSV back to 8-bit RGB. Inputs are clamped first.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let Hsv { h, s, v } = Hsv::new(h, s, v).clamped();
    let s = s / 100.0;
    let v = v / 100.0;

    if s == 0.0 {
        let gray = to_channel(v);
        return Rgb::new(gray, gray, gray);
    }

    let h6 = h / 60.0;
    let sector = h6.floor();
    let frac = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * frac);
    let t = v * (1.0 - s * (1.0 - frac));

    let (r, g, b) = match sector as u32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    Rgb::new(to_channel(r), to_channel(g), to_channel(b))
}

fn to_channel(unit: f32) -> u8 {
    (unit * 255.0).round().clamp(0.0, 255.0) as u8
}
