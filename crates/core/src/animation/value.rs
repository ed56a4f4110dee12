use std::fmt;

use serde::{Deserialize, Serialize};

/// Linear RGB color with channels in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    /// Builds a color from a packed `0xRRGGBB` value; higher bits are ignored.
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
        Self {
            r: channel(16),
            g: channel(8),
            b: channel(0),
        }
    }

    pub fn to_hex(self) -> u32 {
        let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    pub fn lerp(self, to: Rgb, t: f32) -> Rgb {
        Rgb {
            r: self.r + (to.r - self.r) * t,
            g: self.g + (to.g - self.g) * t,
            b: self.b + (to.b - self.b) * t,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.to_hex())
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = value.strip_prefix('#').unwrap_or(&value);
        if digits.len() != 6 {
            return Err(format!("expected a #rrggbb color, got `{value}`"));
        }
        u32::from_str_radix(digits, 16)
            .map(Rgb::from_hex)
            .map_err(|err| format!("invalid color `{value}`: {err}"))
    }
}

/// Value held by an animated parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Scalar(f32),
    Color(Rgb),
}

impl ParamValue {
    pub fn as_scalar(self) -> Option<f32> {
        match self {
            ParamValue::Scalar(value) => Some(value),
            ParamValue::Color(_) => None,
        }
    }

    pub fn as_color(self) -> Option<Rgb> {
        match self {
            ParamValue::Color(color) => Some(color),
            ParamValue::Scalar(_) => None,
        }
    }

    pub fn same_kind(self, other: ParamValue) -> bool {
        matches!(
            (self, other),
            (ParamValue::Scalar(_), ParamValue::Scalar(_)) | (ParamValue::Color(_), ParamValue::Color(_))
        )
    }

    /// Component-wise interpolation. Mismatched kinds snap to `to`.
    pub fn lerp(self, to: ParamValue, t: f32) -> ParamValue {
        match (self, to) {
            (ParamValue::Scalar(from), ParamValue::Scalar(to)) => {
                ParamValue::Scalar(from + (to - from) * t)
            }
            (ParamValue::Color(from), ParamValue::Color(to)) => ParamValue::Color(from.lerp(to, t)),
            (_, to) => to,
        }
    }
}

/// Inclusive range a scalar parameter is kept in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
}

impl ParamRange {
    pub fn new(min: f32, max: f32) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Clamps `value` into the range; non-finite input falls back to `min`
    /// (or `max` for positive infinity).
    pub fn clamp(self, value: f32) -> f32 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }

    pub fn clamp_value(self, value: ParamValue) -> ParamValue {
        match value {
            ParamValue::Scalar(scalar) => ParamValue::Scalar(self.clamp(scalar)),
            ParamValue::Color(color) => ParamValue::Color(Rgb::new(color.r, color.g, color.b)),
        }
    }
}

impl Default for ParamRange {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

/// Declares one animated parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub initial: ParamValue,
    #[serde(default)]
    pub range: ParamRange,
    /// Step used by debug sliders.
    #[serde(default = "default_step")]
    pub step: f32,
}

fn default_step() -> f32 {
    0.001
}

impl ParameterSpec {
    pub fn scalar(name: impl Into<String>, initial: f32, min: f32, max: f32) -> Self {
        Self {
            name: name.into(),
            initial: ParamValue::Scalar(initial),
            range: ParamRange::new(min, max),
            step: default_step(),
        }
    }

    pub fn color(name: impl Into<String>, hex: u32) -> Self {
        Self {
            name: name.into(),
            initial: ParamValue::Color(Rgb::from_hex(hex)),
            range: ParamRange::default(),
            step: default_step(),
        }
    }

    /// Uniforms of the distorted sphere.
    pub fn defaults() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::scalar("speed", 0.1, 0.1, 5.0),
            ParameterSpec::scalar("distortion_frequency", 1.5, 0.0, 10.0),
            ParameterSpec::scalar("distortion_strength", 0.65, -1.5, 10.0),
            ParameterSpec::scalar("displacement_frequency", 2.12, 0.0, 5.0),
            ParameterSpec::scalar("displacement_strength", 0.152, 0.0, 1.0),
            ParameterSpec::scalar("fresnel_offset", -1.609, -2.0, 2.0),
            ParameterSpec::scalar("fresnel_multiplier", 3.587, 0.0, 5.0),
            ParameterSpec::scalar("fresnel_power", 1.793, 0.0, 5.0),
            ParameterSpec::color("light_a_color", 0xadd8e6),
            ParameterSpec::scalar("light_a_intensity", 0.5, 0.0, 5.0),
            ParameterSpec::color("light_b_color", 0xff69b4),
            ParameterSpec::scalar("light_b_intensity", 0.5, 0.0, 5.0),
        ]
    }
}
