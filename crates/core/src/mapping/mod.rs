use serde::{Deserialize, Serialize};

use crate::animation::{Ease, ParamRange, ParamValue, Rgb};

/// Largest value of the average byte frequency reported by the analyser.
pub const BYTE_FREQUENCY_MAX: f32 = 255.0;

const HEX_COLOR_MAX: f32 = 0x00ff_ffff as f32;

/// Turns a normalised magnitude into a target value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MappingRule {
    /// `scale * n + offset`, clamped to the parameter range.
    Affine { scale: f32, offset: f32 },
    /// Random color whose packed hex value grows with the magnitude.
    RandomColor { gain: f32 },
}

/// Describes how the frequency magnitude is routed to a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDescriptor {
    pub target: String,
    /// Normalised magnitudes at or below this value never trigger.
    pub threshold: f32,
    #[serde(flatten)]
    pub rule: MappingRule,
    pub duration_ms: f64,
    #[serde(default)]
    pub ease: Ease,
}

impl MappingDescriptor {
    pub fn gate(&self, normalized: f32) -> bool {
        normalized > self.threshold
    }

    /// Target for `normalized`, `random` being a sample from `[0, 1)` that
    /// only random rules consume.
    pub fn target_value(&self, normalized: f32, range: ParamRange, random: f32) -> ParamValue {
        match self.rule {
            MappingRule::Affine { scale, offset } => {
                ParamValue::Scalar(affine(normalized, scale, offset, range))
            }
            MappingRule::RandomColor { gain } => {
                let packed = (normalized * gain * random.clamp(0.0, 1.0) * HEX_COLOR_MAX)
                    .clamp(0.0, HEX_COLOR_MAX);
                ParamValue::Color(Rgb::from_hex(packed as u32))
            }
        }
    }

    pub fn expects_color(&self) -> bool {
        matches!(self.rule, MappingRule::RandomColor { .. })
    }

    /// Speed follows the music, both lights flash on loud passages.
    pub fn defaults() -> Vec<MappingDescriptor> {
        vec![
            MappingDescriptor {
                target: "speed".to_string(),
                threshold: 5.0 / BYTE_FREQUENCY_MAX,
                rule: MappingRule::Affine {
                    scale: BYTE_FREQUENCY_MAX / 500.0,
                    offset: 0.0,
                },
                duration_ms: 500.0,
                ease: Ease::OutExpo,
            },
            MappingDescriptor {
                target: "light_a_color".to_string(),
                threshold: 30.0 / BYTE_FREQUENCY_MAX,
                rule: MappingRule::RandomColor {
                    gain: BYTE_FREQUENCY_MAX / 50.0,
                },
                duration_ms: 500.0,
                ease: Ease::Linear,
            },
            MappingDescriptor {
                target: "light_b_color".to_string(),
                threshold: 30.0 / BYTE_FREQUENCY_MAX,
                rule: MappingRule::RandomColor {
                    gain: BYTE_FREQUENCY_MAX / 50.0,
                },
                duration_ms: 500.0,
                ease: Ease::Linear,
            },
        ]
    }
}

/// Normalises a raw magnitude into `[0, 1]`. Negative, NaN or a
/// non-positive reference all map to zero.
pub fn normalize(magnitude: f32, reference_max: f32) -> f32 {
    if !(reference_max > 0.0) || magnitude.is_nan() {
        return 0.0;
    }
    (magnitude / reference_max).clamp(0.0, 1.0)
}

pub fn affine(normalized: f32, scale: f32, offset: f32, range: ParamRange) -> f32 {
    range.clamp(scale * normalized + offset)
}
