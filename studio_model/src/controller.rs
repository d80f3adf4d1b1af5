//! Bone controllers and blend parameters.
//!
//! Controllers and blends are stored as bytes on each instance.
//! The setters on [ModelEntity](crate::ModelEntity) convert values in degrees or units
//! to bytes with [BoneController::quantize] and [quantize_blend].
use studio_lib::mdl::MotionFlags;

/// The controller channel driven by the mouth value instead of a controller byte.
pub const MOUTH_CHANNEL: usize = 4;

#[derive(Debug, PartialEq, Clone)]
pub struct BoneController {
    pub bone: usize,
    pub controller_type: MotionFlags,
    pub start: f32,
    pub end: f32,
    pub rest: i32,
    /// The controller byte from `0` to `3` or [MOUTH_CHANNEL].
    pub channel: usize,
}

impl BoneController {
    /// The value added to the bound bone channel in radians or units.
    pub fn adjustment(&self, controllers: &[u8; 4], mouth: u8) -> f32 {
        let value = match controllers.get(self.channel) {
            Some(byte) if self.controller_type.rloop() => {
                f32::from(*byte) * (360.0 / 256.0) + self.start
            }
            Some(byte) => {
                let t = (f32::from(*byte) / 255.0).clamp(0.0, 1.0);
                (1.0 - t) * self.start + t * self.end
            }
            None => {
                let t = (f32::from(mouth) / 64.0).min(1.0);
                (1.0 - t) * self.start + t * self.end
            }
        };

        if self.controller_type.is_rotation() {
            value.to_radians()
        } else if self.controller_type.is_translation() {
            value
        } else {
            0.0
        }
    }

    /// Convert `value` to a controller byte and the value it actually represents.
    pub fn quantize(&self, value: f32) -> (u8, f32) {
        let value = if self.controller_type.is_rotation() {
            wrap_rotation(value, self.start, self.end, true)
        } else {
            value
        };
        quantize_range(value, self.start, self.end, 255)
    }

    /// Convert `value` to a mouth byte from `0` to `64` and the value it actually represents.
    pub fn quantize_mouth(&self, value: f32) -> (u8, f32) {
        let value = if self.controller_type.is_rotation() {
            wrap_rotation(value, self.start, self.end, true)
        } else {
            value
        };
        quantize_range(value, self.start, self.end, 64)
    }
}

/// Compute the adjustment for each controller in `controllers`.
pub fn controller_adjustments(
    controllers: &[BoneController],
    values: &[u8; 4],
    mouth: u8,
    adjustments: &mut Vec<f32>,
) {
    adjustments.clear();
    adjustments.extend(controllers.iter().map(|c| c.adjustment(values, mouth)));
}

/// Convert `value` to a blend byte and the value it actually represents
/// or `None` if the blend type has no axes set.
pub fn quantize_blend(
    blend_type: MotionFlags,
    start: f32,
    end: f32,
    value: f32,
) -> Option<(u8, f32)> {
    if u32::from(blend_type) == 0 {
        return None;
    }

    let value = if blend_type.is_rotation() {
        wrap_rotation(value, start, end, false)
    } else {
        value
    };
    Some(quantize_range(value, start, end, 255))
}

fn wrap_rotation(value: f32, start: f32, end: f32, wrap_revolution: bool) -> f32 {
    let value = if end < start { -value } else { value };

    if start + 359.0 >= end {
        // Wrap to within half a revolution of the center of the range.
        let center = (start + end) / 2.0;
        if value > center + 180.0 {
            value - 360.0
        } else if value < center - 180.0 {
            value + 360.0
        } else {
            value
        }
    } else if wrap_revolution {
        if value > 360.0 {
            value - (value / 360.0).trunc() * 360.0
        } else if value < 0.0 {
            value + ((value / -360.0).trunc() + 1.0) * 360.0
        } else {
            value
        }
    } else {
        value
    }
}

fn quantize_range(value: f32, start: f32, end: f32, steps: u8) -> (u8, f32) {
    let range = end - start;
    if range == 0.0 || !value.is_finite() {
        return (0, start);
    }

    let max = f32::from(steps);
    let setting = (max * (value - start) / range).trunc().clamp(0.0, max);
    (setting as u8, setting * (1.0 / max) * range + start)
}
