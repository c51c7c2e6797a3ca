//! Narrowing conversions.
//!
//! Every float-to-integer conversion in the crate goes through this module so
//! that a single policy applies: truncate toward zero, then saturate at the
//! bounds of the target type. NaN becomes 0.

/// Convert to the signed 32-bit intensity type of a [`crate::volume::Volume`].
#[inline]
pub fn to_intensity(value: f64) -> i32 {
    if value.is_nan() {
        return 0;
    }
    value.trunc().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Convert to the unsigned 16-bit storage type written back to source slices.
#[inline]
pub fn to_stored(value: f64) -> u16 {
    if value.is_nan() {
        return 0;
    }
    value.trunc().clamp(0.0, u16::MAX as f64) as u16
}

/// Convert a display intensity to one 8-bit channel.
#[inline]
pub fn to_display(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.trunc().clamp(0.0, u8::MAX as f64) as u8
}
