pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn mul_div255_u8(x: u16, y: u16) -> u8 {
    mul_div255_u16(x, y) as u8
}

/// Opacity in `[0, 1]` as an 8-bit coverage factor.
pub(crate) fn opacity_to_u8(opacity: f64) -> u8 {
    if !opacity.is_finite() {
        return 0;
    }
    (opacity.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Exact at both ends: `t == 0` yields `a`, `t == 1` yields `b`.
pub(crate) fn lerp_f64(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

pub(crate) fn lerp_f32(a: f32, b: f32, t: f64) -> f32 {
    lerp_f64(f64::from(a), f64::from(b), t) as f32
}
