pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn mul_div255_u8(x: u16, y: u16) -> u8 {
    mul_div255_u16(x, y) as u8
}

pub(crate) fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub(crate) fn u8_to_unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

/// Premultiplied RGBA8 -> straight-alpha floats in `[0, 1]`.
pub(crate) fn unpremultiply(px: [u8; 4]) -> [f32; 4] {
    let a = u8_to_unit(px[3]);
    if a <= 0.0 {
        return [0.0; 4];
    }
    [
        (u8_to_unit(px[0]) / a).min(1.0),
        (u8_to_unit(px[1]) / a).min(1.0),
        (u8_to_unit(px[2]) / a).min(1.0),
        a,
    ]
}

/// Straight-alpha floats -> premultiplied floats, clamped to `[0, 1]`.
pub(crate) fn premultiply(c: [f32; 4]) -> [f32; 4] {
    let a = sanitize_unit(c[3]);
    [
        sanitize_unit(c[0]) * a,
        sanitize_unit(c[1]) * a,
        sanitize_unit(c[2]) * a,
        a,
    ]
}

pub(crate) fn premul_to_u8(c: [f32; 4]) -> [u8; 4] {
    [
        unit_to_u8(c[0]),
        unit_to_u8(c[1]),
        unit_to_u8(c[2]),
        unit_to_u8(c[3]),
    ]
}

pub(crate) fn premul_from_u8(px: [u8; 4]) -> [f32; 4] {
    [
        u8_to_unit(px[0]),
        u8_to_unit(px[1]),
        u8_to_unit(px[2]),
        u8_to_unit(px[3]),
    ]
}

// NaN from a shader must not poison a pixel.
fn sanitize_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
