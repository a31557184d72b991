use super::*;

#[test]
fn mul_div255_rounds() {
    assert_eq!(mul_div255_u8(255, 255), 255);
    assert_eq!(mul_div255_u8(128, 255), 128);
    assert_eq!(mul_div255_u8(128, 128), 64);
    assert_eq!(mul_div255_u8(0, 200), 0);
}

#[test]
fn premultiply_round_trips_opaque_pixels() {
    let px = [10u8, 200, 90, 255];
    assert_eq!(premul_to_u8(premultiply(unpremultiply(px))), px);
}

#[test]
fn unpremultiply_transparent_is_zero() {
    assert_eq!(unpremultiply([0, 0, 0, 0]), [0.0; 4]);
}

#[test]
fn premultiply_scrubs_nan() {
    let out = premul_to_u8(premultiply([f32::NAN, 1.0, 0.0, 1.0]));
    assert_eq!(out, [0, 255, 0, 255]);
}

#[test]
fn half_alpha_blue_premultiplies_to_128() {
    let out = premul_to_u8(premultiply([0.0, 0.0, 1.0, 0.5]));
    assert_eq!(out, [0, 0, 128, 128]);
}
