use super::*;

#[test]
fn canvas_rejects_empty_dimensions() {
    assert!(Canvas::new(0, 10).is_err());
    assert!(Canvas::new(10, 0).is_err());
    let c = Canvas::new(4, 3).unwrap();
    assert_eq!(c.pixel_count(), 12);
    assert_eq!(c.rgba8_len(), 48);
}

#[test]
fn premul_from_straight_rounds() {
    let c = Rgba8Premul::from_straight_rgba(255, 128, 0, 128);
    assert_eq!(c.to_array(), [128, 64, 0, 128]);
    assert_eq!(Rgba8Premul::transparent().to_array(), [0, 0, 0, 0]);
}

#[test]
fn target_display_is_prefixed() {
    assert_eq!(TargetId::layer("ground").to_string(), "layer:ground");
    assert_eq!(TargetId::object(7).to_string(), "object:7");
}

#[test]
fn shader_id_serializes_as_plain_string() {
    let id = ShaderId::from("water_ripple");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"water_ripple\"");
    let back: ShaderId = serde_json::from_str("\"water_ripple\"").unwrap();
    assert_eq!(back, id);
}
