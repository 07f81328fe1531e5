use super::*;

fn d(frame: i64, v: f64) -> KeyFrame {
    KeyFrame::new(frame, AutomationValue::Double(v))
}

#[test]
fn linear_blend_between_keys() {
    let a = d(0, 0.0);
    let b = d(100, 10.0);
    assert_eq!(a.interpolate(50, &b, LongRounding::Round), AutomationValue::Double(5.0));
}

#[test]
fn no_drift_at_boundaries() {
    let a = d(10, 0.3).with_curve_bend(0.4);
    let b = d(70, 9.7);
    assert_eq!(a.interpolate(10, &b, LongRounding::Round), a.value());
    assert_eq!(a.interpolate(70, &b, LongRounding::Round), b.value());
}

#[test]
fn bend_shapes_the_middle() {
    let a = d(0, 0.0).with_curve_bend(0.5);
    let b = d(100, 1.0);
    // t = 0.5 ^ (1 / 0.5) = 0.25
    assert_eq!(a.blend_factor(50, &b), 0.25);
    let a = d(0, 0.0).with_curve_bend(-0.5);
    assert_eq!(a.blend_factor(50, &b), 0.25);
}

#[test]
fn coincident_keys_blend_fully() {
    let a = d(5, 1.0);
    let b = d(5, 2.0);
    assert_eq!(a.blend_factor(5, &b), 1.0);
}

#[test]
fn bend_is_clamped() {
    assert_eq!(d(0, 0.0).with_curve_bend(4.0).curve_bend(), 1.0);
    assert_eq!(d(0, 0.0).with_curve_bend(f64::NAN).curve_bend(), 0.0);
}

#[test]
fn set_value_rejects_kind_change() {
    let mut k = d(0, 1.0);
    assert!(k.set_value(AutomationValue::Bool(true)).is_err());
    k.set_value(AutomationValue::Double(3.0)).unwrap();
    assert_eq!(k.value(), AutomationValue::Double(3.0));
}

#[test]
fn equality_ignores_bend() {
    assert!(d(3, 1.0).is_equal_to(&d(3, 1.0).with_curve_bend(0.3)));
    assert!(!d(3, 1.0).is_equal_to(&d(4, 1.0)));
}

#[test]
fn persisted_fields() {
    let k = KeyFrame::new(12, AutomationValue::Long(7)).with_curve_bend(-0.25);
    let mut dict = DataDict::new();
    k.write(&mut dict);
    assert_eq!(dict.get_i64("Time").unwrap(), 12);
    let back = KeyFrame::read(&dict, DataType::Long).unwrap();
    assert_eq!(back, k);

    let mut bad = DataDict::new();
    bad.set("Time", -1i64);
    bad.set("Value", 1i64);
    assert!(KeyFrame::read(&bad, DataType::Long).is_err());
}
