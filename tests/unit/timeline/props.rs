use super::*;
use kurbo::Point;

fn close(a: Point, b: Point) -> bool {
    (a - b).hypot() < 1e-9
}

#[test]
fn default_transform_is_identity() {
    let mut p = VideoProps::default();
    let (fwd, inv) = p.transform(Vec2::new(640.0, 360.0));
    assert_eq!(fwd, Affine::IDENTITY);
    assert_eq!(inv, Affine::IDENTITY);
}

#[test]
fn relative_scale_origin_keeps_center_fixed() {
    let mut p = VideoProps {
        scale: Vec2::new(2.0, 2.0),
        ..VideoProps::default()
    };
    let (fwd, _) = p.transform(Vec2::new(100.0, 100.0));
    assert!(close(fwd * Point::new(50.0, 50.0), Point::new(50.0, 50.0)));
    assert!(close(fwd * Point::new(0.0, 0.0), Point::new(-50.0, -50.0)));
}

#[test]
fn absolute_rotation_origin_is_in_pixels() {
    let mut p = VideoProps {
        rotation: 90.0,
        rotation_origin: Vec2::new(10.0, 10.0),
        absolute_rotation_origin: true,
        position: Vec2::new(5.0, 0.0),
        ..VideoProps::default()
    };
    let (fwd, inv) = p.transform(Vec2::new(100.0, 100.0));
    let moved = fwd * Point::new(20.0, 10.0);
    assert!(close(moved, Point::new(15.0, 20.0)));
    assert!(close(inv * moved, Point::new(20.0, 10.0)));
}

#[test]
fn cache_follows_invalidation_and_size() {
    let mut p = VideoProps::default();
    p.transform(Vec2::new(10.0, 10.0));
    assert!(!p.is_transform_dirty());
    p.position = Vec2::new(3.0, 4.0);
    // stale until invalidated
    assert_eq!(p.transform(Vec2::new(10.0, 10.0)).0, Affine::IDENTITY);
    p.invalidate_transform();
    assert!(p.is_transform_dirty());
    assert_eq!(
        p.transform(Vec2::new(10.0, 10.0)).0,
        Affine::translate(Vec2::new(3.0, 4.0))
    );
}

#[test]
fn effective_visibility_needs_opacity() {
    let mut p = VideoProps::default();
    assert!(p.is_effectively_visible());
    p.opacity = 0.0;
    assert!(!p.is_effectively_visible());
}
