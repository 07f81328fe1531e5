use super::*;
use crate::automation::value::AutomationValue;
use crate::foundation::core::Rgba8;
use crate::render::content::SolidColorContent;

fn solid(span: FrameSpan) -> Clip {
    Clip::new(
        "solid",
        span,
        Box::new(SolidColorContent::new(Rgba8::opaque(200, 10, 10))),
    )
    .unwrap()
}

#[test]
fn relative_frame_is_half_open() {
    let c = solid(FrameSpan::new(10, 30));
    assert_eq!(c.relative_frame(9), None);
    assert_eq!(c.relative_frame(10), Some(0));
    assert_eq!(c.relative_frame(39), Some(29));
    assert_eq!(c.relative_frame(40), None);
}

#[test]
fn placement_rejects_negative_begin_and_empty_duration() {
    let content = || Box::new(SolidColorContent::new(Rgba8::opaque(0, 0, 0))) as Box<dyn ClipContent>;
    assert!(Clip::new("a", FrameSpan::new(-1, 5), content()).is_err());
    assert!(Clip::new("a", FrameSpan::new(0, 0), content()).is_err());

    let mut c = solid(FrameSpan::new(0, 5));
    assert!(c.set_span(FrameSpan::new(3, -2)).is_err());
    assert_eq!(c.set_span(FrameSpan::new(3, 2)).unwrap(), FrameSpan::new(0, 5));
}

#[test]
fn duplicate_gets_fresh_identity() {
    let mut c = solid(FrameSpan::new(0, 5));
    c.selected = true;
    let d = c.duplicate();
    assert_ne!(c.id(), d.id());
    assert!(!d.is_selected());
    assert_eq!(d.span(), c.span());
}

#[test]
fn absolute_transform_composes_track_then_local() {
    let mut c = solid(FrameSpan::new(0, 5));
    c.props.position = Vec2::new(5.0, 0.0);
    let track = Affine::translate(Vec2::new(0.0, 7.0));
    let size = Vec2::new(100.0, 50.0);
    let (fwd, inv) = c.absolute_transform(track, track.inverse(), size);
    assert_eq!(fwd * kurbo::Point::ZERO, kurbo::Point::new(5.0, 7.0));
    let back = inv * (fwd * kurbo::Point::new(3.0, 4.0));
    assert!((back.x - 3.0).abs() < 1e-9 && (back.y - 4.0).abs() < 1e-9);

    // a new track matrix is picked up even though the clip itself did not change
    let moved = Affine::translate(Vec2::new(1.0, 1.0));
    let (fwd, _) = c.absolute_transform(moved, moved.inverse(), size);
    assert_eq!(fwd * kurbo::Point::ZERO, kurbo::Point::new(6.0, 1.0));
}

#[test]
fn reference_size_prefers_content_size() {
    let c = Clip::new(
        "box",
        FrameSpan::new(0, 1),
        Box::new(SolidColorContent::new(Rgba8::opaque(1, 1, 1)).with_size(Vec2::new(8.0, 4.0))),
    )
    .unwrap();
    assert_eq!(c.reference_size(1920, 1080), Vec2::new(8.0, 4.0));
    assert_eq!(
        solid(FrameSpan::new(0, 1)).reference_size(1920, 1080),
        Vec2::new(1920.0, 1080.0)
    );
}

#[test]
fn write_read_keeps_placement_and_automation() {
    let table = ParameterTable::global();
    let opacity = &table.builtins().clip.opacity;
    let mut c = solid(FrameSpan::new(12, 40));
    c.set_media_frame_offset(3);
    c.automation_mut()
        .sequence_mut(opacity)
        .unwrap()
        .set_default_value(AutomationValue::Double(0.5))
        .unwrap();

    let mut d = DataDict::new();
    c.write(&mut d);
    let back = Clip::read(&d, table, &ContentRegistry::with_builtins()).unwrap();
    assert_ne!(back.id(), c.id());
    assert_eq!(back.name(), "solid");
    assert_eq!(back.span(), FrameSpan::new(12, 40));
    assert_eq!(back.media_frame_offset(), 3);
    assert_eq!(back.props().opacity(), 0.5);
    assert_eq!(back.content().kind(), SolidColorContent::KIND);
}
