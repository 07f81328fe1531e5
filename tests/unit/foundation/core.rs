use super::*;
use proptest::prelude::*;

#[test]
fn end_index_is_exclusive() {
    let s = FrameSpan::new(10, 30);
    assert_eq!(s.end_index(), 40);
    assert!(s.intersects_frame(10));
    assert!(s.intersects_frame(39));
    assert!(!s.intersects_frame(40));
    assert!(!s.intersects_frame(9));
}

#[test]
fn intersects_is_half_open() {
    let a = FrameSpan::from_index(0, 10);
    assert!(a.intersects(FrameSpan::from_index(9, 20)));
    assert!(!a.intersects(FrameSpan::from_index(10, 20)));
    assert!(!FrameSpan::from_index(10, 20).intersects(a));
}

#[test]
fn clamp_of_disjoint_spans_is_negative() {
    let c = FrameSpan::from_index(0, 5).clamp(FrameSpan::from_index(8, 12));
    assert!(!c.is_valid());
    assert_eq!(c, FrameSpan::from_index(8, 5));
}

#[test]
fn move_end_index_rejects_inversion() {
    let s = FrameSpan::new(10, 5);
    assert!(s.move_end_index(9).is_err());
    assert_eq!(s.move_end_index(10).unwrap(), FrameSpan::new(10, 0));
    assert_eq!(s.move_end_index(30).unwrap(), FrameSpan::new(10, 20));
}

#[test]
fn move_end_index_clamped_collapses() {
    let s = FrameSpan::new(10, 5);
    assert_eq!(s.move_end_index_clamped(3, i64::MAX), FrameSpan::new(10, 0));
    assert_eq!(s.move_end_index_clamped(50, 20), FrameSpan::new(10, 10));
}

#[test]
fn move_begin_rejects_inversion() {
    let s = FrameSpan::new(10, 5);
    assert!(s.move_begin(16).is_err());
    assert_eq!(s.move_begin(12).unwrap(), FrameSpan::new(12, 3));
    assert_eq!(s.move_begin(0).unwrap(), FrameSpan::new(0, 15));
}

#[test]
fn move_begin_clamped_collapses_to_end() {
    let s = FrameSpan::new(10, 5);
    assert_eq!(s.move_begin_clamped(20, 0), FrameSpan::new(15, 0));
    assert_eq!(s.move_begin_clamped(-4, 0), FrameSpan::new(0, 15));
    assert_eq!(s.add_begin_index_clamped(2, 0), FrameSpan::new(12, 3));
    assert_eq!(s.add_end_index(-5).unwrap(), FrameSpan::new(10, 0));
    assert!(s.add_end_index(-6).is_err());
}

#[test]
fn expand_contract_offset() {
    let s = FrameSpan::new(10, 5);
    assert_eq!(s.expand(2), FrameSpan::new(8, 9));
    assert_eq!(s.expand(2).contract(2), s);
    assert_eq!(s.offset(-10), FrameSpan::new(0, 5));
    assert_eq!(FrameSpan::new(-3, -2).abs(), FrameSpan::new(3, 2));
}

#[test]
fn union_all_handles_empty_input() {
    assert_eq!(FrameSpan::union_all(Vec::new()), None);
    let u = FrameSpan::union_all([FrameSpan::new(5, 1), FrameSpan::new(0, 2), FrameSpan::new(9, 3)]);
    assert_eq!(u, Some(FrameSpan::from_index(0, 12)));
}

#[test]
fn display_shows_edges_and_duration() {
    assert_eq!(FrameSpan::new(10, 30).to_string(), "10->40 (30)");
}

#[test]
fn rgba_u32_packing() {
    let c = Rgba8::new(1, 2, 3, 4);
    assert_eq!(Rgba8::from_u32(c.to_u32()), c);
}

#[test]
fn clip_round_out_keeps_partial_pixels() {
    let r = clip_round_out(Rect::new(-3.5, 1.2, 10.1, 99.0), 8, 50);
    assert_eq!(r, Rect::new(0.0, 1.0, 8.0, 50.0));
    assert_eq!(clip_round_out(Rect::new(20.0, 20.0, 30.0, 30.0), 8, 8), Rect::ZERO);
}

fn span() -> impl Strategy<Value = FrameSpan> {
    (-10_000i64..10_000, 1i64..10_000).prop_map(|(b, d)| FrameSpan::new(b, d))
}

proptest! {
    #[test]
    fn union_is_minimal_cover(a in span(), b in span()) {
        let u = a.union(b);
        prop_assert_eq!(u.begin, a.begin.min(b.begin));
        prop_assert_eq!(u.end_index(), a.end_index().max(b.end_index()));
        prop_assert!(u.begin <= a.begin && u.end_index() >= a.end_index());
        prop_assert!(u.begin <= b.begin && u.end_index() >= b.end_index());
    }

    #[test]
    fn clamp_is_valid_and_non_empty_iff_intersecting(a in span(), b in span()) {
        let c = a.clamp(b);
        prop_assert_eq!(c.is_valid() && !c.is_empty(), a.intersects(b));
    }
}
