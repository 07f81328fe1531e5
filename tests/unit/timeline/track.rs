use super::*;
use crate::automation::value::AutomationValue;
use crate::render::content::{ClipContent, SolidColorContent};
use crate::render::canvas::Canvas;
use kurbo::Rect;

fn solid(begin: i64, duration: i64) -> Clip {
    Clip::new(
        "solid",
        FrameSpan::new(begin, duration),
        Box::new(SolidColorContent::new(Rgba8::opaque(0, 0, 255))),
    )
    .unwrap()
}

#[derive(Clone, Debug)]
struct Failing;

impl ClipContent for Failing {
    fn kind(&self) -> &'static str {
        "Failing"
    }

    fn prepare(&mut self, _cx: &PrepareContext) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn draw(&self, canvas: &mut Canvas<'_>, _used: &mut Rect) -> anyhow::Result<()> {
        canvas.push_opacity(0.5);
        anyhow::bail!("decoder went away")
    }

    fn write(&self, _data: &mut DataDict) {}

    fn clone_box(&self) -> Box<dyn ClipContent> {
        Box::new(self.clone())
    }
}

#[test]
fn height_is_clamped() {
    let mut t = Track::new("v");
    assert_eq!(t.height(), DEFAULT_TRACK_HEIGHT);
    t.set_height(5);
    assert_eq!(t.height(), MIN_TRACK_HEIGHT);
    t.set_height(9000);
    assert_eq!(t.height(), MAX_TRACK_HEIGHT);
}

#[test]
fn active_clip_prefers_highest_index_and_skips_hidden() {
    let mut t = Track::new("v");
    t.add_clip(solid(0, 100)).unwrap();
    t.add_clip(solid(50, 100)).unwrap();
    assert_eq!(t.active_clip_index(60), Some(1));
    assert_eq!(t.active_clip_index(10), Some(0));
    assert_eq!(t.active_clip_index(150), None);

    t.clips[1].props.visible = false;
    assert_eq!(t.active_clip_index(60), Some(0));
    // visibility does not matter for plain lookup
    assert_eq!(t.clip_at_frame(60).map(Clip::id), Some(t.clips[1].id()));

    t.clips[1].props.visible = true;
    t.clips[1].props.opacity = 0.0;
    assert_eq!(t.active_clip_index(60), Some(1));
}

#[test]
fn active_clip_example_span_10_to_40() {
    let mut t = Track::new("v");
    t.add_clip(solid(10, 30)).unwrap();
    assert!(t.prepare_render(39, RenderQuality::Full, 8, 8).unwrap());
    let p = t.pending().unwrap();
    assert_eq!(p.clip_index, 0);
    assert_eq!(p.frame, 39);
    assert_eq!(t.clips[0].relative_frame(39), Some(29));

    assert!(!t.prepare_render(40, RenderQuality::Full, 8, 8).unwrap());
    assert!(t.pending().is_none());
}

#[test]
fn largest_frame_tracks_clip_edits() {
    let mut t = Track::new("v");
    let a = solid(0, 10);
    let a_id = a.id();
    t.add_clip(a).unwrap();
    t.add_clip(solid(20, 30)).unwrap();
    assert_eq!(t.largest_frame_in_use(), 50);
    t.remove_clip_at(1).unwrap();
    assert_eq!(t.largest_frame_in_use(), 10);
    t.set_clip_span(a_id, FrameSpan::new(100, 5)).unwrap();
    assert_eq!(t.largest_frame_in_use(), 105);
    assert!(t.set_clip_span(a_id, FrameSpan::new(-3, 5)).is_err());
}

#[test]
fn insert_validates_index_and_membership() {
    let mut t = Track::new("v");
    assert!(t.insert_clip(1, solid(0, 1)).is_err());
    t.insert_clip(0, solid(0, 1)).unwrap();
    t.insert_clip(0, solid(5, 1)).unwrap();
    assert_eq!(t.clips()[0].span().begin, 5);
    assert!(t.remove_clip_at(2).is_err());
    assert!(t.remove_clip(ClipId::from_raw(u64::MAX)).is_err());
}

#[test]
fn clip_selection_is_incremental() {
    let mut t = Track::new("v");
    let ids: Vec<_> = (0..4)
        .map(|i| {
            let c = solid(i * 10, 10);
            let id = c.id();
            t.add_clip(c).unwrap();
            id
        })
        .collect();
    assert!(t.set_clip_selected(ids[1], true).unwrap());
    assert!(!t.set_clip_selected(ids[1], true).unwrap());
    t.set_clip_selected(ids[3], true).unwrap();
    assert_eq!(t.selected_clips(), &[ids[1], ids[3]]);

    t.remove_clip(ids[1]).unwrap();
    assert_eq!(t.selected_clips(), &[ids[3]]);

    assert_eq!(t.select_all_clips(), 2);
    assert_eq!(t.clear_clip_selection(Some(ids[0])), 2);
    assert_eq!(t.selected_clips(), &[ids[0]]);
}

#[test]
fn span_until_clip_fills_gaps() {
    let mut t = Track::new("v");
    t.add_clip(solid(100, 10)).unwrap();
    t.add_clip(solid(300, 10)).unwrap();
    assert_eq!(
        t.try_span_until_clip(20, DEFAULT_FILL_DURATION, MAX_FILL_DURATION),
        Some(FrameSpan::new(20, 80))
    );
    assert_eq!(t.try_span_until_clip(105, 300, MAX_FILL_DURATION), None);
    assert_eq!(
        t.span_until_clip(105, 300, MAX_FILL_DURATION),
        FrameSpan::new(105, 300)
    );
    assert_eq!(
        t.try_span_until_clip(400, 300, MAX_FILL_DURATION),
        Some(FrameSpan::new(400, 300))
    );
    assert_eq!(
        t.try_span_until_clip(0, 300, 40),
        Some(FrameSpan::new(0, 40))
    );
    assert!(t.is_region_empty(FrameSpan::new(110, 190)));
    assert!(!t.is_region_empty(FrameSpan::new(110, 191)));
}

#[test]
fn render_pending_writes_surface() {
    let mut t = Track::new("v");
    t.add_clip(solid(0, 10)).unwrap();
    assert!(t.prepare_render(3, RenderQuality::Draft, 6, 4).unwrap());
    assert!(t.render_pending(6, 4).unwrap());
    let read = t.render_data().try_read().unwrap();
    assert_eq!(read.used_area(), Rect::new(0.0, 0.0, 6.0, 4.0));
    assert_eq!(read.frame(), 3);
    assert_eq!(&read.data()[..4], &[0, 0, 255, 255]);
}

#[test]
fn failing_draw_is_reported_and_surface_stays_usable() {
    let mut t = Track::new("v");
    t.add_clip(Clip::new("bad", FrameSpan::new(0, 10), Box::new(Failing)).unwrap())
        .unwrap();
    t.prepare_render(0, RenderQuality::Full, 4, 4).unwrap();
    let err = t.render_pending(4, 4).unwrap_err();
    assert!(err.to_string().contains("decoder went away"));
    assert!(t.render_data().try_read().is_none());

    t.add_clip(solid(0, 10)).unwrap();
    t.prepare_render(0, RenderQuality::Full, 4, 4).unwrap();
    assert!(t.render_pending(4, 4).unwrap());
}

#[test]
fn hidden_track_prepares_nothing() {
    let mut t = Track::new("v");
    t.add_clip(solid(0, 10)).unwrap();
    t.props.opacity = 0.0;
    assert!(!t.prepare_render(0, RenderQuality::Full, 4, 4).unwrap());
}

#[test]
fn invalidate_transform_reaches_clips() {
    let mut t = Track::new("v");
    let c = solid(0, 10);
    let id = c.id();
    t.add_clip(c).unwrap();
    let (before, _) = t.clip_transform(id, 100, 100).unwrap();
    t.props.position = Vec2::new(10.0, 0.0);
    t.invalidate_transform();
    let (after, _) = t.clip_transform(id, 100, 100).unwrap();
    assert_eq!(after, Affine::translate(Vec2::new(10.0, 0.0)) * before);
}

#[test]
fn duplicate_assigns_fresh_ids() {
    let mut t = Track::new("v");
    t.add_clip(solid(0, 10)).unwrap();
    t.select_all_clips();
    let d = t.duplicate();
    assert_ne!(d.id(), t.id());
    assert_ne!(d.clips()[0].id(), t.clips()[0].id());
    assert_eq!(d.selected_clip_count(), 0);
    assert_eq!(d.largest_frame_in_use(), 10);
}

#[test]
fn write_read_round_trip() {
    let table = ParameterTable::global();
    let mut t = Track::new("Video 1");
    t.set_height(80);
    t.add_clip(solid(5, 10)).unwrap();
    t.automation_mut()
        .sequence_mut(&table.builtins().track.opacity)
        .unwrap()
        .add_new_key_frame(0, AutomationValue::Double(0.25))
        .unwrap();

    let mut d = DataDict::new();
    t.write(&mut d);
    let back = Track::read(&d, table, &ContentRegistry::with_builtins()).unwrap();
    assert_eq!(back.name(), "Video 1");
    assert_eq!(back.height(), 80);
    assert_eq!(back.clips().len(), 1);
    assert_eq!(back.clips()[0].span(), FrameSpan::new(5, 10));
    assert!(back.automation().is_automated(&table.builtins().track.opacity));
}
