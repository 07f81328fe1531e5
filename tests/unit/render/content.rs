use super::*;
use kurbo::Affine;

fn cx(width: u32, height: u32) -> PrepareContext {
    PrepareContext {
        frame: 0,
        media_frame: 0,
        quality: RenderQuality::Full,
        width,
        height,
        opacity: 1.0,
    }
}

#[derive(Debug)]
struct Checker {
    frames: i64,
}

impl FrameSource for Checker {
    fn source_id(&self) -> &str {
        "checker"
    }

    fn size(&self) -> Vec2 {
        Vec2::new(2.0, 2.0)
    }

    fn frame_at(&self, media_frame: i64) -> anyhow::Result<Option<Arc<DecodedFrame>>> {
        if !(0..self.frames).contains(&media_frame) {
            return Ok(None);
        }
        let px = [
            255, 0, 0, 255, 0, 255, 0, 255, //
            0, 0, 255, 255, 128, 128, 128, 128,
        ];
        Ok(Some(Arc::new(DecodedFrame::from_premul_rgba8(&px, 2, 2)?)))
    }
}

#[test]
fn solid_fills_frame_without_size() {
    let mut c = SolidColorContent::new(Rgba8::opaque(1, 2, 3));
    assert!(c.prepare(&cx(10, 5)).unwrap());

    let mut ctx = vello_cpu::RenderContext::new(10, 5);
    let mut canvas = Canvas::new(&mut ctx);
    let mut used = canvas.frame_rect();
    c.draw(&mut canvas, &mut used).unwrap();
    assert_eq!(used, Rect::new(0.0, 0.0, 10.0, 5.0));
}

#[test]
fn sized_solid_reports_transformed_bounds() {
    let mut c = SolidColorContent::new(Rgba8::opaque(9, 9, 9)).with_size(Vec2::new(4.0, 2.0));
    assert_eq!(c.render_size(), Some(Vec2::new(4.0, 2.0)));
    assert!(c.prepare(&cx(32, 32)).unwrap());

    let mut ctx = vello_cpu::RenderContext::new(32, 32);
    let mut canvas = Canvas::new(&mut ctx);
    canvas.concat(Affine::translate(Vec2::new(5.0, 6.0)));
    let mut used = canvas.frame_rect();
    c.draw(&mut canvas, &mut used).unwrap();
    assert_eq!(used, Rect::new(5.0, 6.0, 9.0, 8.0));
}

#[test]
fn transparent_solid_skips_draw() {
    let mut c = SolidColorContent::new(Rgba8::new(1, 1, 1, 0));
    assert!(!c.prepare(&cx(4, 4)).unwrap());
}

#[test]
fn decoded_frame_rejects_bad_length() {
    assert!(DecodedFrame::from_premul_rgba8(&[0; 7], 1, 2).is_err());
    let f = DecodedFrame::from_premul_rgba8(&[0; 8], 1, 2).unwrap();
    assert_eq!((f.width(), f.height()), (1, 2));
}

#[test]
fn media_prepares_only_when_source_has_frame() {
    let mut m = MediaContent::new(Arc::new(Checker { frames: 3 }));
    assert_eq!(m.render_size(), Some(Vec2::new(2.0, 2.0)));

    let mut c = cx(8, 8);
    c.media_frame = 2;
    assert!(m.prepare(&c).unwrap());
    c.media_frame = 3;
    assert!(!m.prepare(&c).unwrap());

    let mut ctx = vello_cpu::RenderContext::new(8, 8);
    let mut canvas = Canvas::new(&mut ctx);
    let mut used = canvas.frame_rect();
    m.draw(&mut canvas, &mut used).unwrap();
    assert_eq!(used, Rect::ZERO);
}

#[test]
fn registry_round_trips_solid_content() {
    let c = SolidColorContent::new(Rgba8::new(10, 20, 30, 40))
        .with_size(Vec2::new(3.0, 4.0))
        .with_shape(SolidShape::Ellipse);
    let mut d = DataDict::new();
    c.write(&mut d);

    let reg = ContentRegistry::with_builtins();
    let back = reg.create(c.kind(), &d).unwrap();
    assert_eq!(back.kind(), SolidColorContent::KIND);
    assert_eq!(back.render_size(), Some(Vec2::new(3.0, 4.0)));

    assert!(reg.create("Nope", &d).is_err());
}

#[test]
fn media_factory_resolves_sources_by_id() {
    let mut reg = ContentRegistry::empty();
    reg.register(
        MediaContent::KIND,
        MediaContent::factory(|id| {
            (id == "checker").then(|| Arc::new(Checker { frames: 1 }) as Arc<dyn FrameSource>)
        }),
    );

    let mut d = DataDict::new();
    MediaContent::new(Arc::new(Checker { frames: 1 })).write(&mut d);
    assert!(reg.create(MediaContent::KIND, &d).is_ok());

    d.set("SourceId", "missing");
    assert!(reg.create(MediaContent::KIND, &d).is_err());
}
