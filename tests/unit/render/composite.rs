use super::*;

#[test]
fn opaque_source_replaces_destination() {
    assert_eq!(over([1, 2, 3, 255], [9, 8, 7, 255], 255), [9, 8, 7, 255]);
}

#[test]
fn zero_opacity_or_alpha_keeps_destination() {
    let dst = [10, 20, 30, 40];
    assert_eq!(over(dst, [255, 255, 255, 255], 0), dst);
    assert_eq!(over(dst, [0, 0, 0, 0], 255), dst);
}

#[test]
fn half_opacity_blends_over_opaque_black() {
    let out = over([0, 0, 0, 255], [255, 0, 0, 255], 128);
    assert_eq!(out[3], 255);
    assert_eq!(out[0], 128);
    assert_eq!(out[1], 0);
}

#[test]
fn translucent_source_over_transparent_keeps_premul() {
    assert_eq!(over([0, 0, 0, 0], [64, 0, 0, 128], 255), [64, 0, 0, 128]);
}

#[test]
fn region_touches_only_pixels_inside_area() {
    let (w, h) = (4u32, 3u32);
    let mut dst = vec![0u8; (w * h * 4) as usize];
    let src = vec![200u8; (w * h * 4) as usize];
    over_region(&mut dst, &src, w, h, Rect::new(1.0, 1.0, 3.0, 2.0), 255).unwrap();

    for y in 0..h {
        for x in 0..w {
            let i = ((y * w + x) * 4) as usize;
            let inside = (1..3).contains(&x) && y == 1;
            assert_eq!(dst[i + 3] != 0, inside, "pixel {x},{y}");
        }
    }
}

#[test]
fn full_frame_region_matches_sub_rect_path() {
    let (w, h) = (3u32, 2u32);
    let src: Vec<u8> = (0..w * h).flat_map(|i| [i as u8 * 10, 5, 7, 200]).collect();
    let base = vec![50u8; (w * h * 4) as usize];

    let mut full = base.clone();
    over_region(&mut full, &src, w, h, Rect::new(0.0, 0.0, 3.0, 2.0), 180).unwrap();

    let mut rows = base.clone();
    over_region(&mut rows, &src, w, h, Rect::new(0.0, 0.0, 3.0, 1.0), 180).unwrap();
    over_region(&mut rows, &src, w, h, Rect::new(0.0, 1.0, 3.0, 2.0), 180).unwrap();
    assert_eq!(full, rows);
}

#[test]
fn mismatched_buffers_are_rejected() {
    let mut dst = vec![0u8; 16];
    assert!(over_region(&mut dst, &[0u8; 12], 2, 2, Rect::ZERO, 255).is_err());
}
