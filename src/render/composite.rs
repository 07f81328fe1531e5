use kurbo::Rect;

use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::{mul_div255_u16, mul_div255_u8};

pub type PremulRgba8 = [u8; 4];

/// Premultiplied source-over with the source tinted by `opacity` (0..=255).
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: u8) -> PremulRgba8 {
    if opacity == 0 || src[3] == 0 {
        return dst;
    }
    let op = u16::from(opacity);
    let sa = mul_div255_u16(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return if op == 255 {
            src
        } else {
            [
                mul_div255_u8(u16::from(src[0]), op),
                mul_div255_u8(u16::from(src[1]), op),
                mul_div255_u8(u16::from(src[2]), op),
                255,
            ]
        };
    }

    let inv = 255 - sa;
    let mut out = [0u8; 4];
    out[3] = add_sat_u8(sa, mul_div255_u16(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255_u16(u16::from(src[i]), op);
        let dc = mul_div255_u16(u16::from(dst[i]), inv);
        out[i] = add_sat_u8(sc, dc);
    }
    out
}

/// Composite `src` over `dst` (both `width x height` premultiplied RGBA8) inside `area`.
///
/// `area` is clipped to the frame; an area covering the whole frame takes the linear path.
pub fn over_region(
    dst: &mut [u8],
    src: &[u8],
    width: u32,
    height: u32,
    area: Rect,
    opacity: u8,
) -> ReelResult<()> {
    let len = width as usize * height as usize * 4;
    if dst.len() != len || src.len() != len {
        return Err(ReelError::render(
            "over_region expects frame-sized rgba8 buffers",
        ));
    }
    if opacity == 0 {
        return Ok(());
    }

    let x0 = area.x0.max(0.0).floor() as u32;
    let y0 = area.y0.max(0.0).floor() as u32;
    let x1 = (area.x1.ceil().max(0.0) as u32).min(width);
    let y1 = (area.y1.ceil().max(0.0) as u32).min(height);
    if x0 >= x1 || y0 >= y1 {
        return Ok(());
    }

    if x0 == 0 && y0 == 0 && x1 == width && y1 == height {
        for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
            d.copy_from_slice(&out);
        }
        return Ok(());
    }

    let stride = width as usize * 4;
    for y in y0 as usize..y1 as usize {
        let row = y * stride;
        let range = row + x0 as usize * 4..row + x1 as usize * 4;
        for (d, s) in dst[range.clone()]
            .chunks_exact_mut(4)
            .zip(src[range].chunks_exact(4))
        {
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], opacity);
            d.copy_from_slice(&out);
        }
    }
    Ok(())
}

fn add_sat_u8(a: u16, b: u16) -> u8 {
    (a + b).min(255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
