use crate::foundation::math::mul_div255_u16;

/// Straight (non-premultiplied) RGBA8 pixel.
pub type StraightRgba8 = [u8; 4];

/// Source-over for straight alpha.
///
/// Color channels are weighted by each side's contribution to the output alpha and renormalized
/// with rounding; fully opaque and fully transparent sources take the exact fast paths.
pub fn over(dst: StraightRgba8, src: StraightRgba8) -> StraightRgba8 {
    let sa = u16::from(src[3]);
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }

    let da_part = mul_div255_u16(u16::from(dst[3]), 255 - sa);
    let out_a = u32::from(sa + da_part);
    if out_a == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let num = u32::from(src[i]) * u32::from(sa)
            + u32::from(dst[i]) * u32::from(da_part)
            + out_a / 2;
        out[i] = (num / out_a).min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    out
}

/// Blend `src` over `dst` pixel by pixel. Both are tightly packed RGBA8 of equal length.
pub fn over_span(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
