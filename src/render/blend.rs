//! Premultiplied blend kernels.
use crate::foundation::math::mul_div255_u8;

pub(crate) type PremulRgba8 = [u8; 4];

/// Built-in blend stages, applied to premultiplied floats in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlendKernel {
    Replace,
    Additive,
    Multiply,
}

pub(crate) fn blend_premul(kernel: BlendKernel, src: [f32; 4], prev: [f32; 4]) -> [f32; 4] {
    match kernel {
        BlendKernel::Replace => src,
        BlendKernel::Additive => {
            let mut out = [0.0; 4];
            for i in 0..4 {
                out[i] = (src[i] + prev[i]).min(1.0);
            }
            out
        }
        BlendKernel::Multiply => {
            let mut out = [0.0; 4];
            for i in 0..4 {
                out[i] = src[i] * prev[i];
            }
            out
        }
    }
}

/// Source-over with an extra opacity factor.
pub(crate) fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}
