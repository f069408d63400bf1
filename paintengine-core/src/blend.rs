//! Blend modes, operating on premultiplied 8-bit pixels.
//!
//! All arithmetic is integer so every replica produces identical bytes.

use crate::color::{mul8, Pixel};

#[derive(
    strum::AsRefStr,
    strum::EnumIter,
    strum::FromRepr,
    PartialEq,
    Eq,
    Copy,
    Clone,
    Hash,
    Debug,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum BlendMode {
    #[default]
    Normal,
    Erase,
    Multiply,
    Screen,
    Add,
    Subtract,
    Darken,
    Lighten,
    /// Paint underneath existing content.
    Behind,
    /// Overwrite, interpolating by coverage.
    Replace,
}
impl BlendMode {
    /// Whether painting with this mode can put content onto fully transparent pixels.
    /// Modes which can't never need to allocate a new tile.
    #[must_use]
    pub fn paints_on_transparent(self) -> bool {
        !matches!(self, Self::Erase | Self::Subtract)
    }
    /// Blend `src` onto `dst`, where `mask` is the coverage of `src` (brush coverage times opacity).
    #[must_use]
    pub fn blend(self, dst: Pixel, src: Pixel, mask: u8) -> Pixel {
        match self {
            Self::Replace => lerp(dst, src, mask),
            Self::Erase => dst.scaled(255 - mul8(src.a, mask)),
            _ => {
                let s = src.scaled(mask);
                if s.a == 0 {
                    return dst;
                }
                match self {
                    Self::Normal => over(s, dst),
                    Self::Behind => over(dst, s),
                    Self::Multiply => separable(s, dst, |sc, dc, sa, da| {
                        u32::from(mul8(sc, dc))
                            + u32::from(mul8(sc, 255 - da))
                            + u32::from(mul8(dc, 255 - sa))
                    }),
                    Self::Screen => separable(s, dst, |sc, dc, _, _| {
                        u32::from(sc) + u32::from(dc) - u32::from(mul8(sc, dc))
                    }),
                    Self::Add => separable(s, dst, |sc, dc, _, _| u32::from(sc) + u32::from(dc)),
                    Self::Subtract => {
                        // Only removes from existing paint, alpha is kept.
                        let sub = |sc: u8, dc: u8| dc.saturating_sub(mul8(sc, dst.a));
                        Pixel::new(sub(s.r, dst.r), sub(s.g, dst.g), sub(s.b, dst.b), dst.a)
                    }
                    Self::Darken => separable(s, dst, |sc, dc, sa, da| {
                        u32::from(mul8(sc, da).min(mul8(dc, sa)))
                            + u32::from(mul8(sc, 255 - da))
                            + u32::from(mul8(dc, 255 - sa))
                    }),
                    Self::Lighten => separable(s, dst, |sc, dc, sa, da| {
                        u32::from(mul8(sc, da).max(mul8(dc, sa)))
                            + u32::from(mul8(sc, 255 - da))
                            + u32::from(mul8(dc, 255 - sa))
                    }),
                    Self::Replace | Self::Erase => unreachable!(),
                }
            }
        }
    }
}

/// Porter-Duff `top` over `bottom`.
#[inline]
fn over(top: Pixel, bottom: Pixel) -> Pixel {
    let under = bottom.scaled(255 - top.a);
    Pixel::new(
        top.r.saturating_add(under.r),
        top.g.saturating_add(under.g),
        top.b.saturating_add(under.b),
        top.a.saturating_add(under.a),
    )
}

#[inline]
fn lerp(from: Pixel, to: Pixel, t: u8) -> Pixel {
    let mix = |a: u8, b: u8| -> u8 { mul8(a, 255 - t).saturating_add(mul8(b, t)) };
    Pixel::new(mix(from.r, to.r), mix(from.g, to.g), mix(from.b, to.b), mix(from.a, to.a))
}

/// Apply a per-channel formula `f(sc, dc, sa, da)`, with the alpha of a normal "over".
#[inline]
fn separable(s: Pixel, d: Pixel, f: impl Fn(u8, u8, u8, u8) -> u32) -> Pixel {
    let a = s.a.saturating_add(mul8(d.a, 255 - s.a));
    let channel = |sc: u8, dc: u8| -> u8 { f(sc, dc, s.a, d.a).min(u32::from(a)) as u8 };
    Pixel::new(channel(s.r, d.r), channel(s.g, d.g), channel(s.b, d.b), a)
}

/// Composite a whole tile's worth of layer pixels onto `dst` with the layer's mode and opacity.
pub fn composite(dst: &mut [Pixel], src: &[Pixel], mode: BlendMode, opacity: u8) {
    if opacity == 0 {
        return;
    }
    for (d, s) in dst.iter_mut().zip(src) {
        // Fast paths. Transparent sources do nothing except in Replace mode.
        if s.a == 0 && mode != BlendMode::Replace {
            continue;
        }
        if mode == BlendMode::Normal && opacity == 255 && s.a == 255 {
            *d = *s;
            continue;
        }
        *d = mode.blend(*d, *s, opacity);
    }
}

#[cfg(test)]
mod test {
    use super::{composite, BlendMode};
    use crate::color::Pixel;

    #[test]
    fn normal_over() {
        let red = Pixel::new(255, 0, 0, 255);
        assert_eq!(BlendMode::Normal.blend(Pixel::WHITE, red, 255), red);
        // Half coverage of red over white.
        let half = BlendMode::Normal.blend(Pixel::WHITE, red, 128);
        assert_eq!(half, Pixel::new(255, 127, 127, 255));
        // Transparent source is a no-op.
        assert_eq!(
            BlendMode::Normal.blend(Pixel::WHITE, Pixel::TRANSPARENT, 255),
            Pixel::WHITE
        );
    }
    #[test]
    fn erase_and_behind() {
        let red = Pixel::new(255, 0, 0, 255);
        assert_eq!(
            BlendMode::Erase.blend(red, Pixel::BLACK, 255),
            Pixel::TRANSPARENT
        );
        assert_eq!(BlendMode::Behind.blend(red, Pixel::WHITE, 255), red);
        assert_eq!(
            BlendMode::Behind.blend(Pixel::TRANSPARENT, Pixel::WHITE, 255),
            Pixel::WHITE
        );
    }
    #[test]
    fn multiply_and_screen() {
        let grey = Pixel::new(128, 128, 128, 255);
        assert_eq!(BlendMode::Multiply.blend(Pixel::WHITE, grey, 255), grey);
        assert_eq!(BlendMode::Multiply.blend(grey, Pixel::BLACK, 255), Pixel::BLACK);
        assert_eq!(BlendMode::Screen.blend(grey, Pixel::WHITE, 255), Pixel::WHITE);
        assert_eq!(BlendMode::Screen.blend(Pixel::BLACK, grey, 255), grey);
    }
    #[test]
    fn results_stay_premultiplied() {
        use strum::IntoEnumIterator;
        let samples = [
            Pixel::TRANSPARENT,
            Pixel::new(10, 200, 30, 200),
            Pixel::new(255, 255, 0, 255),
            Pixel::new(3, 1, 2, 4),
        ];
        for mode in BlendMode::iter() {
            for dst in samples {
                for src in samples {
                    for mask in [0, 1, 127, 255] {
                        let out = mode.blend(dst, src, mask);
                        assert!(
                            out.r <= out.a && out.g <= out.a && out.b <= out.a,
                            "{mode:?}: {out:?}"
                        );
                    }
                }
            }
        }
    }
    #[test]
    fn composite_opacity() {
        let mut dst = vec![Pixel::WHITE; 4];
        let src = vec![Pixel::BLACK; 4];
        composite(&mut dst, &src, BlendMode::Normal, 0);
        assert!(dst.iter().all(|p| *p == Pixel::WHITE));
        composite(&mut dst, &src, BlendMode::Normal, 255);
        assert!(dst.iter().all(|p| *p == Pixel::BLACK));
    }
}
