use crate::util::{FiniteF32, FiniteF32Error};

/// Multiply two 8-bit fractions, rounding to nearest. `mul8(255, x) == x`.
#[must_use]
#[inline]
pub fn mul8(a: u8, b: u8) -> u8 {
    let t = u32::from(a) * u32::from(b) + 0x80;
    // (t + t/256) / 256 is the exact rounded division by 255 for all u8 products.
    (((t >> 8) + t) >> 8) as u8
}

/// A premultiplied 8-bit pixel in BGRA memory order, which is the layout of tiles and the render cache.
///
/// Invariant: no color channel exceeds alpha.
#[repr(C)]
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Default, Debug, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct Pixel {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}
impl Pixel {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    /// Construct from premultiplied channels. Channels are clamped to alpha.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        const fn min(x: u8, y: u8) -> u8 {
            if x < y {
                x
            } else {
                y
            }
        }
        Self {
            b: min(b, a),
            g: min(g, a),
            r: min(r, a),
            a,
        }
    }
    /// From a packed, premultiplied `0xAARRGGBB`.
    #[must_use]
    pub const fn from_argb32(argb: u32) -> Self {
        Self::new(
            (argb >> 16) as u8,
            (argb >> 8) as u8,
            argb as u8,
            (argb >> 24) as u8,
        )
    }
    /// Packed, premultiplied `0xAARRGGBB`.
    #[must_use]
    pub const fn argb32(self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
    /// From a packed, non-premultiplied `0xAARRGGBB`, as carried in messages.
    #[must_use]
    pub fn from_straight_argb(argb: u32) -> Self {
        let a = (argb >> 24) as u8;
        Self::new(
            mul8((argb >> 16) as u8, a),
            mul8((argb >> 8) as u8, a),
            mul8(argb as u8, a),
            a,
        )
    }
    /// Packed, non-premultiplied `0xAARRGGBB`.
    #[must_use]
    pub fn straight_argb(self) -> u32 {
        let [r, g, b, a] = self.straight_rgba();
        u32::from(a) << 24 | u32::from(r) << 16 | u32::from(g) << 8 | u32::from(b)
    }
    /// Un-premultiplied RGBA bytes.
    #[must_use]
    pub fn straight_rgba(self) -> [u8; 4] {
        if self.a == 0 {
            return [0; 4];
        }
        let unmul = |c: u8| -> u8 {
            let a = u32::from(self.a);
            ((u32::from(c) * 255 + a / 2) / a).min(255) as u8
        };
        [unmul(self.r), unmul(self.g), unmul(self.b), self.a]
    }
    /// Scale every channel by an 8-bit fraction.
    #[must_use]
    #[inline]
    pub fn scaled(self, by: u8) -> Self {
        Self {
            b: mul8(self.b, by),
            g: mul8(self.g, by),
            r: mul8(self.r, by),
            a: mul8(self.a, by),
        }
    }
    #[must_use]
    pub fn is_transparent(self) -> bool {
        self.a == 0
    }
}

/// A straight-alpha color with unit-range channels, for the public API.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, bytemuck::Zeroable)]
#[repr(transparent)]
pub struct Color([FiniteF32; 4]);
impl Color {
    pub const TRANSPARENT: Self = Self([FiniteF32::ZERO; 4]);
    pub const WHITE: Self = Self([FiniteF32::ONE; 4]);
    pub const BLACK: Self = Self([
        FiniteF32::ZERO,
        FiniteF32::ZERO,
        FiniteF32::ZERO,
        FiniteF32::ONE,
    ]);
    /// Create a color from straight channels. Channels are clamped to `[0, 1]`, and fully transparent
    /// colors are normalized to transparent black.
    pub fn new_lossy(r: f32, g: f32, b: f32, a: f32) -> Result<Self, FiniteF32Error> {
        let channel = |v: f32| -> Result<FiniteF32, FiniteF32Error> {
            Ok(FiniteF32::unit_lossy(FiniteF32::new(v)?.get()))
        };
        let raw = Self([channel(r)?, channel(g)?, channel(b)?, channel(a)?]);
        if raw.0[3].get() == 0.0 {
            Ok(Self::TRANSPARENT)
        } else {
            Ok(raw)
        }
    }
    #[must_use]
    pub fn from_straight_argb(argb: u32) -> Self {
        let unit = |v: u32| FiniteF32::unit_lossy((v & 0xFF) as f32 / 255.0);
        let color = Self([unit(argb >> 16), unit(argb >> 8), unit(argb), unit(argb >> 24)]);
        if argb >> 24 == 0 {
            Self::TRANSPARENT
        } else {
            color
        }
    }
    #[must_use]
    pub fn from_pixel(pixel: Pixel) -> Self {
        Self::from_straight_argb(pixel.straight_argb())
    }
    /// Packed, non-premultiplied `0xAARRGGBB`, the color format of messages.
    #[must_use]
    pub fn to_straight_argb(self) -> u32 {
        let [r, g, b, a] = self.as_array().map(|c| (c * 255.0).round() as u32);
        a << 24 | r << 16 | g << 8 | b
    }
    #[must_use]
    pub fn to_pixel(self) -> Pixel {
        Pixel::from_straight_argb(self.to_straight_argb())
    }
    #[must_use]
    pub fn as_array(&self) -> [f32; 4] {
        self.0.map(FiniteF32::get)
    }
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.0[3].get()
    }
}

#[cfg(test)]
mod test {
    use super::{mul8, Color, Pixel};

    #[test]
    fn mul8_exact() {
        for a in 0..=255u8 {
            assert_eq!(mul8(a, 255), a);
            assert_eq!(mul8(a, 0), 0);
            for b in 0..=255u8 {
                let exact = (f32::from(a) * f32::from(b) / 255.0).round() as u8;
                assert_eq!(mul8(a, b), exact, "{a} * {b}");
            }
        }
    }
    #[test]
    fn premultiply() {
        let half_red = Pixel::from_straight_argb(0x80FF_0000);
        assert_eq!(half_red, Pixel::new(128, 0, 0, 128));
        assert_eq!(half_red.straight_argb(), 0x80FF_0000);
        assert_eq!(Pixel::from_argb32(0xFFFF_FFFF), Pixel::WHITE);
        // Channels above alpha are clamped.
        assert_eq!(Pixel::from_argb32(0x10FF_FFFF), Pixel::new(16, 16, 16, 16));
    }
    #[test]
    fn color_conversion() {
        assert_eq!(Color::WHITE.to_pixel(), Pixel::WHITE);
        assert_eq!(Color::from_pixel(Pixel::BLACK), Color::BLACK);
        assert_eq!(Color::from_straight_argb(0x00FF_FFFF), Color::TRANSPARENT);
        assert!(Color::new_lossy(f32::NAN, 0.0, 0.0, 1.0).is_err());
    }
}
