use crate::color::Pixel;

/// An owned block of premultiplied pixels, row-major.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("image has no area")]
    Empty,
    #[error("expected {expected} pixels, got {got}")]
    NotEnoughPixels { expected: usize, got: usize },
}

impl Image {
    /// A transparent image.
    pub fn new(width: u32, height: u32) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Empty);
        }
        Ok(Self {
            width,
            height,
            pixels: vec![Pixel::TRANSPARENT; width as usize * height as usize],
        })
    }
    /// Excess pixels are truncated.
    pub fn from_pixels(width: u32, height: u32, mut pixels: Vec<Pixel>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::Empty);
        }
        let expected = width as usize * height as usize;
        if pixels.len() < expected {
            return Err(ImageError::NotEnoughPixels {
                expected,
                got: pixels.len(),
            });
        }
        pixels.truncate(expected);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }
    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        (x < self.width && y < self.height)
            .then(|| self.pixels[y as usize * self.width as usize + x as usize])
    }
    /// Un-premultiplied RGBA bytes, the layout image encoders want.
    #[must_use]
    pub fn to_straight_rgba8(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|p| p.straight_rgba()).collect()
    }
}
