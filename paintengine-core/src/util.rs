//! Utility types, used throughout the crate.

/// A float which is non-NaN and non-infinite.
// Because of the preconditions invalidating many bitpatterns, this is not Pod.
#[derive(Copy, Clone, PartialEq, PartialOrd, bytemuck::NoUninit, bytemuck::Zeroable, Debug)]
#[repr(transparent)]
pub struct FiniteF32(f32);
impl FiniteF32 {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);
    pub fn new(val: f32) -> Result<Self, FiniteF32Error> {
        if val.is_finite() {
            Ok(Self(val))
        } else {
            Err(FiniteF32Error::NotFinite)
        }
    }
    /// Clamp into `[0, 1]`, mapping non-finite input to zero.
    #[must_use]
    pub fn unit_lossy(val: f32) -> Self {
        if val.is_finite() {
            Self(val.clamp(0.0, 1.0))
        } else {
            Self::ZERO
        }
    }
    #[must_use]
    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for FiniteF32 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<f32> for FiniteF32 {
    type Error = FiniteF32Error;
    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
impl From<FiniteF32> for f32 {
    fn from(value: FiniteF32) -> Self {
        value.get()
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiniteF32Error {
    #[error("not finite")]
    NotFinite,
}

// No component is ever NaN, so PartialEq can act like Eq.
impl Eq for FiniteF32 {}
#[allow(clippy::derive_ord_xor_partial_ord)]
impl Ord for FiniteF32 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
impl std::hash::Hash for FiniteF32 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u32(self.0.to_bits());
    }
}

/// Size of a canvas or image, in pixels.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Default, serde::Serialize, serde::Deserialize,
)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}
impl Size {
    pub const EMPTY: Self = Self::new(0, 0);
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
    #[must_use]
    pub fn area(self) -> usize {
        self.width as usize * self.height as usize
    }
}
impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An integer rectangle. `x` and `y` is the top left corner, right and bottom edges are exclusive.
///
/// Rectangles with non-positive width or height are empty.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Default, serde::Serialize, serde::Deserialize,
)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}
impl Rect {
    #[must_use]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
    /// The rectangle covering a whole canvas of the given size.
    #[must_use]
    pub fn from_size(size: Size) -> Self {
        Self::new(
            0,
            0,
            i32::try_from(size.width).unwrap_or(i32::MAX),
            i32::try_from(size.height).unwrap_or(i32::MAX),
        )
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
    #[must_use]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }
    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }
    #[must_use]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
    /// Grow the rectangle by `amount` on every side.
    #[must_use]
    pub fn expanded(&self, amount: i32) -> Self {
        Self::new(
            self.x.saturating_sub(amount),
            self.y.saturating_sub(amount),
            self.w.saturating_add(amount.saturating_mul(2)),
            self.h.saturating_add(amount.saturating_mul(2)),
        )
    }
    #[must_use]
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.w, self.h)
    }
    /// The overlapping area, or None if they do not overlap.
    #[must_use]
    pub fn intersected(&self, other: &Self) -> Option<Self> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        let rect = Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y));
        (!rect.is_empty()).then_some(rect)
    }
    /// Smallest rectangle containing both. Empty rectangles are ignored.
    #[must_use]
    pub fn united(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }
    /// Widened, a rectangle reaching past `i32::MAX` still has a center.
    #[must_use]
    pub fn center(&self) -> (i64, i64) {
        (
            i64::from(self.x) + i64::from(self.w) / 2,
            i64::from(self.y) + i64::from(self.h) / 2,
        )
    }
    /// Manhattan distance from the center of the rectangle to a point.
    #[must_use]
    pub fn center_distance(&self, x: i32, y: i32) -> u64 {
        let (cx, cy) = self.center();
        cx.abs_diff(i64::from(x)) + cy.abs_diff(i64::from(y))
    }
}

#[cfg(test)]
mod test {
    use super::{FiniteF32, Rect};

    #[test]
    fn finite() {
        assert!(FiniteF32::new(f32::NAN).is_err());
        assert!(FiniteF32::new(f32::INFINITY).is_err());
        assert_eq!(FiniteF32::unit_lossy(4.0), FiniteF32::ONE);
        assert_eq!(FiniteF32::unit_lossy(f32::NAN), FiniteF32::ZERO);
    }
    #[test]
    fn rect_ops() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersected(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.united(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(a.intersected(&Rect::new(10, 0, 5, 5)), None);
        assert!(a.contains(9, 9));
        assert!(!a.contains(10, 9));
        assert_eq!(a.expanded(2), Rect::new(-2, -2, 14, 14));
        assert_eq!(a.center_distance(0, 0), 10);
        // Empty rects don't poison unions.
        assert_eq!(Rect::default().united(&b), b);
    }
    #[test]
    fn extreme_coordinates() {
        let edge = Rect::new(i32::MAX - 10, 0, 100, 10);
        assert_eq!(edge.right(), i32::MAX);
        assert_eq!(edge.center(), (i64::from(i32::MAX) + 40, 5));
        assert_eq!(edge.center_distance(i32::MAX - 5, 5), 45);
        let far_left = Rect::new(i32::MIN, 0, 1, 1);
        let far_right = Rect::new(i32::MAX - 1, 0, 1, 1);
        assert_eq!(far_left.intersected(&far_right), None);
        assert_eq!(far_right.intersected(&far_left), None);
    }
}
