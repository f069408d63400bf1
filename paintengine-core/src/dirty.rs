//! Tracking of changed tiles between ticks and render passes.

use bitvec::vec::BitVec;

use crate::{
    tile::{grid_dimensions, TileCoord, TileRect},
    util::{Rect, Size},
};

/// A set of tile coordinates over a grid of fixed dimensions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TileSet {
    cols: u32,
    rows: u32,
    bits: BitVec,
}
impl TileSet {
    /// An empty set covering a canvas of this size.
    #[must_use]
    pub fn new(size: Size) -> Self {
        let (cols, rows) = grid_dimensions(size);
        Self::with_grid(cols, rows)
    }
    #[must_use]
    pub fn with_grid(cols: u32, rows: u32) -> Self {
        Self {
            cols,
            rows,
            bits: BitVec::repeat(false, cols as usize * rows as usize),
        }
    }
    /// Every tile of a canvas of this size.
    #[must_use]
    pub fn full(size: Size) -> Self {
        let mut set = Self::new(size);
        set.fill();
        set
    }
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }
    fn index(&self, coord: TileCoord) -> Option<usize> {
        (coord.x < self.cols && coord.y < self.rows)
            .then(|| coord.y as usize * self.cols as usize + coord.x as usize)
    }
    /// Add a tile. Out of range coordinates are ignored.
    pub fn insert(&mut self, coord: TileCoord) {
        if let Some(idx) = self.index(coord) {
            self.bits.set(idx, true);
        }
    }
    pub fn insert_rect(&mut self, rect: TileRect) {
        for coord in rect.iter() {
            self.insert(coord);
        }
    }
    /// Add every tile touched by a pixel-space rectangle.
    pub fn insert_pixel_rect(&mut self, area: Rect) {
        let size = crate::tile::grid_pixel_size(self.cols, self.rows);
        if let Some(rect) = TileRect::covering(area, size) {
            self.insert_rect(rect);
        }
    }
    #[must_use]
    pub fn contains(&self, coord: TileCoord) -> bool {
        self.index(coord).is_some_and(|idx| self.bits[idx])
    }
    pub fn fill(&mut self) {
        self.bits.fill(true);
    }
    pub fn clear(&mut self) {
        self.bits.fill(false);
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }
    /// Row-major iteration over the members.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let cols = self.cols.max(1);
        self.bits
            .iter_ones()
            .map(move |idx| TileCoord::new(idx as u32 % cols, idx as u32 / cols))
    }
    /// Merge another set into this one.
    ///
    /// Sets over different grids can't be merged tile by tile. An empty set adopts the other wholesale,
    /// otherwise everything in the other grid is considered touched.
    pub fn union_with(&mut self, other: &Self) {
        if self.dimensions() == other.dimensions() {
            *self.bits.as_mut_bitslice() |= other.bits.as_bitslice();
        } else if self.is_empty() {
            *self = other.clone();
        } else {
            *self = Self::with_grid(other.cols, other.rows);
            self.fill();
        }
    }
    /// The tile rectangle bounding every member, or None if empty.
    #[must_use]
    pub fn bounds(&self) -> Option<TileRect> {
        let mut iter = self.iter();
        let first = iter.next()?;
        let init = TileRect {
            x0: first.x,
            y0: first.y,
            x1: first.x + 1,
            y1: first.y + 1,
        };
        Some(iter.fold(init, |rect, coord| TileRect {
            x0: rect.x0.min(coord.x),
            y0: rect.y0.min(coord.y),
            x1: rect.x1.max(coord.x + 1),
            y1: rect.y1.max(coord.y + 1),
        }))
    }
    /// The pixel bounds of every member, clipped to the canvas.
    #[must_use]
    pub fn pixel_bounds(&self, canvas: Size) -> Option<Rect> {
        self.bounds()?
            .pixel_rect()
            .intersected(&Rect::from_size(canvas))
    }
    /// Remove and return every member within `rect`.
    pub fn take_in(&mut self, rect: TileRect) -> Vec<TileCoord> {
        let taken: Vec<_> = self.iter().filter(|coord| rect.contains(*coord)).collect();
        for coord in &taken {
            if let Some(idx) = self.index(*coord) {
                self.bits.set(idx, false);
            }
        }
        taken
    }
}

#[cfg(test)]
mod test {
    use super::TileSet;
    use crate::{
        tile::{TileCoord, TileRect},
        util::{Rect, Size},
    };

    #[test]
    fn bounds_and_take() {
        let mut set = TileSet::new(Size::new(640, 640));
        assert!(set.is_empty());
        assert_eq!(set.bounds(), None);
        set.insert(TileCoord::new(2, 3));
        set.insert(TileCoord::new(5, 1));
        // Out of range, ignored.
        set.insert(TileCoord::new(10, 0));
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.bounds(),
            Some(TileRect {
                x0: 2,
                y0: 1,
                x1: 6,
                y1: 4
            })
        );
        let taken = set.take_in(TileRect {
            x0: 0,
            y0: 0,
            x1: 3,
            y1: 5,
        });
        assert_eq!(taken, vec![TileCoord::new(2, 3)]);
        assert!(set.contains(TileCoord::new(5, 1)));
        assert!(!set.contains(TileCoord::new(2, 3)));
    }
    #[test]
    fn pixel_rect_insertion() {
        let mut set = TileSet::new(Size::new(100, 100));
        set.insert_pixel_rect(Rect::new(60, 60, 10, 10));
        assert_eq!(set.len(), 4);
        assert_eq!(
            set.pixel_bounds(Size::new(100, 100)),
            Some(Rect::new(0, 0, 100, 100))
        );
    }
    #[test]
    fn union_across_resize() {
        let mut small = TileSet::new(Size::new(64, 64));
        let mut big = TileSet::new(Size::new(256, 256));
        big.insert(TileCoord::new(3, 3));
        small.union_with(&big);
        assert_eq!(small, big);

        small.insert(TileCoord::new(0, 0));
        let mut other = TileSet::new(Size::new(128, 128));
        other.insert(TileCoord::new(1, 1));
        small.union_with(&other);
        assert_eq!(small.len(), 4);
        assert_eq!(small.dimensions(), (2, 2));
    }
}
