//! # Tiles
//!
//! Layer content is stored as a grid of fixed size square tiles. Tiles are shared between canvas states
//! through `Arc`s and are only ever mutated through [`Arc::make_mut`], so a tile that anyone else can still
//! see is copied before it is written to.

use std::sync::Arc;

use crate::{
    color::Pixel,
    util::{Rect, Size},
};

/// Side length of a tile, in pixels.
pub const TILE_SIZE: u32 = 64;
/// Number of pixels in a tile.
pub const TILE_LENGTH: usize = (TILE_SIZE * TILE_SIZE) as usize;

/// Number of tile columns and rows needed to cover a canvas of this size.
#[must_use]
pub fn grid_dimensions(size: Size) -> (u32, u32) {
    (
        size.width.div_ceil(TILE_SIZE),
        size.height.div_ceil(TILE_SIZE),
    )
}

/// Pixel size of a grid of `cols` by `rows` whole tiles.
#[must_use]
pub fn grid_pixel_size(cols: u32, rows: u32) -> Size {
    Size::new(cols * TILE_SIZE, rows * TILE_SIZE)
}

#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}
impl TileCoord {
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
    /// The area of the canvas this tile covers. May extend past the canvas edge.
    #[must_use]
    pub fn pixel_rect(self) -> Rect {
        Rect::new(
            (self.x * TILE_SIZE) as i32,
            (self.y * TILE_SIZE) as i32,
            TILE_SIZE as i32,
            TILE_SIZE as i32,
        )
    }
}

/// A rectangle of tiles, right and bottom exclusive.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TileRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}
impl TileRect {
    /// The tile-aligned bounding box of `area`, clamped to the canvas. None if they don't overlap.
    #[must_use]
    pub fn covering(area: Rect, size: Size) -> Option<Self> {
        let area = area.intersected(&Rect::from_size(size))?;
        // Intersection with the canvas guarantees non-negative coords.
        Some(Self {
            x0: area.x as u32 / TILE_SIZE,
            y0: area.y as u32 / TILE_SIZE,
            x1: (area.right() as u32).div_ceil(TILE_SIZE),
            y1: (area.bottom() as u32).div_ceil(TILE_SIZE),
        })
    }
    /// Every tile of a canvas.
    #[must_use]
    pub fn full(size: Size) -> Option<Self> {
        Self::covering(Rect::from_size(size), size)
    }
    #[must_use]
    pub fn contains(&self, coord: TileCoord) -> bool {
        (self.x0..self.x1).contains(&coord.x) && (self.y0..self.y1).contains(&coord.y)
    }
    #[must_use]
    pub fn len(&self) -> usize {
        (self.x1 - self.x0) as usize * (self.y1 - self.y0) as usize
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Row-major iteration over the covered tiles.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> {
        let Self { x0, y0, x1, y1 } = *self;
        (y0..y1).flat_map(move |y| (x0..x1).map(move |x| TileCoord::new(x, y)))
    }
    #[must_use]
    pub fn pixel_rect(&self) -> Rect {
        Rect::new(
            (self.x0 * TILE_SIZE) as i32,
            (self.y0 * TILE_SIZE) as i32,
            ((self.x1 - self.x0) * TILE_SIZE) as i32,
            ((self.y1 - self.y0) * TILE_SIZE) as i32,
        )
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileError {
    #[error("tile data has {got} pixels, expected {TILE_LENGTH}")]
    WrongLength { got: usize },
}

/// Tile content as carried in messages. Pixels are packed, premultiplied `0xAARRGGBB`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TileData {
    Solid(u32),
    Pixels(Vec<u32>),
}

/// A block of `TILE_SIZE`² premultiplied pixels, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Tile {
    // Invariant: exactly TILE_LENGTH long.
    pixels: Box<[Pixel]>,
}
impl Tile {
    #[must_use]
    pub fn new_solid(pixel: Pixel) -> Self {
        Self {
            pixels: vec![pixel; TILE_LENGTH].into_boxed_slice(),
        }
    }
    #[must_use]
    pub fn transparent() -> Self {
        Self::new_solid(Pixel::TRANSPARENT)
    }
    pub fn from_pixels(pixels: Vec<Pixel>) -> Result<Self, TileError> {
        if pixels.len() == TILE_LENGTH {
            Ok(Self {
                pixels: pixels.into_boxed_slice(),
            })
        } else {
            Err(TileError::WrongLength { got: pixels.len() })
        }
    }
    pub fn from_data(data: &TileData) -> Result<Self, TileError> {
        match data {
            TileData::Solid(argb) => Ok(Self::new_solid(Pixel::from_argb32(*argb))),
            TileData::Pixels(pixels) => {
                Self::from_pixels(pixels.iter().copied().map(Pixel::from_argb32).collect())
            }
        }
    }
    /// Encode as message data, compacting uniform tiles.
    #[must_use]
    pub fn to_data(&self) -> TileData {
        match self.solid_color() {
            Some(pixel) => TileData::Solid(pixel.argb32()),
            None => TileData::Pixels(self.pixels.iter().map(|p| p.argb32()).collect()),
        }
    }
    #[must_use]
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }
    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }
    /// Pixel at tile-local coordinates.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        self.pixels[(y * TILE_SIZE + x) as usize]
    }
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|p| p.a == 0)
    }
    /// The color of the tile, if every pixel is the same.
    #[must_use]
    pub fn solid_color(&self) -> Option<Pixel> {
        let first = self.pixels[0];
        self.pixels.iter().all(|p| *p == first).then_some(first)
    }
}
impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.solid_color() {
            Some(color) => write!(f, "Tile(solid {:#010x})", color.argb32()),
            None => f.write_str("Tile(..)"),
        }
    }
}

/// The tiles of one layer. Missing tiles are fully transparent.
#[derive(Clone, Debug, Default)]
pub struct TileGrid {
    size: Size,
    cols: u32,
    rows: u32,
    tiles: Vec<Option<Arc<Tile>>>,
}
impl TileGrid {
    #[must_use]
    pub fn new(size: Size) -> Self {
        let (cols, rows) = grid_dimensions(size);
        Self {
            size,
            cols,
            rows,
            tiles: vec![None; cols as usize * rows as usize],
        }
    }
    /// A grid where every tile is `pixel`. The tiles share one allocation until written.
    #[must_use]
    pub fn filled(size: Size, pixel: Pixel) -> Self {
        let mut grid = Self::new(size);
        if !pixel.is_transparent() {
            let tile = Arc::new(Tile::new_solid(pixel));
            grid.tiles.fill(Some(tile));
        }
        grid
    }
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }
    fn index(&self, coord: TileCoord) -> Option<usize> {
        (coord.x < self.cols && coord.y < self.rows)
            .then(|| coord.y as usize * self.cols as usize + coord.x as usize)
    }
    #[must_use]
    pub fn get(&self, coord: TileCoord) -> Option<&Arc<Tile>> {
        self.tiles.get(self.index(coord)?)?.as_ref()
    }
    /// Replace a tile. Blank tiles are stored as absent. Returns false if out of bounds.
    pub fn set(&mut self, coord: TileCoord, tile: Option<Arc<Tile>>) -> bool {
        let Some(idx) = self.index(coord) else {
            return false;
        };
        self.tiles[idx] = tile.filter(|tile| !tile.is_blank());
        true
    }
    /// Get a writable tile, copying it if shared and creating it if absent.
    pub fn tile_mut(&mut self, coord: TileCoord) -> Option<&mut Tile> {
        let idx = self.index(coord)?;
        let slot = &mut self.tiles[idx];
        let tile = slot.get_or_insert_with(|| Arc::new(Tile::transparent()));
        Some(Arc::make_mut(tile))
    }
    /// Drop the tile if it has become blank.
    pub fn normalize(&mut self, coord: TileCoord) {
        if let Some(idx) = self.index(coord) {
            if self.tiles[idx].as_ref().is_some_and(|tile| tile.is_blank()) {
                self.tiles[idx] = None;
            }
        }
    }
    /// Pixel at canvas coordinates, transparent if outside.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Pixel {
        if x < 0 || y < 0 || x as u32 >= self.size.width || y as u32 >= self.size.height {
            return Pixel::TRANSPARENT;
        }
        let (x, y) = (x as u32, y as u32);
        self.get(TileCoord::new(x / TILE_SIZE, y / TILE_SIZE))
            .map_or(Pixel::TRANSPARENT, |tile| {
                tile.pixel(x % TILE_SIZE, y % TILE_SIZE)
            })
    }
    /// Every present tile.
    pub fn iter(&self) -> impl Iterator<Item = (TileCoord, &Arc<Tile>)> + '_ {
        let cols = self.cols.max(1);
        self.tiles.iter().enumerate().filter_map(move |(idx, tile)| {
            let idx = idx as u32;
            tile.as_ref()
                .map(|tile| (TileCoord::new(idx % cols, idx / cols), tile))
        })
    }
    /// True if both grids hold the very same tile (or both have none) at `coord`.
    #[must_use]
    pub fn same_tile(&self, other: &Self, coord: TileCoord) -> bool {
        match (self.get(coord), other.get(coord)) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
