//! # Layers
//!
//! A layer is a tile grid plus the properties used to composite it. All drawing operations report the set of
//! tiles they touched, which the canvas state folds into its change set.

use std::sync::Arc;

use crate::{
    blend::BlendMode,
    color::{mul8, Pixel},
    dirty::TileSet,
    id::LayerId,
    message::{Apply, ApplyError, DrawMessage},
    tile::{Tile, TileCoord, TileGrid, TileRect, TILE_SIZE},
    util::{Rect, Size},
};

/// A round brush stamp. Position is the center, in canvas pixels.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct Dab {
    pub x: i32,
    pub y: i32,
    pub diameter: u32,
    /// Fraction of the radius painted at full strength, as an 8-bit fraction.
    pub hardness: u8,
    pub opacity: u8,
}
impl Dab {
    /// The pixels this dab may touch.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        let d = i32::try_from(self.diameter).unwrap_or(i32::MAX);
        Rect::new(self.x.saturating_sub(d / 2), self.y.saturating_sub(d / 2), d, d)
    }
    /// Coverage of the pixel at `(px, py)`.
    #[must_use]
    pub fn mask_at(&self, px: i32, py: i32) -> u8 {
        if self.diameter == 0 || self.opacity == 0 {
            return 0;
        }
        let bounds = self.bounds();
        // Doubled coordinates keep pixel centers and the dab center on an integer grid.
        let d = i128::from(self.diameter);
        let cx = 2 * i128::from(bounds.x) + d;
        let cy = 2 * i128::from(bounds.y) + d;
        let dx = 2 * i128::from(px) + 1 - cx;
        let dy = 2 * i128::from(py) + 1 - cy;
        let dist_sq = dx * dx + dy * dy;
        if dist_sq > d * d {
            return 0;
        }
        // Distance from center as a fraction of the radius, 0..=256.
        let t = ((dist_sq * 65536 / (d * d)) as f64).sqrt() as u32;
        let hardness = u32::from(self.hardness);
        let falloff = if t <= hardness {
            255
        } else {
            (256u32.saturating_sub(t) * 255 / (256 - hardness)).min(255)
        };
        mul8(falloff as u8, self.opacity)
    }
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub title: String,
    pub opacity: u8,
    pub blend: BlendMode,
    pub hidden: bool,
    /// Content is hidden behind a placeholder pattern when displayed.
    pub censored: bool,
    /// Shown in every frame, when layers act as frames.
    pub fixed: bool,
    pub tiles: TileGrid,
}

/// The properties of a layer, without content.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerInfo {
    pub id: LayerId,
    pub title: String,
    /// Unit range.
    pub opacity: f32,
    pub blend: BlendMode,
    pub hidden: bool,
    pub censored: bool,
    pub fixed: bool,
}

impl Layer {
    #[must_use]
    pub fn new(id: LayerId, title: String, size: Size, fill: Pixel) -> Self {
        Self {
            id,
            title,
            opacity: 255,
            blend: BlendMode::Normal,
            hidden: false,
            censored: false,
            fixed: false,
            tiles: TileGrid::filled(size, fill),
        }
    }
    /// A copy of this layer under a new id and title. Shares all tiles.
    #[must_use]
    pub fn duplicate(&self, id: LayerId, title: String) -> Self {
        Self {
            id,
            title,
            ..self.clone()
        }
    }
    #[must_use]
    pub fn info(&self) -> LayerInfo {
        LayerInfo {
            id: self.id,
            title: self.title.clone(),
            opacity: f32::from(self.opacity) / 255.0,
            blend: self.blend,
            hidden: self.hidden,
            censored: self.censored,
            fixed: self.fixed,
        }
    }
    /// Whether compositing this layer can have any effect.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        !self.hidden && self.opacity > 0
    }
    #[must_use]
    pub fn size(&self) -> Size {
        self.tiles.size()
    }
    /// Blend `color` over `area`, with per-pixel coverage from `mask`.
    pub fn blend_area(
        &mut self,
        area: Rect,
        mode: BlendMode,
        color: Pixel,
        mask: impl Fn(i32, i32) -> u8,
    ) -> TileSet {
        let size = self.size();
        let mut touched = TileSet::new(size);
        let Some(tiles) = TileRect::covering(area, size) else {
            return touched;
        };
        for coord in tiles.iter() {
            if self.tiles.get(coord).is_none() && !mode.paints_on_transparent() {
                continue;
            }
            let Some(region) = coord
                .pixel_rect()
                .intersected(&area)
                .and_then(|r| r.intersected(&Rect::from_size(size)))
            else {
                continue;
            };
            let Some(tile) = self.tiles.tile_mut(coord) else {
                continue;
            };
            let origin = coord.pixel_rect();
            let pixels = tile.pixels_mut();
            for y in region.y..region.bottom() {
                let row = ((y - origin.y) as u32 * TILE_SIZE) as usize;
                for x in region.x..region.right() {
                    let m = mask(x, y);
                    if m == 0 {
                        continue;
                    }
                    let px = &mut pixels[row + (x - origin.x) as usize];
                    *px = mode.blend(*px, color, m);
                }
            }
            self.tiles.normalize(coord);
            touched.insert(coord);
        }
        touched
    }
    pub fn fill_rect(&mut self, rect: Rect, mode: BlendMode, color: Pixel) -> TileSet {
        self.blend_area(rect, mode, color, |_, _| 255)
    }
    pub fn draw_dabs(&mut self, dabs: &[Dab], mode: BlendMode, color: Pixel) -> TileSet {
        let mut touched = TileSet::new(self.size());
        for dab in dabs {
            touched.union_with(&self.blend_area(dab.bounds(), mode, color, |x, y| dab.mask_at(x, y)));
        }
        touched
    }
    /// Write `tile` at `coord` and the `repeat` following positions, continuing onto the next rows.
    pub fn put_tile(&mut self, coord: TileCoord, repeat: u32, tile: Tile) -> TileSet {
        let mut touched = TileSet::new(self.size());
        let (cols, rows) = self.tiles.dimensions();
        let start = coord.y as u64 * u64::from(cols) + u64::from(coord.x);
        let end = (start + u64::from(repeat) + 1).min(u64::from(cols) * u64::from(rows));
        let tile = Arc::new(tile);
        for idx in start..end {
            let coord = TileCoord::new((idx % u64::from(cols)) as u32, (idx / u64::from(cols)) as u32);
            self.tiles.set(coord, Some(Arc::clone(&tile)));
            touched.insert(coord);
        }
        touched
    }
    /// Erase `rect`, optionally through a coverage mask of `rect.w * rect.h` bytes.
    ///
    /// A mask of the wrong length is treated as absent.
    pub fn cut(&mut self, rect: Rect, mask: Option<&[u8]>) -> TileSet {
        let mask = mask.filter(|m| !rect.is_empty() && m.len() == rect.w as usize * rect.h as usize);
        self.blend_area(rect, BlendMode::Erase, Pixel::BLACK, |x, y| match mask {
            Some(mask) => mask[(y - rect.y) as usize * rect.w as usize + (x - rect.x) as usize],
            None => 255,
        })
    }
    /// This layer on a canvas of `new_size`, with content moved by `(left, top)`.
    #[must_use]
    pub fn resized(&self, top: i32, left: i32, new_size: Size) -> Self {
        let mut tiles = TileGrid::new(new_size);
        let ts = TILE_SIZE as i32;
        if top % ts == 0 && left % ts == 0 {
            // Aligned: tiles move as a whole and keep being shared.
            let (dx, dy) = (left / ts, top / ts);
            for (coord, tile) in self.tiles.iter() {
                let x = coord.x as i32 + dx;
                let y = coord.y as i32 + dy;
                if x >= 0 && y >= 0 {
                    tiles.set(TileCoord::new(x as u32, y as u32), Some(Arc::clone(tile)));
                }
            }
        } else if let Some(all) = TileRect::full(new_size) {
            for coord in all.iter() {
                let origin = coord.pixel_rect();
                let mut tile = Tile::transparent();
                let mut any = false;
                for (i, px) in tile.pixels_mut().iter_mut().enumerate() {
                    let x = origin.x + (i as u32 % TILE_SIZE) as i32;
                    let y = origin.y + (i as u32 / TILE_SIZE) as i32;
                    *px = match (
                        i32::try_from(i64::from(x) - i64::from(left)),
                        i32::try_from(i64::from(y) - i64::from(top)),
                    ) {
                        (Ok(sx), Ok(sy)) => self.tiles.pixel(sx, sy),
                        _ => Pixel::TRANSPARENT,
                    };
                    any |= px.a != 0;
                }
                if any {
                    tiles.set(coord, Some(Arc::new(tile)));
                }
            }
        }
        // Pixels past the new edge must not linger in partially covered tiles.
        clip_to_canvas(&mut tiles);
        Self {
            tiles,
            ..self.clone()
        }
    }
    /// Composite this layer onto `below` with this layer's blend mode and opacity.
    pub fn merge_into(&self, below: &mut Self) -> TileSet {
        let mut touched = TileSet::new(below.size());
        for (coord, tile) in self.tiles.iter() {
            if below.tiles.get(coord).is_none() && !self.blend.paints_on_transparent() {
                continue;
            }
            if let Some(dst) = below.tiles.tile_mut(coord) {
                crate::blend::composite(dst.pixels_mut(), tile.pixels(), self.blend, self.opacity);
                below.tiles.normalize(coord);
                touched.insert(coord);
            }
        }
        touched
    }
    /// Tiles with any content.
    #[must_use]
    pub fn occupied_tiles(&self) -> TileSet {
        let mut set = TileSet::new(self.size());
        for (coord, _) in self.tiles.iter() {
            set.insert(coord);
        }
        set
    }
}

/// Zero any pixels outside the canvas in the right and bottom edge tiles.
fn clip_to_canvas(tiles: &mut TileGrid) {
    let size = tiles.size();
    let (cols, rows) = tiles.dimensions();
    let spill_x = size.width % TILE_SIZE;
    let spill_y = size.height % TILE_SIZE;
    let edge: Vec<TileCoord> = tiles
        .iter()
        .map(|(coord, _)| coord)
        .filter(|c| (spill_x != 0 && c.x + 1 == cols) || (spill_y != 0 && c.y + 1 == rows))
        .collect();
    for coord in edge {
        let origin = coord.pixel_rect();
        let Some(tile) = tiles.tile_mut(coord) else {
            continue;
        };
        for (i, px) in tile.pixels_mut().iter_mut().enumerate() {
            let x = origin.x as u32 + i as u32 % TILE_SIZE;
            let y = origin.y as u32 + i as u32 / TILE_SIZE;
            if x >= size.width || y >= size.height {
                *px = Pixel::TRANSPARENT;
            }
        }
        tiles.normalize(coord);
    }
}

impl Apply<DrawMessage> for Layer {
    /// Tiles touched.
    type Output = TileSet;
    fn apply(&mut self, message: &DrawMessage) -> Result<TileSet, ApplyError> {
        Ok(match message {
            DrawMessage::PutTile {
                coord,
                repeat,
                data,
                ..
            } => {
                let (cols, rows) = self.tiles.dimensions();
                if coord.x >= cols || coord.y >= rows {
                    return Err(ApplyError::InvalidValue("tile coordinate out of bounds"));
                }
                let tile = Tile::from_data(data)?;
                self.put_tile(*coord, u32::from(*repeat), tile)
            }
            DrawMessage::FillRect {
                blend, color, rect, ..
            } => self.fill_rect(*rect, *blend, Pixel::from_straight_argb(*color)),
            DrawMessage::Dabs {
                color, blend, dabs, ..
            } => self.draw_dabs(dabs, *blend, Pixel::from_straight_argb(*color)),
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Dab, Layer};
    use crate::{
        blend::BlendMode,
        color::Pixel,
        id::LayerId,
        tile::{Tile, TileCoord},
        util::{Rect, Size},
    };

    fn blank(size: Size) -> Layer {
        Layer::new(LayerId::new(1, 1), "Test".into(), size, Pixel::TRANSPARENT)
    }

    #[test]
    fn dab_mask() {
        let dab = Dab {
            x: 10,
            y: 10,
            diameter: 10,
            hardness: 255,
            opacity: 255,
        };
        assert_eq!(dab.bounds(), Rect::new(5, 5, 10, 10));
        assert_eq!(dab.mask_at(10, 10), 255);
        assert_eq!(dab.mask_at(0, 0), 0);
        // Corners of the bounding box are outside the circle.
        assert_eq!(dab.mask_at(5, 5), 0);
        let soft = Dab { hardness: 0, ..dab };
        let edge = soft.mask_at(13, 10);
        assert!(edge > 0 && edge < soft.mask_at(10, 10));
    }
    #[test]
    fn fill_touches_tiles() {
        let mut layer = blank(Size::new(200, 100));
        let touched = layer.fill_rect(Rect::new(60, 10, 10, 10), BlendMode::Normal, Pixel::WHITE);
        assert_eq!(touched.len(), 2);
        assert_eq!(layer.tiles.pixel(65, 15), Pixel::WHITE);
        assert_eq!(layer.tiles.pixel(59, 15), Pixel::TRANSPARENT);
        // Erasing onto nothing allocates nothing.
        let touched = layer.fill_rect(Rect::new(150, 0, 10, 10), BlendMode::Erase, Pixel::BLACK);
        assert!(touched.is_empty());
        // Erasing everything leaves no tiles behind.
        layer.fill_rect(Rect::new(0, 0, 200, 100), BlendMode::Erase, Pixel::BLACK);
        assert!(layer.occupied_tiles().is_empty());
    }
    #[test]
    fn put_tile_repeats_across_rows() {
        let mut layer = blank(Size::new(128, 128));
        let touched = layer.put_tile(TileCoord::new(1, 0), 1, Tile::new_solid(Pixel::BLACK));
        assert_eq!(touched.len(), 2);
        assert_eq!(layer.tiles.pixel(70, 0), Pixel::BLACK);
        assert_eq!(layer.tiles.pixel(0, 70), Pixel::BLACK);
        assert_eq!(layer.tiles.pixel(70, 70), Pixel::TRANSPARENT);
    }
    #[test]
    fn resize_shifts_content() {
        let mut layer = blank(Size::new(64, 64));
        layer.fill_rect(Rect::new(0, 0, 1, 1), BlendMode::Normal, Pixel::WHITE);
        let aligned = layer.resized(64, 64, Size::new(128, 128));
        assert_eq!(aligned.tiles.pixel(64, 64), Pixel::WHITE);
        // Aligned moves keep sharing the tile.
        assert!(std::sync::Arc::ptr_eq(
            layer.tiles.get(TileCoord::new(0, 0)).unwrap(),
            aligned.tiles.get(TileCoord::new(1, 1)).unwrap()
        ));
        let shifted = layer.resized(3, 5, Size::new(70, 70));
        assert_eq!(shifted.tiles.pixel(5, 3), Pixel::WHITE);
        assert_eq!(shifted.tiles.pixel(0, 0), Pixel::TRANSPARENT);
        let shrunk = layer.resized(-1, 0, Size::new(64, 63));
        assert!(shrunk.occupied_tiles().is_empty());
    }
    #[test]
    fn merge() {
        let mut top = blank(Size::new(64, 64));
        top.fill_rect(Rect::new(0, 0, 64, 64), BlendMode::Normal, Pixel::WHITE);
        top.opacity = 0;
        let mut below = blank(Size::new(64, 64));
        top.merge_into(&mut below);
        assert!(below.occupied_tiles().is_empty());
        top.opacity = 255;
        assert_eq!(top.merge_into(&mut below).len(), 1);
        assert_eq!(below.tiles.pixel(3, 3), Pixel::WHITE);
    }
    #[test]
    fn extreme_offsets() {
        let dab = Dab {
            x: i32::MIN,
            y: i32::MIN,
            diameter: u32::MAX,
            hardness: 0,
            opacity: 255,
        };
        assert_eq!(dab.bounds().x, i32::MIN);
        let mut layer = Layer::new(LayerId::new(1, 1), String::new(), Size::new(64, 64), Pixel::WHITE);
        assert!(layer.draw_dabs(&[dab], BlendMode::Normal, Pixel::BLACK).is_empty());

        // Unaligned, with a source offset past the i32 range.
        let moved = layer.resized(1, i32::MIN, Size::new(64, 64));
        assert_eq!(moved.tiles.pixel(0, 0), Pixel::TRANSPARENT);
        assert_eq!(moved.tiles.pixel(63, 63), Pixel::TRANSPARENT);
    }
    #[test]
    fn cut_with_mask() {
        let mut layer = Layer::new(LayerId::new(1, 1), String::new(), Size::new(64, 64), Pixel::WHITE);
        let mask = [255, 0, 0, 255];
        layer.cut(Rect::new(0, 0, 2, 2), Some(&mask));
        assert_eq!(layer.tiles.pixel(0, 0), Pixel::TRANSPARENT);
        assert_eq!(layer.tiles.pixel(1, 0), Pixel::WHITE);
        assert_eq!(layer.tiles.pixel(1, 1), Pixel::TRANSPARENT);
    }
}
