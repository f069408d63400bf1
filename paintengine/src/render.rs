//! # Render cache
//!
//! A flattened copy of the visible canvas, kept up to date lazily. Ticks only hand over the new state and
//! the tiles it dirtied, the pixels are composited when someone asks for a view.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use paintengine_core::{
    color::Pixel,
    dirty::TileSet,
    image::{Image, ImageError},
    tile::{Tile, TileCoord, TileRect, TILE_SIZE},
    util::{Rect, Size},
    CanvasState,
};

/// The flattened canvas, straight from the cache.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Pixmap {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}
impl Pixmap {
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            width: size.width,
            height: size.height,
            pixels: vec![Pixel::TRANSPARENT; size.area()],
        }
    }
    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
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
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
    pub fn to_image(&self) -> Result<Image, ImageError> {
        Image::from_pixels(self.width, self.height, self.pixels.clone())
    }
    /// Overwrite the area under a tile, clipped to the pixmap.
    fn blit(&mut self, coord: TileCoord, tile: &Tile) {
        let origin = coord.pixel_rect();
        let Some(area) = origin.intersected(&Rect::from_size(self.size())) else {
            return;
        };
        let width = self.width as usize;
        let len = area.w as usize;
        for y in area.y..area.bottom() {
            let src = (y - origin.y) as usize * TILE_SIZE as usize + (area.x - origin.x) as usize;
            let dst = y as usize * width + area.x as usize;
            self.pixels[dst..dst + len].copy_from_slice(&tile.pixels()[src..src + len]);
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct RenderStats {
    pub tiles_rendered: u64,
    /// Number of requests that had at least one tile to composite.
    pub render_passes: u64,
}

struct Tracking {
    /// The state the dirty bits are relative to. Always swapped together with them.
    state: Arc<CanvasState>,
    size: Size,
    dirty: TileSet,
    last_rendered: Option<TileRect>,
    /// Whether anything was marked dirty since `last_rendered` was drawn.
    touched: bool,
}

pub struct RenderCache {
    // Lock order: rendering, tracking, surface.
    /// Held for a whole request, so an older state can't be blitted over a newer one.
    rendering: parking_lot::Mutex<()>,
    tracking: parking_lot::Mutex<Tracking>,
    surface: parking_lot::Mutex<Pixmap>,
    pool: rayon::ThreadPool,
    tiles_rendered: AtomicU64,
    render_passes: AtomicU64,
}
impl RenderCache {
    /// A cache of `state`, compositing on `threads` workers, or rayon's choice if zero.
    pub fn new(threads: usize, state: Arc<CanvasState>) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("Render worker {idx}"))
            .build()?;
        Ok(Self {
            rendering: parking_lot::Mutex::new(()),
            tracking: parking_lot::Mutex::new(Tracking {
                state,
                size: Size::EMPTY,
                dirty: TileSet::default(),
                last_rendered: None,
                touched: false,
            }),
            surface: parking_lot::Mutex::new(Pixmap::default()),
            pool,
            tiles_rendered: AtomicU64::new(0),
            render_passes: AtomicU64::new(0),
        })
    }
    /// Replace the cached state with `state`, which differs from the previous one in `tiles`.
    pub fn publish(&self, state: Arc<CanvasState>, tiles: &TileSet) {
        let mut tracking = self.tracking.lock();
        tracking.state = state;
        if !tiles.is_empty() {
            tracking.dirty.union_with(tiles);
            tracking.touched = true;
        }
    }
    /// Forget everything, the next request renders from scratch.
    pub fn invalidate(&self) {
        let mut tracking = self.tracking.lock();
        tracking.dirty.fill();
        tracking.last_rendered = None;
        tracking.touched = true;
    }
    fn sync_size(&self, tracking: &mut Tracking, size: Size) {
        if tracking.size == size {
            return;
        }
        log::debug!(
            "render cache reallocated for {}x{} ({})",
            size.width,
            size.height,
            human_bytes::human_bytes((size.area() * std::mem::size_of::<Pixel>()) as f64)
        );
        *self.surface.lock() = Pixmap::new(size);
        tracking.size = size;
        tracking.dirty = TileSet::full(size);
        tracking.last_rendered = None;
        tracking.touched = true;
    }
    /// Bring the tiles covering `area` up to date with the published state, and lock the result.
    ///
    /// Asking for the same area again without anything being published in between composites nothing.
    pub fn view(&self, area: Rect) -> parking_lot::MutexGuard<'_, Pixmap> {
        let rendering = self.rendering.lock();
        let (state, coords) = {
            let mut tracking = self.tracking.lock();
            let size = tracking.state.size();
            self.sync_size(&mut tracking, size);
            let coords = match TileRect::covering(area, size) {
                Some(bounds) if tracking.touched || tracking.last_rendered != Some(bounds) => {
                    tracking.touched = false;
                    tracking.last_rendered = Some(bounds);
                    tracking.dirty.take_in(bounds)
                }
                _ => Vec::new(),
            };
            (Arc::clone(&tracking.state), coords)
        };
        self.render(&state, &coords);
        let surface = self.surface.lock();
        drop(rendering);
        surface
    }
    /// Re-composite every tile of the published state, and lock the result.
    pub fn full(&self) -> parking_lot::MutexGuard<'_, Pixmap> {
        let rendering = self.rendering.lock();
        let (state, coords) = {
            let mut tracking = self.tracking.lock();
            let size = tracking.state.size();
            self.sync_size(&mut tracking, size);
            tracking.dirty.clear();
            tracking.touched = false;
            tracking.last_rendered = TileRect::full(size);
            let coords: Vec<TileCoord> = tracking
                .last_rendered
                .map(|all| all.iter().collect())
                .unwrap_or_default();
            (Arc::clone(&tracking.state), coords)
        };
        self.render(&state, &coords);
        let surface = self.surface.lock();
        drop(rendering);
        surface
    }
    fn render(&self, state: &CanvasState, coords: &[TileCoord]) {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
        if coords.is_empty() {
            return;
        }
        self.pool.install(|| {
            coords.par_iter().for_each(|&coord| {
                let tile = state.flatten_tile(coord);
                self.surface.lock().blit(coord, &tile);
            });
        });
        self.tiles_rendered
            .fetch_add(coords.len() as u64, Ordering::Relaxed);
        self.render_passes.fetch_add(1, Ordering::Relaxed);
        log::trace!("composited {} tiles", coords.len());
    }
    #[must_use]
    pub fn stats(&self) -> RenderStats {
        RenderStats {
            tiles_rendered: self.tiles_rendered.load(Ordering::Relaxed),
            render_passes: self.render_passes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use paintengine_core::{
        blend::BlendMode,
        color::Pixel,
        dirty::TileSet,
        message::DrawMessage,
        util::{Rect, Size},
        Apply, CanvasState, LayerId, Message,
    };

    use super::RenderCache;

    fn fill(state: &mut CanvasState, rect: Rect, color: u32) -> TileSet {
        state
            .apply(&Message::new(
                1,
                DrawMessage::FillRect {
                    layer: LayerId(0x0101),
                    blend: BlendMode::Normal,
                    color,
                    rect,
                },
            ))
            .unwrap()
            .tiles
    }

    #[test]
    fn view_renders_dirty_tiles_once() {
        let mut state = CanvasState::blank(Size::new(200, 130), Pixel::WHITE).unwrap();
        let cache = RenderCache::new(2, Arc::new(state.clone())).unwrap();
        let area = Rect::new(0, 0, 200, 130);
        {
            let pixmap = cache.view(area);
            assert_eq!(pixmap.size(), Size::new(200, 130));
            assert_eq!(pixmap.pixel(199, 129), Some(Pixel::WHITE));
        }
        // 4x3 tiles.
        assert_eq!(cache.stats().tiles_rendered, 12);
        let _ = cache.view(area);
        assert_eq!(cache.stats().tiles_rendered, 12);
        assert_eq!(cache.stats().render_passes, 1);

        let dirty = fill(&mut state, Rect::new(70, 70, 2, 2), 0xFF00_0000);
        cache.publish(Arc::new(state), &dirty);
        // Outside the dirty tile, nothing to do.
        let _ = cache.view(Rect::new(0, 0, 10, 10));
        assert_eq!(cache.stats().tiles_rendered, 12);
        let pixmap = cache.view(area);
        assert_eq!(pixmap.pixel(71, 71), Some(Pixel::BLACK));
        drop(pixmap);
        assert_eq!(cache.stats().tiles_rendered, 13);
    }
    #[test]
    fn resize_renders_everything() {
        let state = CanvasState::blank(Size::new(64, 64), Pixel::WHITE).unwrap();
        let cache = RenderCache::new(1, Arc::new(state)).unwrap();
        let _ = cache.full();
        assert_eq!(cache.stats().tiles_rendered, 1);
        let bigger = CanvasState::blank(Size::new(128, 64), Pixel::BLACK).unwrap();
        cache.publish(Arc::new(bigger), &TileSet::default());
        let pixmap = cache.view(Rect::new(0, 0, 1, 1));
        assert_eq!(pixmap.size(), Size::new(128, 64));
        drop(pixmap);
        // Only the requested tile so far, the other stays dirty.
        assert_eq!(cache.stats().tiles_rendered, 2);
        let pixmap = cache.full();
        assert_eq!(pixmap.pixel(127, 0), Some(Pixel::BLACK));
        drop(pixmap);
        assert_eq!(cache.stats().tiles_rendered, 4);
        cache.invalidate();
        let _ = cache.view(Rect::new(0, 0, 128, 64));
        assert_eq!(cache.stats().tiles_rendered, 6);
    }
    #[test]
    fn views_keep_up_with_concurrent_publishes() {
        let size = Size::new(128, 128);
        let area = Rect::from_size(size);
        let mut state = CanvasState::blank(size, Pixel::WHITE).unwrap();
        let cache = Arc::new(RenderCache::new(2, Arc::new(state.clone())).unwrap());
        let reader = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let _ = cache.view(area);
                }
            })
        };
        for i in 0..200u32 {
            let color = if i % 2 == 0 { 0xFF00_0000 } else { 0xFFFF_FFFF };
            let dirty = fill(&mut state, Rect::new(0, 0, 1, 1), color);
            cache.publish(Arc::new(state.clone()), &dirty);
        }
        reader.join().unwrap();

        // Whatever interleaving happened, the cache now matches the last published state.
        let pixmap = cache.view(area);
        assert_eq!(pixmap.pixel(0, 0), Some(state.flattened_pixel(0, 0)));
        assert_eq!(pixmap.pixel(0, 0), Some(Pixel::WHITE));
    }
    #[test]
    fn stale_view_then_publish() {
        let mut state = CanvasState::blank(Size::new(64, 64), Pixel::WHITE).unwrap();
        let cache = RenderCache::new(1, Arc::new(state.clone())).unwrap();
        let area = Rect::new(0, 0, 64, 64);
        let _ = cache.view(area);
        let dirty = fill(&mut state, Rect::new(0, 0, 1, 1), 0xFF00_0000);
        cache.publish(Arc::new(state), &dirty);
        assert_eq!(cache.view(area).pixel(0, 0), Some(Pixel::BLACK));
        // Nothing new, still black and nothing composited.
        let rendered = cache.stats().tiles_rendered;
        assert_eq!(cache.view(area).pixel(0, 0), Some(Pixel::BLACK));
        assert_eq!(cache.stats().tiles_rendered, rendered);
    }
}
