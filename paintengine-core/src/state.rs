//! # Canvas state
//!
//! The complete shared document at one point in the message stream. Cloning is cheap, layers and tiles are
//! reference counted and copied on write, so a clone handed to a reader never changes under it.

use std::sync::{Arc, OnceLock};

use crate::{
    annotation::Annotations,
    blend::{composite, BlendMode},
    color::{Color, Pixel},
    dirty::TileSet,
    document::DocumentMetadata,
    id::LayerId,
    image::Image,
    layer::{Layer, LayerInfo},
    message::{
        AnnotationMessage, Apply, ApplyError, Body, CanvasMessage, DocumentMessage, InternalMessage,
        LayerMessage, Message, UndoMessage,
    },
    tile::{Tile, TileCoord, TileRect, TILE_SIZE},
    timeline::Timeline,
    util::{Rect, Size},
};

/// Largest allowed canvas side.
pub const MAX_DIMENSION: u32 = 32767;

bitflags::bitflags! {
    /// Which non-pixel parts of the state changed.
    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
    pub struct ChangeFlags: u8 {
        const LAYERS = 1;
        const ANNOTATIONS = 1 << 1;
        const METADATA = 1 << 2;
        const TIMELINE = 1 << 3;
        const RESIZED = 1 << 4;
    }
}

/// How the canvas was resized. Content moved by the offset.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Resize {
    pub offset_x: i32,
    pub offset_y: i32,
    pub old_size: Size,
}

/// What a message, or a series of them, changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    /// Tiles whose flattened appearance may have changed.
    pub tiles: TileSet,
    pub flags: ChangeFlags,
    pub resize: Option<Resize>,
}
impl Changes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty() && self.flags.is_empty() && self.resize.is_none()
    }
    fn flagged(tiles: TileSet, flags: ChangeFlags) -> Self {
        Self {
            tiles,
            flags,
            resize: None,
        }
    }
    /// Accumulate the changes of a later message.
    pub fn merge(&mut self, later: Self) {
        self.tiles.union_with(&later.tiles);
        self.flags |= later.flags;
        self.resize = match (self.resize, later.resize) {
            (Some(first), Some(second)) => Some(Resize {
                offset_x: first.offset_x + second.offset_x,
                offset_y: first.offset_y + second.offset_y,
                old_size: first.old_size,
            }),
            (first, second) => first.or(second),
        };
    }
}

#[derive(Clone, Debug, Default)]
pub struct CanvasState {
    size: Size,
    background: Option<Arc<Tile>>,
    /// Bottom to top.
    layers: Vec<Arc<Layer>>,
    annotations: Annotations,
    timeline: Timeline,
    metadata: DocumentMetadata,
}

fn checked_size(width: i64, height: i64) -> Result<Size, ApplyError> {
    let valid = 1..=i64::from(MAX_DIMENSION);
    if valid.contains(&width) && valid.contains(&height) {
        Ok(Size::new(width as u32, height as u32))
    } else {
        Err(ApplyError::InvalidSize(width, height))
    }
}

/// Placeholder shown instead of censored content.
fn censor_tile() -> &'static Tile {
    static CENSOR: OnceLock<Tile> = OnceLock::new();
    CENSOR.get_or_init(|| {
        let mut tile = Tile::transparent();
        for (i, px) in tile.pixels_mut().iter_mut().enumerate() {
            let (x, y) = (i as u32 % TILE_SIZE, i as u32 / TILE_SIZE);
            *px = if (x / 8 + y / 8) % 2 == 0 {
                Pixel::new(0x80, 0x80, 0x80, 0xFF)
            } else {
                Pixel::new(0xC0, 0xC0, 0xC0, 0xFF)
            };
        }
        tile
    })
}

impl CanvasState {
    /// A canvas with a flat background and a single empty layer.
    pub fn blank(size: Size, background: Pixel) -> Result<Self, ApplyError> {
        let size = checked_size(i64::from(size.width), i64::from(size.height))?;
        Ok(Self {
            size,
            background: (!background.is_transparent()).then(|| Arc::new(Tile::new_solid(background))),
            layers: vec![Arc::new(Layer::new(
                LayerId::new(1, 1),
                "Layer 1".to_owned(),
                size,
                Pixel::TRANSPARENT,
            ))],
            ..Self::default()
        })
    }
    #[must_use]
    pub fn size(&self) -> Size {
        self.size
    }
    /// The flat background color, transparent if there is none.
    #[must_use]
    pub fn background(&self) -> Pixel {
        self.background
            .as_ref()
            .map_or(Pixel::TRANSPARENT, |tile| tile.pixel(0, 0))
    }
    #[must_use]
    pub fn layers(&self) -> &[Arc<Layer>] {
        &self.layers
    }
    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id).map(|l| &**l)
    }
    fn layer_index(&self, id: LayerId) -> Result<usize, ApplyError> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(ApplyError::UnknownLayer(id))
    }
    /// Writable access to a layer, copying it first if shared.
    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        let idx = self.layer_index(id).ok()?;
        Some(Arc::make_mut(&mut self.layers[idx]))
    }
    /// Properties of every layer, bottom to top.
    #[must_use]
    pub fn layer_infos(&self) -> Vec<LayerInfo> {
        self.layers.iter().map(|l| l.info()).collect()
    }
    #[must_use]
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }
    #[must_use]
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }
    /// Frames come from the timeline when it's enabled and populated, otherwise every layer is a frame.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        if self.uses_timeline() {
            self.timeline.len()
        } else {
            self.layers.len()
        }
    }
    fn uses_timeline(&self) -> bool {
        self.metadata.use_timeline && !self.timeline.is_empty()
    }
    /// Layers shown in a frame. None if the frame doesn't exist.
    #[must_use]
    pub fn frame_layers(&self, index: usize) -> Option<hashbrown::HashSet<LayerId>> {
        if self.uses_timeline() {
            let frame = self.timeline.frames.get(index)?;
            Some(frame.layers.iter().copied().collect())
        } else {
            let layer = self.layers.get(index)?;
            Some(
                self.layers
                    .iter()
                    .filter(|l| l.fixed)
                    .map(|l| l.id)
                    .chain(std::iter::once(layer.id))
                    .collect(),
            )
        }
    }

    fn occupied_tiles(&self, layer: &Layer) -> TileSet {
        let mut tiles = layer.occupied_tiles();
        // A resized state could in theory hold layers of a stale size, never merge mismatched sets.
        if tiles.dimensions() != TileSet::new(self.size).dimensions() {
            tiles = TileSet::full(self.size);
        }
        tiles
    }

    fn apply_internal(&mut self, message: &InternalMessage) -> Result<Changes, ApplyError> {
        let replacement = match message {
            InternalMessage::Reset => Self::default(),
            InternalMessage::LoadBlank { size, background } => {
                Self::blank(*size, Pixel::from_straight_argb(*background))?
            }
            // Handled by whoever owns the state.
            InternalMessage::Snapshot | InternalMessage::Catchup(_) | InternalMessage::Cleanup => {
                return Ok(Changes::default())
            }
        };
        let changes = self.diff(&replacement);
        *self = replacement;
        Ok(changes)
    }
    fn apply_canvas(&mut self, message: &CanvasMessage) -> Result<Changes, ApplyError> {
        match message {
            CanvasMessage::Resize {
                top,
                right,
                bottom,
                left,
            } => {
                let old_size = self.size;
                let new_size = checked_size(
                    i64::from(old_size.width) + i64::from(*left) + i64::from(*right),
                    i64::from(old_size.height) + i64::from(*top) + i64::from(*bottom),
                )?;
                for layer in &mut self.layers {
                    *layer = Arc::new(layer.resized(*top, *left, new_size));
                }
                self.annotations.translate(*left, *top);
                self.size = new_size;
                let mut flags = ChangeFlags::RESIZED;
                if !self.annotations.is_empty() {
                    flags |= ChangeFlags::ANNOTATIONS;
                }
                Ok(Changes {
                    tiles: TileSet::full(new_size),
                    flags,
                    resize: Some(Resize {
                        offset_x: *left,
                        offset_y: *top,
                        old_size,
                    }),
                })
            }
            CanvasMessage::Background { color } => {
                let pixel = Pixel::from_straight_argb(*color);
                self.background = (!pixel.is_transparent()).then(|| Arc::new(Tile::new_solid(pixel)));
                Ok(Changes::flagged(TileSet::full(self.size), ChangeFlags::empty()))
            }
        }
    }
    fn apply_layer(&mut self, message: &LayerMessage) -> Result<Changes, ApplyError> {
        let tiles = match message {
            LayerMessage::Create {
                id,
                source,
                fill,
                title,
            } => {
                if *id == LayerId::FLATTENED {
                    return Err(ApplyError::InvalidLayerId(*id));
                }
                if self.layer(*id).is_some() {
                    return Err(ApplyError::DuplicateLayer(*id));
                }
                let layer = match source {
                    Some(source) => self
                        .layer(*source)
                        .ok_or(ApplyError::UnknownLayer(*source))?
                        .duplicate(*id, title.clone()),
                    None => Layer::new(*id, title.clone(), self.size, Pixel::from_straight_argb(*fill)),
                };
                let tiles = self.occupied_tiles(&layer);
                self.layers.push(Arc::new(layer));
                tiles
            }
            LayerMessage::Attributes {
                id,
                opacity,
                blend,
                censored,
                fixed,
            } => {
                let idx = self.layer_index(*id)?;
                let layer = Arc::make_mut(&mut self.layers[idx]);
                let visual = (layer.opacity, layer.blend, layer.censored) != (*opacity, *blend, *censored);
                layer.opacity = *opacity;
                layer.blend = *blend;
                layer.censored = *censored;
                layer.fixed = *fixed;
                if visual {
                    self.occupied_tiles(&self.layers[idx])
                } else {
                    TileSet::new(self.size)
                }
            }
            LayerMessage::Retitle { id, title } => {
                let idx = self.layer_index(*id)?;
                Arc::make_mut(&mut self.layers[idx]).title.clone_from(title);
                TileSet::new(self.size)
            }
            LayerMessage::Visibility { id, hidden } => {
                let idx = self.layer_index(*id)?;
                if self.layers[idx].hidden == *hidden {
                    TileSet::new(self.size)
                } else {
                    Arc::make_mut(&mut self.layers[idx]).hidden = *hidden;
                    self.occupied_tiles(&self.layers[idx])
                }
            }
            LayerMessage::Order { order } => {
                let mut listed: Vec<LayerId> = Vec::with_capacity(order.len());
                for id in order {
                    if self.layer(*id).is_some() && !listed.contains(id) {
                        listed.push(*id);
                    }
                }
                // Unlisted layers keep their relative order, underneath the listed ones.
                let mut reordered: Vec<Arc<Layer>> = self
                    .layers
                    .iter()
                    .filter(|l| !listed.contains(&l.id))
                    .cloned()
                    .collect();
                reordered.extend(listed.iter().filter_map(|id| {
                    self.layers.iter().find(|l| l.id == *id).cloned()
                }));
                let moved = reordered
                    .iter()
                    .zip(&self.layers)
                    .any(|(a, b)| a.id != b.id);
                if !moved {
                    return Ok(Changes::default());
                }
                self.layers = reordered;
                let mut tiles = TileSet::new(self.size);
                for layer in &self.layers {
                    tiles.union_with(&self.occupied_tiles(layer));
                }
                tiles
            }
            LayerMessage::Delete { id, merge } => {
                let idx = self.layer_index(*id)?;
                if *merge && idx == 0 {
                    return Err(ApplyError::NothingToMergeInto(*id));
                }
                let removed = self.layers.remove(idx);
                let mut tiles = self.occupied_tiles(&removed);
                if *merge {
                    let below = Arc::make_mut(&mut self.layers[idx - 1]);
                    tiles.union_with(&removed.merge_into(below));
                }
                if self.timeline.remove_layer(*id) {
                    return Ok(Changes::flagged(tiles, ChangeFlags::LAYERS | ChangeFlags::TIMELINE));
                }
                tiles
            }
        };
        Ok(Changes::flagged(tiles, ChangeFlags::LAYERS))
    }
    fn apply_document(&mut self, message: &DocumentMessage) -> Result<Changes, ApplyError> {
        let flags = match message {
            DocumentMessage::SetMetadata(field) => {
                if self.metadata.set(field)? {
                    ChangeFlags::METADATA
                } else {
                    ChangeFlags::empty()
                }
            }
            DocumentMessage::SetTimelineFrame {
                frame,
                insert,
                layers,
            } => {
                self.timeline.set_frame(usize::from(*frame), *insert, layers)?;
                ChangeFlags::TIMELINE
            }
            DocumentMessage::RemoveTimelineFrame { frame } => {
                self.timeline.remove_frame(usize::from(*frame))?;
                ChangeFlags::TIMELINE
            }
        };
        Ok(Changes::flagged(TileSet::new(self.size), flags))
    }

    /// Which tiles and properties differ between two states.
    ///
    /// Tiles are compared by identity, so this is cheap for states derived from one another.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Changes {
        let mut flags = ChangeFlags::empty();
        if self.layer_infos() != other.layer_infos() {
            flags |= ChangeFlags::LAYERS;
        }
        if self.annotations != other.annotations {
            flags |= ChangeFlags::ANNOTATIONS;
        }
        if self.metadata != other.metadata {
            flags |= ChangeFlags::METADATA;
        }
        if self.timeline != other.timeline {
            flags |= ChangeFlags::TIMELINE;
        }
        if self.size != other.size {
            return Changes {
                tiles: TileSet::full(other.size),
                flags: flags | ChangeFlags::RESIZED,
                resize: Some(Resize {
                    offset_x: 0,
                    offset_y: 0,
                    old_size: self.size,
                }),
            };
        }
        let same_background = match (&self.background, &other.background) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a.solid_color() == b.solid_color(),
            _ => false,
        };
        if !same_background {
            return Changes::flagged(TileSet::full(other.size), flags);
        }
        let mut tiles = TileSet::new(other.size);
        let visual = |l: &Layer| (l.id, l.opacity, l.blend, l.hidden, l.censored);
        let same_stack = self.layers.len() == other.layers.len()
            && self
                .layers
                .iter()
                .zip(&other.layers)
                .all(|(a, b)| visual(a) == visual(b));
        if same_stack {
            if let Some(all) = TileRect::full(other.size) {
                for (a, b) in self.layers.iter().zip(&other.layers) {
                    if Arc::ptr_eq(a, b) {
                        continue;
                    }
                    for coord in all.iter() {
                        if !a.tiles.same_tile(&b.tiles, coord) {
                            tiles.insert(coord);
                        }
                    }
                }
            }
        } else {
            for layer in self.layers.iter().chain(&other.layers) {
                tiles.union_with(&other.occupied_tiles(layer));
            }
        }
        Changes::flagged(tiles, flags)
    }

    /// Messages which, applied to an empty canvas, rebuild this state.
    #[must_use]
    pub fn to_reset_messages(&self) -> Vec<Message> {
        use crate::message::DrawMessage;
        let mut messages = vec![Message::server(InternalMessage::Reset)];
        if self.size.is_empty() {
            return messages;
        }
        messages.push(Message::server(CanvasMessage::Resize {
            top: 0,
            right: self.size.width as i32,
            bottom: self.size.height as i32,
            left: 0,
        }));
        if self.background.is_some() {
            messages.push(Message::server(CanvasMessage::Background {
                color: self.background().straight_argb(),
            }));
        }
        for layer in &self.layers {
            messages.push(Message::server(LayerMessage::Create {
                id: layer.id,
                source: None,
                fill: 0,
                title: layer.title.clone(),
            }));
            messages.push(Message::server(LayerMessage::Attributes {
                id: layer.id,
                opacity: layer.opacity,
                blend: layer.blend,
                censored: layer.censored,
                fixed: layer.fixed,
            }));
            if layer.hidden {
                messages.push(Message::server(LayerMessage::Visibility {
                    id: layer.id,
                    hidden: true,
                }));
            }
            for (coord, tile) in layer.tiles.iter() {
                messages.push(Message::server(DrawMessage::PutTile {
                    layer: layer.id,
                    coord,
                    repeat: 0,
                    data: tile.to_data(),
                }));
            }
        }
        for annotation in self.annotations.iter() {
            messages.push(Message::server(AnnotationMessage::Create {
                id: annotation.id,
                rect: annotation.rect,
            }));
            messages.push(Message::server(AnnotationMessage::Edit {
                id: annotation.id,
                background: annotation.background,
                protect: annotation.protect,
                valign: annotation.valign,
                text: annotation.text.clone(),
            }));
        }
        for field in self.metadata.fields() {
            messages.push(Message::server(DocumentMessage::SetMetadata(field)));
        }
        for (idx, frame) in self.timeline.frames.iter().enumerate() {
            messages.push(Message::server(DocumentMessage::SetTimelineFrame {
                frame: idx as u16,
                insert: true,
                layers: frame.layers.to_vec(),
            }));
        }
        messages
    }

    /// Composite one tile of the canvas from the background and the layers accepted by `include`.
    pub fn composite_tile(
        &self,
        coord: TileCoord,
        with_background: bool,
        include: impl Fn(&Layer) -> bool,
    ) -> Tile {
        let mut out = match (&self.background, with_background) {
            (Some(background), true) => Tile::clone(background),
            _ => Tile::transparent(),
        };
        for layer in &self.layers {
            if !include(&**layer) {
                continue;
            }
            let Some(tile) = layer.tiles.get(coord) else {
                continue;
            };
            let src = if layer.censored {
                censor_tile()
            } else {
                tile.as_ref()
            };
            composite(out.pixels_mut(), src.pixels(), layer.blend, layer.opacity);
        }
        out
    }
    /// The displayed appearance of one tile.
    #[must_use]
    pub fn flatten_tile(&self, coord: TileCoord) -> Tile {
        self.composite_tile(coord, true, Layer::is_visible)
    }
    /// The displayed color of a single pixel.
    #[must_use]
    pub fn flattened_pixel(&self, x: i32, y: i32) -> Pixel {
        if !Rect::from_size(self.size).contains(x, y) {
            return Pixel::TRANSPARENT;
        }
        let (lx, ly) = (x as u32 % TILE_SIZE, y as u32 % TILE_SIZE);
        let mut out = self.background();
        for layer in self.layers.iter().filter(|l| l.is_visible()) {
            let coord = TileCoord::new(x as u32 / TILE_SIZE, y as u32 / TILE_SIZE);
            let Some(tile) = layer.tiles.get(coord) else {
                continue;
            };
            let src = if layer.censored {
                censor_tile().pixel(lx, ly)
            } else {
                tile.pixel(lx, ly)
            };
            if src.a != 0 || layer.blend == BlendMode::Replace {
                out = layer.blend.blend(out, src, layer.opacity);
            }
        }
        out
    }
    /// Average color under a square brush of `diameter` centered on the point.
    /// [`LayerId::FLATTENED`] samples the displayed canvas.
    ///
    /// None if the layer doesn't exist or the area is off canvas.
    #[must_use]
    pub fn sample_color(&self, x: i32, y: i32, layer: LayerId, diameter: u32) -> Option<Color> {
        let layer = if layer == LayerId::FLATTENED {
            None
        } else {
            Some(self.layer(layer)?)
        };
        let d = diameter.clamp(1, 255) as i32;
        let area = Rect::new(x.saturating_sub(d / 2), y.saturating_sub(d / 2), d, d)
            .intersected(&Rect::from_size(self.size))?;
        let mut sum = [0u64; 4];
        for py in area.y..area.bottom() {
            for px in area.x..area.right() {
                let p = match layer {
                    Some(layer) => layer.tiles.pixel(px, py),
                    None => self.flattened_pixel(px, py),
                };
                for (acc, channel) in sum.iter_mut().zip([p.r, p.g, p.b, p.a]) {
                    *acc += u64::from(channel);
                }
            }
        }
        let count = (area.w * area.h) as u64;
        let [r, g, b, a] = sum.map(|c| ((c + count / 2) / count) as u8);
        Some(Color::from_pixel(Pixel::new(r, g, b, a)))
    }

    fn render_area(&self, rect: Rect, mut tile_at: impl FnMut(TileCoord) -> Tile) -> Option<Image> {
        let area = rect.intersected(&Rect::from_size(self.size))?;
        let tiles = TileRect::covering(area, self.size)?;
        let mut image = Image::new(area.w as u32, area.h as u32).ok()?;
        let width = area.w as usize;
        for coord in tiles.iter() {
            let origin = coord.pixel_rect();
            let Some(overlap) = origin.intersected(&area) else {
                continue;
            };
            let tile = tile_at(coord);
            for y in overlap.y..overlap.bottom() {
                let src_start = ((y - origin.y) as u32 * TILE_SIZE + (overlap.x - origin.x) as u32) as usize;
                let dst_start = (y - area.y) as usize * width + (overlap.x - area.x) as usize;
                let len = overlap.w as usize;
                image.pixels_mut()[dst_start..dst_start + len]
                    .copy_from_slice(&tile.pixels()[src_start..src_start + len]);
            }
        }
        Some(image)
    }
    /// The displayed canvas within `rect`, clipped to the canvas.
    #[must_use]
    pub fn flatten_image(&self, rect: Rect) -> Option<Image> {
        self.render_area(rect, |coord| self.flatten_tile(coord))
    }
    /// The content of a single layer, or the flattened canvas for [`LayerId::FLATTENED`].
    #[must_use]
    pub fn layer_image(&self, id: LayerId, rect: Rect) -> Option<Image> {
        if id == LayerId::FLATTENED {
            return self.flatten_image(rect);
        }
        let layer = self.layer(id)?;
        self.render_area(rect, |coord| {
            layer
                .tiles
                .get(coord)
                .map_or_else(Tile::transparent, |tile| Tile::clone(tile))
        })
    }
    /// A single animation frame on the background. Hidden flags don't apply to frames.
    #[must_use]
    pub fn frame_image(&self, index: usize, rect: Rect) -> Option<Image> {
        let layers = self.frame_layers(index)?;
        self.render_area(rect, |coord| {
            self.composite_tile(coord, true, |l| l.opacity > 0 && layers.contains(&l.id))
        })
    }
}

impl Apply<Message> for CanvasState {
    type Output = Changes;
    fn apply(&mut self, message: &Message) -> Result<Changes, ApplyError> {
        log::trace!("applying {} message from user {}", message.kind(), message.user);
        match &message.body {
            Body::Internal(internal) => self.apply_internal(internal),
            Body::Canvas(canvas) => self.apply_canvas(canvas),
            Body::Layer(layer) => self.apply_layer(layer),
            Body::Draw(draw) => {
                let idx = self.layer_index(draw.layer())?;
                let mut layer = Layer::clone(&self.layers[idx]);
                let tiles = layer.apply(draw)?;
                if !tiles.is_empty() {
                    self.layers[idx] = Arc::new(layer);
                }
                Ok(Changes::flagged(tiles, ChangeFlags::empty()))
            }
            Body::Annotation(annotation) => {
                self.annotations.apply(annotation)?;
                Ok(Changes::flagged(TileSet::new(self.size), ChangeFlags::ANNOTATIONS))
            }
            Body::Document(document) => self.apply_document(document),
            Body::Undo(UndoMessage::UndoPoint) | Body::Acl(_) | Body::Telemetry(_) => Ok(Changes::default()),
            Body::Undo(UndoMessage::Undo { .. }) => Err(ApplyError::NotCanvasMessage("Undo")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CanvasState, ChangeFlags};
    use crate::{
        annotation::VAlign,
        blend::BlendMode,
        color::{Color, Pixel},
        document::MetadataField,
        id::{AnnotationId, LayerId},
        layer::Dab,
        message::{
            AnnotationMessage, Apply, ApplyError, CanvasMessage, DocumentMessage, DrawMessage,
            InternalMessage, LayerMessage, Message,
        },
        tile::TileCoord,
        util::{Rect, Size},
    };

    fn blank() -> CanvasState {
        let mut state = CanvasState::default();
        state
            .apply(&Message::server(InternalMessage::LoadBlank {
                size: Size::new(200, 100),
                background: 0xFFFF_FFFF,
            }))
            .unwrap();
        state
    }
    fn fill(layer: LayerId, color: u32, rect: Rect) -> Message {
        Message::new(
            1,
            DrawMessage::FillRect {
                layer,
                blend: BlendMode::Normal,
                color,
                rect,
            },
        )
    }

    #[test]
    fn load_blank() {
        let state = blank();
        assert_eq!(state.size(), Size::new(200, 100));
        assert_eq!(state.frame_count(), 1);
        assert_eq!(state.layers()[0].id, LayerId(0x0101));
        let image = state.layer_image(LayerId::FLATTENED, Rect::new(0, 0, 200, 100)).unwrap();
        assert_eq!(image.width(), 200);
        assert!(image.pixels().iter().all(|p| *p == Pixel::WHITE));
        assert!(CanvasState::blank(Size::new(0, 10), Pixel::WHITE).is_err());
    }
    #[test]
    fn draw_and_diff() {
        let mut state = blank();
        let before = state.clone();
        let changes = state
            .apply(&fill(LayerId(0x0101), 0xFF00_0000, Rect::new(70, 10, 4, 4)))
            .unwrap();
        assert_eq!(changes.tiles.iter().collect::<Vec<_>>(), vec![TileCoord::new(1, 0)]);
        assert_eq!(state.flattened_pixel(71, 11), Pixel::BLACK);
        // The clone doesn't see it.
        assert_eq!(before.flattened_pixel(71, 11), Pixel::WHITE);
        assert_eq!(before.diff(&state).tiles, changes.tiles);
        assert!(before.diff(&state).flags.is_empty());
    }
    #[test]
    fn errors_leave_state_unchanged() {
        let mut state = blank();
        let before = state.clone();
        let bad = [
            fill(LayerId(0x0909), 0xFF00_0000, Rect::new(0, 0, 4, 4)),
            Message::new(
                1,
                LayerMessage::Create {
                    id: LayerId(0x0101),
                    source: None,
                    fill: 0,
                    title: String::new(),
                },
            ),
            Message::new(
                1,
                LayerMessage::Delete {
                    id: LayerId(0x0101),
                    merge: true,
                },
            ),
            Message::new(
                1,
                CanvasMessage::Resize {
                    top: 0,
                    right: -200,
                    bottom: 0,
                    left: 0,
                },
            ),
        ];
        for message in &bad {
            assert!(state.apply(message).is_err(), "{message:?}");
        }
        assert!(before.diff(&state).is_empty());
    }
    #[test]
    fn resize_moves_content() {
        let mut state = blank();
        state
            .apply(&fill(LayerId(0x0101), 0xFF00_0000, Rect::new(0, 0, 1, 1)))
            .unwrap();
        state
            .apply(&Message::new(
                1,
                AnnotationMessage::Create {
                    id: AnnotationId(0x0100),
                    rect: Rect::new(0, 0, 5, 5),
                },
            ))
            .unwrap();
        let changes = state
            .apply(&Message::new(
                1,
                CanvasMessage::Resize {
                    top: 10,
                    right: 0,
                    bottom: 0,
                    left: 20,
                },
            ))
            .unwrap();
        assert!(changes.flags.contains(ChangeFlags::RESIZED));
        let resize = changes.resize.unwrap();
        assert_eq!((resize.offset_x, resize.offset_y), (20, 10));
        assert_eq!(resize.old_size, Size::new(200, 100));
        assert_eq!(state.size(), Size::new(220, 110));
        assert_eq!(changes.tiles.len(), 4 * 2);
        assert_eq!(state.flattened_pixel(20, 10), Pixel::BLACK);
        assert_eq!(
            state.annotations().get(AnnotationId(0x0100)).unwrap().rect,
            Rect::new(20, 10, 5, 5)
        );
    }
    #[test]
    fn layer_order_and_merge() {
        let mut state = blank();
        let top = LayerId(0x0102);
        state
            .apply(&Message::new(
                1,
                LayerMessage::Create {
                    id: top,
                    source: None,
                    fill: 0,
                    title: "Top".into(),
                },
            ))
            .unwrap();
        state
            .apply(&fill(top, 0xFF00_00FF, Rect::new(0, 0, 10, 10)))
            .unwrap();
        // Unknown ids are ignored, unlisted layers sink to the bottom.
        let changes = state
            .apply(&Message::new(
                1,
                LayerMessage::Order {
                    order: vec![LayerId(0x0101), LayerId(0x7777)],
                },
            ))
            .unwrap();
        assert!(changes.flags.contains(ChangeFlags::LAYERS));
        let ids: Vec<_> = state.layers().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![top, LayerId(0x0101)]);

        state
            .apply(&Message::new(
                1,
                LayerMessage::Delete {
                    id: LayerId(0x0101),
                    merge: true,
                },
            ))
            .unwrap();
        assert_eq!(state.layers().len(), 1);
        assert_eq!(
            state.layers()[0].tiles.pixel(5, 5),
            Pixel::from_straight_argb(0xFF00_00FF)
        );
    }
    #[test]
    fn censored_and_hidden() {
        let mut state = blank();
        state
            .apply(&fill(LayerId(0x0101), 0xFF00_0000, Rect::new(0, 0, 64, 64)))
            .unwrap();
        state
            .apply(&Message::new(
                1,
                LayerMessage::Attributes {
                    id: LayerId(0x0101),
                    opacity: 255,
                    blend: BlendMode::Normal,
                    censored: true,
                    fixed: false,
                },
            ))
            .unwrap();
        assert_ne!(state.flattened_pixel(0, 0), Pixel::BLACK);
        assert_eq!(state.flatten_tile(TileCoord::new(0, 0)).pixel(0, 0), state.flattened_pixel(0, 0));
        let changes = state
            .apply(&Message::new(
                1,
                LayerMessage::Visibility {
                    id: LayerId(0x0101),
                    hidden: true,
                },
            ))
            .unwrap();
        assert_eq!(changes.tiles.len(), 1);
        assert_eq!(state.flattened_pixel(0, 0), Pixel::WHITE);
    }
    #[test]
    fn frames() {
        let mut state = blank();
        state
            .apply(&Message::new(
                1,
                LayerMessage::Create {
                    id: LayerId(0x0102),
                    source: None,
                    fill: 0xFF00_0000,
                    title: "Two".into(),
                },
            ))
            .unwrap();
        assert_eq!(state.frame_count(), 2);
        let rect = Rect::new(0, 0, 4, 4);
        assert_eq!(state.frame_image(0, rect).unwrap().pixel(0, 0), Some(Pixel::WHITE));
        assert_eq!(state.frame_image(1, rect).unwrap().pixel(0, 0), Some(Pixel::BLACK));
        assert!(state.frame_image(2, rect).is_none());

        for message in [
            DocumentMessage::SetTimelineFrame {
                frame: 0,
                insert: true,
                layers: vec![LayerId(0x0101)],
            },
            DocumentMessage::SetMetadata(MetadataField::UseTimeline(true)),
        ] {
            state.apply(&Message::new(1, message)).unwrap();
        }
        assert_eq!(state.frame_count(), 1);
        assert_eq!(state.frame_image(0, rect).unwrap().pixel(0, 0), Some(Pixel::WHITE));
    }
    #[test]
    fn sample() {
        let mut state = blank();
        state
            .apply(&Message::new(
                1,
                DrawMessage::Dabs {
                    layer: LayerId(0x0101),
                    color: 0xFF00_0000,
                    blend: BlendMode::Normal,
                    dabs: vec![Dab {
                        x: 50,
                        y: 50,
                        diameter: 20,
                        hardness: 255,
                        opacity: 255,
                    }],
                },
            ))
            .unwrap();
        assert_eq!(state.sample_color(50, 50, LayerId::FLATTENED, 1), Some(Color::BLACK));
        assert_eq!(state.sample_color(150, 50, LayerId::FLATTENED, 5), Some(Color::WHITE));
        assert_eq!(state.sample_color(150, 50, LayerId(0x0101), 5), Some(Color::TRANSPARENT));
        assert_eq!(state.sample_color(500, 50, LayerId::FLATTENED, 1), None);
        assert_eq!(state.sample_color(5, 5, LayerId(0x0999), 1), None);
    }
    #[test]
    fn reset_messages_rebuild() {
        let mut state = blank();
        for message in [
            fill(LayerId(0x0101), 0x80FF_0000, Rect::new(5, 5, 100, 50)),
            Message::new(
                1,
                AnnotationMessage::Create {
                    id: AnnotationId(0x0101),
                    rect: Rect::new(1, 2, 3, 4),
                },
            ),
            Message::new(
                1,
                AnnotationMessage::Edit {
                    id: AnnotationId(0x0101),
                    background: 0xFF00_FF00,
                    protect: true,
                    valign: VAlign::Bottom,
                    text: "<p>hi</p>".into(),
                },
            ),
            Message::new(1, DocumentMessage::SetMetadata(MetadataField::Title("T".into()))),
        ] {
            state.apply(&message).unwrap();
        }
        let mut rebuilt = CanvasState::default();
        for message in state.to_reset_messages() {
            rebuilt.apply(&message).unwrap();
        }
        assert_eq!(rebuilt.layer_infos(), state.layer_infos());
        assert_eq!(rebuilt.annotations(), state.annotations());
        assert_eq!(rebuilt.metadata(), state.metadata());
        let all = Rect::new(0, 0, 200, 100);
        assert_eq!(rebuilt.flatten_image(all), state.flatten_image(all));
    }
    #[test]
    fn reset_reports_everything() {
        let mut state = blank();
        let changes = state.apply(&Message::server(InternalMessage::Reset)).unwrap();
        assert!(changes.flags.contains(ChangeFlags::RESIZED | ChangeFlags::LAYERS));
        assert_eq!(state.size(), Size::EMPTY);
        assert_eq!(state.frame_count(), 0);
        assert!(matches!(
            state.apply(&fill(LayerId(0x0101), 0, Rect::default())),
            Err(ApplyError::UnknownLayer(_))
        ));
    }
}
