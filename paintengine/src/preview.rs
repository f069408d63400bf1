//! Transient edits shown on top of the visible canvas while a tool is active. They never become part of the
//! document.

use paintengine_core::{
    dirty::TileSet, message::DrawMessage, util::Rect, Apply, CanvasState, LayerId,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Preview {
    /// Draw messages shown on `layer`, whichever layer they name.
    Dabs {
        layer: LayerId,
        messages: Vec<DrawMessage>,
    },
    /// `rect` of `layer` shown as cut away, through an optional 8-bit mask.
    Cut {
        layer: LayerId,
        rect: Rect,
        mask: Option<Vec<u8>>,
    },
}
impl Preview {
    #[must_use]
    pub fn layer(&self) -> LayerId {
        match self {
            Self::Dabs { layer, .. } | Self::Cut { layer, .. } => *layer,
        }
    }
    /// Draw this preview into `state`, returning the tiles it touched.
    /// A preview of a missing layer draws nothing.
    pub fn apply_to(&self, state: &mut CanvasState) -> TileSet {
        let size = state.size();
        let Some(layer) = state.layer_mut(self.layer()) else {
            log::trace!("preview of missing layer {:?} skipped", self.layer());
            return TileSet::new(size);
        };
        match self {
            Self::Dabs { messages, .. } => {
                let mut touched = TileSet::new(size);
                for message in messages {
                    match layer.apply(message) {
                        Ok(tiles) => touched.union_with(&tiles),
                        Err(e) => log::trace!("preview message skipped: {e}"),
                    }
                }
                touched
            }
            Self::Cut { rect, mask, .. } => layer.cut(*rect, mask.as_deref()),
        }
    }
}

#[cfg(test)]
mod test {
    use paintengine_core::{
        blend::BlendMode,
        color::Pixel,
        layer::Dab,
        message::DrawMessage,
        util::{Rect, Size},
        CanvasState, LayerId,
    };

    use super::Preview;

    #[test]
    fn dabs_land_on_the_previewed_layer() {
        let mut state = CanvasState::blank(Size::new(128, 64), Pixel::TRANSPARENT).unwrap();
        let preview = Preview::Dabs {
            layer: LayerId(0x0101),
            messages: vec![DrawMessage::Dabs {
                // Ignored, the preview names the layer.
                layer: LayerId(0x0999),
                color: 0xFF00_0000,
                blend: BlendMode::Normal,
                dabs: vec![Dab {
                    x: 70,
                    y: 10,
                    diameter: 8,
                    hardness: 255,
                    opacity: 255,
                }],
            }],
        };
        let touched = preview.apply_to(&mut state);
        assert_eq!(touched.len(), 1);
        assert_eq!(state.flattened_pixel(70, 10), Pixel::BLACK);

        let missing = Preview::Cut {
            layer: LayerId(0x0202),
            rect: Rect::new(0, 0, 10, 10),
            mask: None,
        };
        assert!(missing.apply_to(&mut state).is_empty());
    }
    #[test]
    fn cut_erases() {
        let mut state = CanvasState::blank(Size::new(64, 64), Pixel::TRANSPARENT).unwrap();
        let fill = Preview::Dabs {
            layer: LayerId(0x0101),
            messages: vec![DrawMessage::FillRect {
                layer: LayerId(0x0101),
                blend: BlendMode::Normal,
                color: 0xFFFF_FFFF,
                rect: Rect::new(0, 0, 64, 64),
            }],
        };
        fill.apply_to(&mut state);
        let cut = Preview::Cut {
            layer: LayerId(0x0101),
            rect: Rect::new(0, 0, 2, 1),
            mask: Some(vec![255, 0]),
        };
        cut.apply_to(&mut state);
        assert_eq!(state.flattened_pixel(0, 0), Pixel::TRANSPARENT);
        assert_eq!(state.flattened_pixel(1, 0), Pixel::WHITE);
    }
}
