use smallvec::SmallVec;

use crate::{id::LayerId, message::ApplyError};

/// One animation frame: the layers shown in it, bottom to top.
#[derive(Clone, PartialEq, Eq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Frame {
    pub layers: SmallVec<[LayerId; 4]>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Timeline {
    pub frames: Vec<Frame>,
}
impl Timeline {
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
    /// Replace frame `index`, or insert a new frame before it. Inserting at the end appends.
    pub fn set_frame(
        &mut self,
        index: usize,
        insert: bool,
        layers: &[LayerId],
    ) -> Result<(), ApplyError> {
        let frame = Frame {
            layers: layers.iter().copied().collect(),
        };
        if insert && index <= self.frames.len() {
            self.frames.insert(index, frame);
        } else if let Some(slot) = self.frames.get_mut(index) {
            *slot = frame;
        } else {
            return Err(ApplyError::InvalidFrame(index));
        }
        Ok(())
    }
    pub fn remove_frame(&mut self, index: usize) -> Result<(), ApplyError> {
        if index >= self.frames.len() {
            return Err(ApplyError::InvalidFrame(index));
        }
        self.frames.remove(index);
        Ok(())
    }
    /// Forget a deleted layer. Returns whether any frame referred to it.
    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        let mut changed = false;
        for frame in &mut self.frames {
            let before = frame.layers.len();
            frame.layers.retain(|layer| *layer != id);
            changed |= frame.layers.len() != before;
        }
        changed
    }
}
