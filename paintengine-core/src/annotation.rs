//! # Annotations
//!
//! Text boxes floating over the canvas. Content is markup the engine never interprets.

use std::sync::Arc;

use crate::{
    id::{AnnotationId, UserId},
    message::{AnnotationMessage, Apply, ApplyError},
    util::Rect,
};

#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Default, serde::Serialize, serde::Deserialize,
)]
pub enum VAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Annotation {
    pub id: AnnotationId,
    pub rect: Rect,
    /// Only operators and the owner may change a protected annotation.
    pub protect: bool,
    /// Straight `0xAARRGGBB`.
    pub background: u32,
    pub valign: VAlign,
    pub text: String,
}
impl Annotation {
    #[must_use]
    pub fn new(id: AnnotationId, rect: Rect) -> Self {
        Self {
            id,
            rect,
            protect: false,
            background: 0,
            valign: VAlign::default(),
            text: String::new(),
        }
    }
}

/// All annotations of a document, in creation order. Cloning shares the list.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Annotations(Arc<Vec<Annotation>>);
impl Annotations {
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> + '_ {
        self.0.iter()
    }
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    #[must_use]
    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.0.iter().find(|a| a.id == id)
    }
    fn get_mut(&mut self, id: AnnotationId) -> Result<&mut Annotation, ApplyError> {
        Arc::make_mut(&mut self.0)
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(ApplyError::UnknownAnnotation(id))
    }
    /// The lowest unused id in `user`'s namespace, or None if every slot is taken.
    #[must_use]
    pub fn find_available_id(&self, user: UserId) -> Option<AnnotationId> {
        let mut used = [false; 256];
        for annotation in self.iter().filter(|a| a.id.owner() == user) {
            used[annotation.id.sub_id() as usize] = true;
        }
        (0..=u8::MAX)
            .map(|sub| AnnotationId::new(user, sub))
            .find(|id| !id.is_none() && !used[id.sub_id() as usize])
    }
    /// The annotation under the point, growing each box by `expand` on every side.
    ///
    /// When several match, the one whose center is nearest by Manhattan distance wins. Equal distances go
    /// to the earliest created.
    #[must_use]
    pub fn at(&self, x: i32, y: i32, expand: i32) -> Option<&Annotation> {
        let mut best: Option<(u64, &Annotation)> = None;
        for annotation in self.iter() {
            if !annotation.rect.expanded(expand).contains(x, y) {
                continue;
            }
            let distance = annotation.rect.center_distance(x, y);
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, annotation));
            }
        }
        best.map(|(_, annotation)| annotation)
    }
    /// Move every annotation, for canvas resizes.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        if (dx, dy) == (0, 0) || self.is_empty() {
            return;
        }
        for annotation in Arc::make_mut(&mut self.0) {
            annotation.rect = annotation.rect.translated(dx, dy);
        }
    }
}

impl Apply<AnnotationMessage> for Annotations {
    type Output = ();
    fn apply(&mut self, message: &AnnotationMessage) -> Result<(), ApplyError> {
        match message {
            AnnotationMessage::Create { id, rect } => {
                if id.is_none() {
                    return Err(ApplyError::InvalidAnnotationId(*id));
                }
                if self.get(*id).is_some() {
                    return Err(ApplyError::DuplicateAnnotation(*id));
                }
                Arc::make_mut(&mut self.0).push(Annotation::new(*id, *rect));
            }
            AnnotationMessage::Reshape { id, rect } => {
                self.get_mut(*id)?.rect = *rect;
            }
            AnnotationMessage::Edit {
                id,
                background,
                protect,
                valign,
                text,
            } => {
                let annotation = self.get_mut(*id)?;
                annotation.background = *background;
                annotation.protect = *protect;
                annotation.valign = *valign;
                annotation.text.clone_from(text);
            }
            AnnotationMessage::Delete { id } => {
                let idx = self
                    .0
                    .iter()
                    .position(|a| a.id == *id)
                    .ok_or(ApplyError::UnknownAnnotation(*id))?;
                Arc::make_mut(&mut self.0).remove(idx);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::Annotations;
    use crate::{
        id::AnnotationId,
        message::{AnnotationMessage, Apply, ApplyError},
        util::Rect,
    };

    fn create(annotations: &mut Annotations, id: AnnotationId, rect: Rect) {
        annotations
            .apply(&AnnotationMessage::Create { id, rect })
            .unwrap();
    }

    #[test]
    fn allocation() {
        let mut annotations = Annotations::default();
        assert_eq!(annotations.find_available_id(3), Some(AnnotationId(0x0300)));
        create(&mut annotations, AnnotationId(0x0300), Rect::new(10, 10, 50, 50));
        assert_eq!(annotations.find_available_id(3), Some(AnnotationId(0x0301)));
        // Other namespaces are unaffected.
        assert_eq!(annotations.find_available_id(4), Some(AnnotationId(0x0400)));
        // User 0's first slot is the reserved none id.
        assert_eq!(annotations.find_available_id(0), Some(AnnotationId(0x0001)));
        for sub in 1..=255 {
            create(&mut annotations, AnnotationId::new(3, sub), Rect::default());
        }
        assert_eq!(annotations.find_available_id(3), None);
        annotations
            .apply(&AnnotationMessage::Delete {
                id: AnnotationId(0x0380),
            })
            .unwrap();
        assert_eq!(annotations.find_available_id(3), Some(AnnotationId(0x0380)));
    }
    #[test]
    fn hit_test_tie_break() {
        let mut annotations = Annotations::default();
        // Two boxes with centers equally far from (50, 50).
        create(&mut annotations, AnnotationId(0x0101), Rect::new(0, 0, 80, 80));
        create(&mut annotations, AnnotationId(0x0102), Rect::new(20, 20, 80, 80));
        for _ in 0..3 {
            assert_eq!(annotations.at(50, 50, 0).unwrap().id, AnnotationId(0x0101));
        }
        // A strictly closer box wins regardless of order.
        create(&mut annotations, AnnotationId(0x0103), Rect::new(45, 45, 10, 10));
        assert_eq!(annotations.at(50, 50, 0).unwrap().id, AnnotationId(0x0103));
        // Expansion reaches boxes the point is just outside of.
        assert!(annotations.at(-3, 0, 0).is_none());
        assert_eq!(annotations.at(-3, 0, 5).unwrap().id, AnnotationId(0x0101));
    }
    #[test]
    fn errors_leave_list_unchanged() {
        let mut annotations = Annotations::default();
        create(&mut annotations, AnnotationId(0x0101), Rect::new(0, 0, 8, 8));
        let before = annotations.clone();
        assert_eq!(
            annotations.apply(&AnnotationMessage::Create {
                id: AnnotationId(0x0101),
                rect: Rect::default()
            }),
            Err(ApplyError::DuplicateAnnotation(AnnotationId(0x0101)))
        );
        assert!(annotations
            .apply(&AnnotationMessage::Reshape {
                id: AnnotationId(0x0102),
                rect: Rect::default()
            })
            .is_err());
        assert_eq!(annotations, before);
    }
}
